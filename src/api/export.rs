//! CSV export of hits

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::sync::Arc;

use super::error::ApiResult;
use super::hits::SlugTypeQuery;
use crate::models::Hit;
use crate::state::AppState;

const HEADER: [&str; 14] = [
    "ID",
    "Type",
    "Slug",
    "IP",
    "Timestamp",
    "Browser",
    "OS",
    "Device",
    "Referer",
    "Language",
    "Query Params",
    "Session ID",
    "Visitor ID",
    "Extra",
];

/// Render hits as CSV, every cell quoted
pub fn hits_to_csv(hits: &[Hit]) -> anyhow::Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;
    for hit in hits {
        let id = hit.id.to_string();
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        writer.write_record([
            id,
            hit.hit_type.clone(),
            hit.slug.clone(),
            opt(&hit.ip),
            hit.timestamp.clone(),
            opt(&hit.browser),
            opt(&hit.os),
            opt(&hit.device),
            opt(&hit.referer),
            opt(&hit.accept_language),
            opt(&hit.query_params),
            opt(&hit.session_id),
            opt(&hit.visitor_id),
            opt(&hit.extra),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("failed to flush CSV writer")
}

pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlugTypeQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = query.into_filter()?;
    let hits = state.storage.list_hits(&filter, None).await?;
    let body = hits_to_csv(&hits)?;

    let disposition = format!(
        "attachment; filename=\"hits-{}.csv\"",
        chrono::Utc::now().timestamp_millis()
    );
    tracing::info!(rows = hits.len(), "hits exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
