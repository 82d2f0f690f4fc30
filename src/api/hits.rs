use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::cursor::{decode_cursor, encode_cursor, HitCursor};
use crate::models::{Hit, HitType};
use crate::state::AppState;
use crate::storage::{HitFilter, StatsDimension};

const DEFAULT_HIT_LIMIT: i64 = 100;
const MAX_HIT_LIMIT: i64 = 1000;
const RECENT_HITS: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct HitsQuery {
    pub limit: Option<i64>,
    pub slug: Option<String>,
    #[serde(rename = "type")]
    pub hit_type: Option<String>,
    pub ip: Option<String>,
    pub session_id: Option<String>,
    pub visitor_id: Option<String>,
    pub cursor: Option<String>,
}

/// `?slug=&type=` as accepted by stats and export
#[derive(Debug, Default, Deserialize)]
pub struct SlugTypeQuery {
    pub slug: Option<String>,
    #[serde(rename = "type")]
    pub hit_type: Option<String>,
}

#[derive(Serialize)]
pub struct HitsResponse {
    pub hits: Vec<Hit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct StatsResponse {
    pub total: i64,
    #[serde(rename = "byType")]
    pub by_type: BTreeMap<String, i64>,
    #[serde(rename = "bySlug")]
    pub by_slug: BTreeMap<String, i64>,
    #[serde(rename = "byIP")]
    pub by_ip: BTreeMap<String, i64>,
    #[serde(rename = "byBrowser")]
    pub by_browser: BTreeMap<String, i64>,
    #[serde(rename = "byOS")]
    pub by_os: BTreeMap<String, i64>,
    #[serde(rename = "byDevice")]
    pub by_device: BTreeMap<String, i64>,
    #[serde(rename = "byReferer")]
    pub by_referer: BTreeMap<String, i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent: Option<Vec<Hit>>,
}

#[derive(Serialize)]
pub struct HitsPurged {
    pub success: bool,
    pub slug: String,
    pub deleted: u64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_hit_type(raw: Option<String>) -> ApiResult<Option<HitType>> {
    match non_empty(raw) {
        Some(raw) => raw
            .parse::<HitType>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("invalid type '{raw}'"))),
        None => Ok(None),
    }
}

impl SlugTypeQuery {
    pub fn into_filter(self) -> ApiResult<HitFilter> {
        Ok(HitFilter {
            slug: non_empty(self.slug),
            hit_type: parse_hit_type(self.hit_type)?,
            ..HitFilter::default()
        })
    }
}

impl HitsQuery {
    fn into_filter(self) -> ApiResult<(HitFilter, i64)> {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_HIT_LIMIT)
            .clamp(1, MAX_HIT_LIMIT);

        let before_id = match non_empty(self.cursor) {
            Some(raw) => Some(
                decode_cursor(&raw)
                    .map_err(|_| ApiError::BadRequest("invalid cursor".to_string()))?
                    .id,
            ),
            None => None,
        };

        let filter = HitFilter {
            slug: non_empty(self.slug),
            hit_type: parse_hit_type(self.hit_type)?,
            ip: non_empty(self.ip),
            session_id: non_empty(self.session_id),
            visitor_id: non_empty(self.visitor_id),
            before_id,
        };
        Ok((filter, limit))
    }
}

/// Newest hits first, optionally filtered, paged by signed cursor
pub async fn list_hits(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HitsQuery>,
) -> ApiResult<Json<HitsResponse>> {
    let (filter, limit) = query.into_filter()?;
    let hits = state.storage.list_hits(&filter, Some(limit)).await?;

    let next_cursor = match hits.last() {
        Some(last) if hits.len() as i64 == limit => Some(encode_cursor(&HitCursor { id: last.id })?),
        _ => None,
    };

    Ok(Json(HitsResponse { hits, next_cursor }))
}

async fn build_stats(state: &AppState, filter: &HitFilter) -> anyhow::Result<StatsResponse> {
    let mut stats = StatsResponse {
        total: state.storage.count_hits(filter).await?,
        ..StatsResponse::default()
    };

    for dimension in StatsDimension::ALL {
        let counts: BTreeMap<String, i64> = state
            .storage
            .aggregate_hits(filter, dimension)
            .await?
            .into_iter()
            .map(|row| (row.dimension, row.count))
            .collect();

        let slot = match dimension {
            StatsDimension::Type => &mut stats.by_type,
            StatsDimension::Slug => &mut stats.by_slug,
            StatsDimension::Ip => &mut stats.by_ip,
            StatsDimension::Browser => &mut stats.by_browser,
            StatsDimension::Os => &mut stats.by_os,
            StatsDimension::Device => &mut stats.by_device,
            StatsDimension::Referer => &mut stats.by_referer,
        };
        *slot = counts;
    }

    Ok(stats)
}

/// Totals and per-dimension counts plus the most recent hits
pub async fn admin_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlugTypeQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let filter = query.into_filter()?;
    let mut stats = build_stats(&state, &filter).await?;
    stats.recent = Some(state.storage.list_hits(&filter, Some(RECENT_HITS)).await?);
    Ok(Json(stats))
}

/// Same counts as the admin view, without raw hits
pub async fn api_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlugTypeQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let filter = query.into_filter()?;
    Ok(Json(build_stats(&state, &filter).await?))
}

/// Bulk purge every hit recorded for a slug
pub async fn purge_hits(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<HitsPurged>> {
    let deleted = state.storage.delete_hits_by_slug(&slug).await?;
    info!(%slug, deleted, "hits purged");

    Ok(Json(HitsPurged {
        success: true,
        slug,
        deleted,
    }))
}
