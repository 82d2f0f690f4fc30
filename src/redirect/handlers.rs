use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::ErrorResponse;
use super::middleware::{persist_log, request_log_entry, RequestLogged};
use crate::models::{HitType, LogLevel, RequestLog, NOT_FOUND_SLUG_PREFIX, ROOT_SLUG};
use crate::state::AppState;
use crate::storage::{HitFilter, Storage};
use crate::tracking::sanitize::sanitize_str;
use crate::tracking::{resolve_identity, BeaconFields, ClientIp, TrackRequest};

/// 1x1 transparent PNG
pub const PIXEL_PNG: [u8; 70] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64,
    0xf8, 0xcf, 0x50, 0x0f, 0x00, 0x03, 0x86, 0x01, 0x80, 0x5a, 0x34, 0x7d, 0x6b, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

const MAX_EVENT_TYPE_LEN: usize = 20;
const MAX_LABEL_LEN: usize = 100;
const MAX_URL_LEN: usize = 500;
const PAGE_SLUG_URL_CHARS: usize = 200;

fn query_pairs(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .into_owned()
            .collect()
    })
    .unwrap_or_default()
}

/// 302 Found. Non-ASCII destinations fall back to their percent-encoded form.
fn found(location: &str) -> Response {
    let value = if location.is_ascii() {
        HeaderValue::from_str(location).ok()
    } else {
        url::Url::parse(location)
            .ok()
            .and_then(|u| HeaderValue::from_str(u.as_str()).ok())
    };

    match value {
        Some(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        None => {
            tracing::error!(%location, "redirect target is not a valid header value");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

fn pixel_response() -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate, private"),
            (header::EXPIRES, "0"),
            (header::PRAGMA, "no-cache"),
        ],
        Bytes::from_static(&PIXEL_PNG),
    )
        .into_response()
}

/// Whether the client would take an HTML page (absent `Accept` counts)
fn accepts_html(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return true;
    };

    accept.split(',').any(|entry| {
        let mut parts = entry.split(';').map(str::trim);
        let media = parts.next().unwrap_or_default().to_ascii_lowercase();
        let refused = parts.any(|p| {
            p.strip_prefix("q=")
                .and_then(|q| q.parse::<f32>().ok())
                .is_some_and(|q| q <= 0.0)
        });
        !refused && matches!(media.as_str(), "text/html" | "text/*" | "*/*")
    })
}

/// `GET /`: record a root hit and send the visitor to the configured home
pub async fn root(
    State(state): State<Arc<AppState>>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let query = query_pairs(raw_query.as_deref());
    state
        .tracker
        .track(TrackRequest {
            hit_type: HitType::Redirect,
            slug: ROOT_SLUG,
            client_ip: &client_ip,
            headers: &headers,
            query: &query,
            beacon: None,
            identity: None,
        })
        .await;

    found(&state.config.redirects.root)
}

const HEALTH_ERROR_WINDOW_SECS: i64 = 3600;
/// More errors than this within the window turns health into a 503
const HEALTH_MAX_RECENT_ERRORS: i64 = 10;
const HEALTH_RECENT_ERROR_SAMPLES: i64 = 5;

#[derive(Serialize)]
struct RecentError {
    timestamp: String,
    message: String,
    path: Option<String>,
}

impl From<RequestLog> for RecentError {
    fn from(log: RequestLog) -> Self {
        Self {
            timestamp: log.timestamp,
            message: log.message,
            path: log.path,
        }
    }
}

#[derive(Serialize)]
struct HealthCounts {
    links: i64,
    hits: i64,
    errors_total: i64,
    warnings_total: i64,
    errors_last_hour: i64,
    recent_errors: Vec<RecentError>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    uptime_secs: u64,
    #[serde(flatten)]
    counts: Option<HealthCounts>,
}

async fn health_counts(storage: &dyn Storage) -> anyhow::Result<HealthCounts> {
    let window_start = chrono::Utc::now().timestamp() - HEALTH_ERROR_WINDOW_SECS;
    let recent_errors = storage
        .list_logs(Some(LogLevel::Error), None, HEALTH_RECENT_ERROR_SAMPLES)
        .await?;

    Ok(HealthCounts {
        links: storage.count_links().await?,
        hits: storage.count_hits(&HitFilter::default()).await?,
        errors_total: storage.count_logs(LogLevel::Error, None).await?,
        warnings_total: storage.count_logs(LogLevel::Warn, None).await?,
        errors_last_hour: storage
            .count_logs(LogLevel::Error, Some(window_start))
            .await?,
        recent_errors: recent_errors.into_iter().map(RecentError::from).collect(),
    })
}

/// Health check endpoint
///
/// `healthy` with no logged errors in the last hour, `degraded` otherwise,
/// `unhealthy` when storage is unreachable. Responds 503 when unhealthy or
/// when the last hour holds more than 10 errors.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let counts = match health_counts(state.storage.as_ref()).await {
        Ok(counts) => Some(counts),
        Err(e) => {
            tracing::error!(error = %e, "health check failed to reach storage");
            None
        }
    };

    let (status, code) = match &counts {
        None => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
        Some(c) if c.errors_last_hour > HEALTH_MAX_RECENT_ERRORS => {
            ("degraded", StatusCode::SERVICE_UNAVAILABLE)
        }
        Some(c) if c.errors_last_hour > 0 => ("degraded", StatusCode::OK),
        Some(_) => ("healthy", StatusCode::OK),
    };

    let body = HealthResponse {
        status,
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        uptime_secs: state.started_at.elapsed().as_secs(),
        counts,
    };

    // A failing health check must not feed its own error count
    let mut response = (code, Json(body)).into_response();
    response.extensions_mut().insert(RequestLogged);
    response
}

/// `GET /l/{slug}`: resolve, record, redirect
pub async fn redirect_link(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    jar: CookieJar,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let link = match state.storage.get_link(&slug).await {
        Ok(Some(link)) => link,
        Ok(None) => return (StatusCode::NOT_FOUND, "Link not found").into_response(),
        Err(e) => {
            tracing::error!(%slug, error = %e, "link lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    let (jar, identity) = resolve_identity(jar, &state.config.tracking);
    let query = query_pairs(raw_query.as_deref());
    state
        .tracker
        .track(TrackRequest {
            hit_type: HitType::Redirect,
            slug: &link.slug,
            client_ip: &client_ip,
            headers: &headers,
            query: &query,
            beacon: None,
            identity: Some(&identity),
        })
        .await;

    (jar, found(&link.destination)).into_response()
}

/// `GET /p/{slug}`: always the same image, whatever the slug
pub async fn pixel(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    jar: CookieJar,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let (jar, identity) = resolve_identity(jar, &state.config.tracking);
    let query = query_pairs(raw_query.as_deref());
    state
        .tracker
        .track(TrackRequest {
            hit_type: HitType::Pixel,
            slug: &slug,
            client_ip: &client_ip,
            headers: &headers,
            query: &query,
            beacon: None,
            identity: Some(&identity),
        })
        .await;

    (jar, pixel_response()).into_response()
}

/// Beacon body; every field is optional and loosely typed
#[derive(Debug, Default, Deserialize)]
struct CollectBody {
    #[serde(rename = "type")]
    kind: Option<Value>,
    label: Option<Value>,
    url: Option<Value>,
    title: Option<Value>,
    tz: Option<Value>,
    locale: Option<Value>,
    vars: Option<Value>,
    dpr: Option<Value>,
    viewport: Option<Value>,
}

/// Scalar JSON as text; empty strings, false, null and containers yield None
fn text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Device pixel ratio: numbers pass through, other truthy values parse or become 1
fn pixel_ratio(value: &Option<Value>) -> Option<f64> {
    match value.as_ref()? {
        Value::Number(n) => n.as_f64().filter(|v| *v != 0.0),
        Value::String(s) if !s.is_empty() => Some(
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v != 0.0)
                .unwrap_or(1.0),
        ),
        Value::Bool(true) | Value::Array(_) | Value::Object(_) => Some(1.0),
        _ => None,
    }
}

/// `POST /a/collect`: page views and custom events from the tracking script
pub async fn collect(
    State(state): State<Arc<AppState>>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    let body: CollectBody = serde_json::from_slice(&body).unwrap_or_default();

    let kind = sanitize_str(&text(&body.kind).unwrap_or_else(|| "page".to_string()), MAX_EVENT_TYPE_LEN);
    let (hit_type, slug) = if kind == "event" {
        let label = sanitize_str(&text(&body.label).unwrap_or_default(), MAX_LABEL_LEN);
        let label = if label.is_empty() { "generic".to_string() } else { label };
        (HitType::Event, format!("event:{label}"))
    } else {
        let referer = headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let url = sanitize_str(&text(&body.url).or(referer).unwrap_or_default(), MAX_URL_LEN);
        let head: String = url.chars().take(PAGE_SLUG_URL_CHARS).collect();
        (HitType::Page, format!("page:{head}"))
    };

    let beacon = BeaconFields {
        title: text(&body.title),
        tz: text(&body.tz),
        locale: text(&body.locale),
        vars: match body.vars {
            Some(Value::Object(vars)) => Some(vars),
            _ => None,
        },
        dpr: pixel_ratio(&body.dpr),
        viewport: text(&body.viewport),
    };

    let (jar, identity) = resolve_identity(jar, &state.config.tracking);
    state
        .tracker
        .track(TrackRequest {
            hit_type,
            slug: &slug,
            client_ip: &client_ip,
            headers: &headers,
            query: &[],
            beacon: Some(&beacon),
            identity: Some(&identity),
        })
        .await;

    (jar, Json(json!({ "ok": true }))).into_response()
}

/// Anything unrouted: recorded as a 404 hit, then redirect browsers home
pub async fn not_found(
    State(state): State<Arc<AppState>>,
    ClientIp(client_ip): ClientIp,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let slug = format!("{NOT_FOUND_SLUG_PREFIX}{}", uri.path());
    let query = query_pairs(raw_query.as_deref());
    state
        .tracker
        .track(TrackRequest {
            hit_type: HitType::Redirect,
            slug: &slug,
            client_ip: &client_ip,
            headers: &headers,
            query: &query,
            beacon: None,
            identity: None,
        })
        .await;

    let mut entry = request_log_entry(
        LogLevel::Warn,
        format!("404 Not Found: {method} {}", uri.path()),
        &method,
        uri.path(),
        &client_ip,
    );
    entry.status_code = Some(404);
    persist_log(&state, &entry).await;

    let mut response = if accepts_html(&headers) {
        found(&state.config.redirects.not_found)
    } else {
        (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not found"))).into_response()
    };
    response.extensions_mut().insert(RequestLogged);
    response
}
