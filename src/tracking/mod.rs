//! Hit ingestion
//!
//! [`Tracker::track`] takes one inbound tracking request through
//! blacklist check, classification and sanitization, rate-limit keying
//! and the insert. Every branch ends in a [`TrackOutcome`]; none of them
//! is an error, and handlers answer the client the same way regardless.

pub mod classifier;
pub mod identity;
pub mod ip_extractor;
pub mod rate_limit;
pub mod sanitize;

pub use classifier::{classify, is_bot, ClientInfo};
pub use identity::{resolve_identity, ClientIdentity, SESSION_COOKIE, VISITOR_COOKIE};
pub use ip_extractor::{canonical_ip, extract_client_ip, ClientIp};

use axum::http::HeaderMap;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::models::{HitType, NewHit};
use crate::storage::{HitInsert, Storage};
use sanitize::{sanitize_flat_map, sanitize_nested, sanitize_str, DEFAULT_MAX_DEPTH};

const MAX_SLUG_LEN: usize = 255;
const MAX_IP_LEN: usize = 100;

/// What happened to a tracking request. Never shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Recorded,
    /// Same ip and slug already recorded in this rate-limit window
    Deduplicated,
    /// Client IP is blacklisted
    Blocked,
    /// Storage error, already logged
    Failed,
}

/// Client-reported fields from a collect beacon, unsanitized
#[derive(Debug, Clone, Default)]
pub struct BeaconFields {
    pub title: Option<String>,
    pub tz: Option<String>,
    pub locale: Option<String>,
    pub vars: Option<Map<String, Value>>,
    pub dpr: Option<f64>,
    pub viewport: Option<String>,
}

/// One inbound tracking request
#[derive(Debug, Clone, Copy)]
pub struct TrackRequest<'a> {
    pub hit_type: HitType,
    pub slug: &'a str,
    pub client_ip: &'a str,
    pub headers: &'a HeaderMap,
    /// Raw query pairs; recorded for redirects and pixels
    pub query: &'a [(String, String)],
    pub beacon: Option<&'a BeaconFields>,
    pub identity: Option<&'a ClientIdentity>,
}

/// Sanitized metadata stored in the `extra` column
#[derive(Debug, Default, Serialize)]
struct HitExtra {
    is_bot: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    ch_ua: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ch_platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ch_mobile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dnt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accept: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tz: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vars: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dpr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    viewport: Option<String>,
}

#[derive(Clone)]
pub struct Tracker {
    storage: Arc<dyn Storage>,
    rate_limit_window_secs: u64,
}

impl Tracker {
    pub fn new(storage: Arc<dyn Storage>, rate_limit_window_secs: u64) -> Self {
        Self {
            storage,
            rate_limit_window_secs,
        }
    }

    pub async fn track(&self, request: TrackRequest<'_>) -> TrackOutcome {
        self.track_at(request, Utc::now()).await
    }

    /// Record a hit as if received at `received_at`
    pub async fn track_at(&self, request: TrackRequest<'_>, received_at: DateTime<Utc>) -> TrackOutcome {
        let ip = sanitize_str(request.client_ip, MAX_IP_LEN);
        let slug = sanitize_str(request.slug, MAX_SLUG_LEN);
        let hit_type = request.hit_type;

        match self.storage.is_blacklisted(&ip).await {
            Ok(true) => {
                info!(%hit_type, %slug, %ip, "blocked hit from blacklisted IP");
                return TrackOutcome::Blocked;
            }
            Ok(false) => {}
            Err(e) => {
                error!(%hit_type, %slug, %ip, error = %e, "blacklist lookup failed, dropping hit");
                return TrackOutcome::Failed;
            }
        }

        let hit = build_hit(&request, slug, ip, received_at, self.rate_limit_window_secs);

        match self.storage.insert_hit(&hit).await {
            Ok(HitInsert::Inserted) => {
                info!(
                    hit_type = %hit.hit_type,
                    slug = %hit.slug,
                    ip = %hit.ip,
                    browser = %hit.browser,
                    os = %hit.os,
                    referer = %hit.referer,
                    "hit recorded"
                );
                TrackOutcome::Recorded
            }
            Ok(HitInsert::Duplicate) => {
                debug!(hit_type = %hit.hit_type, slug = %hit.slug, ip = %hit.ip, "hit rate limited");
                TrackOutcome::Deduplicated
            }
            Err(e) => {
                error!(hit_type = %hit.hit_type, slug = %hit.slug, error = %e, "failed to record hit");
                TrackOutcome::Failed
            }
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn header_capped(headers: &HeaderMap, name: &str, max_len: usize) -> Option<String> {
    header_str(headers, name).map(|v| sanitize_str(v, max_len))
}

fn non_empty_capped(value: Option<&str>, max_len: usize) -> Option<String> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| sanitize_str(v, max_len))
}

/// Group repeated query keys into arrays the way `?a=1&a=2` is usually read
fn query_map(query: &[(String, String)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in query {
        let value = Value::String(value.clone());
        match map.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.clone(), value);
            }
        }
    }
    map
}

fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn build_hit(
    request: &TrackRequest<'_>,
    slug: String,
    ip: String,
    received_at: DateTime<Utc>,
    window_secs: u64,
) -> NewHit {
    let headers = request.headers;
    let user_agent = sanitize_str(header_str(headers, "user-agent").unwrap_or("Unknown"), 500);
    let referer = sanitize_str(
        header_str(headers, "referer")
            .or_else(|| header_str(headers, "referrer"))
            .unwrap_or("Direct"),
        500,
    );
    let accept_language = sanitize_str(header_str(headers, "accept-language").unwrap_or("Unknown"), 100);
    let client = classify(&user_agent);

    let query_params = match request.beacon {
        Some(_) => None,
        None => {
            let params = sanitize_flat_map(&query_map(request.query));
            (!params.is_empty()).then(|| Value::Object(params).to_string())
        }
    };

    let mut extra = HitExtra {
        is_bot: u8::from(is_bot(&user_agent, headers)),
        ch_ua: header_capped(headers, "sec-ch-ua", 200),
        ch_platform: header_capped(headers, "sec-ch-ua-platform", 50),
        ch_mobile: header_capped(headers, "sec-ch-ua-mobile", 10),
        dnt: header_capped(headers, "dnt", 10),
        accept: header_capped(headers, "accept", 200),
        ..HitExtra::default()
    };
    match request.beacon {
        Some(beacon) => {
            extra.title = non_empty_capped(beacon.title.as_deref(), 200);
            extra.tz = non_empty_capped(beacon.tz.as_deref(), 50);
            extra.locale = non_empty_capped(beacon.locale.as_deref(), 20);
            extra.vars = beacon
                .vars
                .as_ref()
                .map(|vars| sanitize_nested(vars, DEFAULT_MAX_DEPTH));
            extra.dpr = beacon.dpr;
            extra.viewport = non_empty_capped(beacon.viewport.as_deref(), 50);
        }
        None => {
            extra.tz = non_empty_capped(query_value(request.query, "tz"), 50);
            extra.locale = non_empty_capped(query_value(request.query, "locale"), 20);
        }
    }
    let extra = serde_json::to_string(&extra).ok();

    let rate_limit_key = rate_limit::rate_limit_key(&ip, &slug, received_at, window_secs);

    NewHit {
        hit_type: request.hit_type,
        slug,
        ip,
        timestamp: received_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        user_agent,
        browser: client.browser,
        os: client.os,
        device: client.device,
        referer,
        accept_language,
        query_params,
        session_id: request.identity.map(|id| id.session_id.clone()),
        visitor_id: request.identity.map(|id| id.visitor_id.clone()),
        extra,
        rate_limit_key,
        created_at: received_at.timestamp(),
    }
}
