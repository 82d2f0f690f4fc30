use axum::{
    extract::Request,
    http::Method,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::ErrorDetail;
use crate::models::{LogLevel, NewRequestLog};
use crate::state::AppState;
use crate::tracking::sanitize::sanitize_str;
use crate::tracking::ClientIp;

const SLOW_REQUEST: Duration = Duration::from_millis(100);
const MAX_LOGGED_PATH: usize = 500;
const MAX_LOGGED_MESSAGE: usize = 1000;

/// Response marker set by handlers that wrote their own request log entry
#[derive(Debug, Clone, Copy)]
pub struct RequestLogged;

/// A request log entry for `method path` from `ip`
pub fn request_log_entry(
    level: LogLevel,
    message: String,
    method: &Method,
    path: &str,
    ip: &str,
) -> NewRequestLog {
    let mut entry = NewRequestLog::now(level, sanitize_str(&message, MAX_LOGGED_MESSAGE));
    entry.method = Some(method.to_string());
    entry.path = Some(sanitize_str(path, MAX_LOGGED_PATH));
    entry.ip = Some(ip.to_string());
    entry
}

/// Persist a log entry; failures are only reported to tracing
pub async fn persist_log(state: &AppState, entry: &NewRequestLog) {
    if let Err(e) = state.storage.insert_log(entry).await {
        tracing::warn!(error = %e, "failed to persist request log");
    }
}

/// Log requests that are slow or end in an error status
///
/// Each one goes to tracing and to the `logs` table. 5xx responses from
/// API handlers carry an [`ErrorDetail`] whose message and stack are
/// stored with the entry.
pub async fn log_requests(
    state: Arc<AppState>,
    ClientIp(client_ip): ClientIp,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    if status < 400 && elapsed <= SLOW_REQUEST {
        return response;
    }

    let millis = elapsed.as_millis() as u64;
    let level = LogLevel::for_status(status);
    match level {
        LogLevel::Error => {
            tracing::error!(%method, %path, status, duration_ms = millis, "request failed")
        }
        LogLevel::Warn => {
            tracing::warn!(%method, %path, status, duration_ms = millis, "client error")
        }
        LogLevel::Info => {
            tracing::info!(%method, %path, status, duration_ms = millis, "slow request")
        }
    }

    if response.extensions().get::<RequestLogged>().is_some() {
        return response;
    }

    let detail = response.extensions().get::<ErrorDetail>();
    let message = match detail {
        Some(detail) => format!("500 Internal Error: {method} {path} - {}", detail.message),
        None => format!("{method} {path} - {status} - {millis}ms"),
    };
    let mut entry = request_log_entry(level, message, &method, &path, &client_ip);
    entry.status_code = Some(i64::from(status));
    entry.duration_ms = Some(elapsed.as_secs_f64() * 1000.0);
    entry.error_stack = detail.map(|detail| detail.stack.clone());

    persist_log(&state, &entry).await;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_caps_path_and_message() {
        let path = format!("/{}", "a".repeat(2000));
        let entry = request_log_entry(
            LogLevel::Warn,
            format!("404 Not Found: GET {path}"),
            &Method::GET,
            &path,
            "203.0.113.5",
        );

        assert_eq!(entry.path.as_deref().map(str::len), Some(MAX_LOGGED_PATH));
        assert_eq!(entry.message.len(), MAX_LOGGED_MESSAGE);
        assert_eq!(entry.method.as_deref(), Some("GET"));
        assert_eq!(entry.ip.as_deref(), Some("203.0.113.5"));
        assert_eq!(entry.status_code, None);
    }
}
