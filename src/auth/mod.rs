//! Guards for the admin and token-scoped surfaces
//!
//! Both run as route layers, so a rejected request never reaches a
//! handler.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::models::{ApiToken, Scope};
use crate::state::AppState;
use crate::tracking::ip_extractor::ClientIp;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn query_token(request: &Request) -> Option<String> {
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
}

/// Admin guard: IP allow-list first, then the bearer password
pub async fn admin_auth(
    state: Arc<AppState>,
    ClientIp(client_ip): ClientIp,
    request: Request,
    next: Next,
) -> Response {
    let admin = &state.config.admin;

    if !admin.allows(&client_ip) {
        warn!(ip = %client_ip, path = %request.uri().path(), "admin request from disallowed IP");
        return ApiError::Forbidden("IP not allowed".to_string()).into_response();
    }

    let Some(password) = bearer_token(request.headers()) else {
        return ApiError::Unauthorized("Missing or invalid authorization header").into_response();
    };

    if !bool::from(password.as_bytes().ct_eq(admin.password.as_bytes())) {
        warn!(ip = %client_ip, "admin request with invalid password");
        return ApiError::Unauthorized("Invalid password").into_response();
    }

    next.run(request).await
}

/// Token guard for `/api`: a known token holding `required`
pub async fn token_auth(
    state: Arc<AppState>,
    required: Scope,
    request: Request,
    next: Next,
) -> Response {
    let secret = match bearer_token(request.headers()) {
        Some(token) if !token.is_empty() => token.to_string(),
        _ => match query_token(&request) {
            Some(token) if !token.is_empty() => token,
            _ => return ApiError::Unauthorized("Missing token").into_response(),
        },
    };

    let token: ApiToken = match state.storage.get_token_by_secret(&secret).await {
        Ok(Some(token)) => token,
        Ok(None) => return ApiError::Unauthorized("Invalid token").into_response(),
        Err(e) => return ApiError::Internal(e).into_response(),
    };

    if !token.has_scope(required) {
        debug!(token_id = token.id, scope = %required, "token lacks scope");
        return ApiError::Forbidden(format!("Missing scope: {required}")).into_response();
    }

    if let Err(e) = state
        .storage
        .touch_token(token.id, chrono::Utc::now().timestamp())
        .await
    {
        warn!(token_id = token.id, error = %e, "failed to update token last_used_at");
    }

    next.run(request).await
}
