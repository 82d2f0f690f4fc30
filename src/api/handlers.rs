use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::models::{
    generate_token_secret, ApiToken, CreateBlacklistRequest, CreateLinkRequest,
    CreateTokenRequest, IpBlacklistEntry, LinkSummary, Scope,
};
use crate::state::AppState;
use crate::storage::StorageError;
use crate::tracking::canonical_ip;

const TOKEN_CREATE_ATTEMPTS: usize = 3;

#[derive(Serialize)]
pub struct LinksResponse {
    pub links: Vec<LinkSummary>,
}

#[derive(Serialize)]
pub struct LinkSaved {
    pub success: bool,
    pub slug: String,
    pub destination: String,
}

#[derive(Serialize)]
pub struct SlugDeleted {
    pub success: bool,
    pub slug: String,
}

#[derive(Serialize)]
pub struct BlacklistResponse {
    pub blacklist: Vec<IpBlacklistEntry>,
}

#[derive(Serialize)]
pub struct BlacklistSaved {
    pub success: bool,
    pub ip: String,
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct IpRemoved {
    pub success: bool,
    pub ip: String,
}

#[derive(Serialize)]
pub struct TokensResponse {
    pub tokens: Vec<ApiToken>,
}

#[derive(Serialize)]
pub struct TokenCreated {
    pub success: bool,
    pub id: i64,
    pub token: String,
    pub name: String,
    pub scopes: Vec<Scope>,
}

#[derive(Serialize)]
pub struct TokenDeleted {
    pub success: bool,
    pub id: i64,
}

/// List links with their redirect-hit counts
pub async fn list_links(State(state): State<Arc<AppState>>) -> ApiResult<Json<LinksResponse>> {
    let links = state.storage.list_links().await?;
    Ok(Json(LinksResponse { links }))
}

/// Create a link or point an existing slug at a new destination
pub async fn upsert_link(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateLinkRequest>,
) -> ApiResult<Json<LinkSaved>> {
    let (slug, destination) = payload.validate()?;
    let link = state.storage.upsert_link(&slug, &destination).await?;
    info!(slug = %link.slug, destination = %link.destination, "link saved");

    Ok(Json(LinkSaved {
        success: true,
        slug: link.slug,
        destination: link.destination,
    }))
}

pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<SlugDeleted>> {
    if !state.storage.delete_link(&slug).await? {
        return Err(ApiError::NotFound("Link not found"));
    }
    info!(%slug, "link deleted");

    Ok(Json(SlugDeleted {
        success: true,
        slug,
    }))
}

pub async fn list_blacklist(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<BlacklistResponse>> {
    let blacklist = state.storage.list_blacklist().await?;
    Ok(Json(BlacklistResponse { blacklist }))
}

pub async fn add_to_blacklist(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBlacklistRequest>,
) -> ApiResult<Json<BlacklistSaved>> {
    let (ip, reason) = payload.validate()?;
    let entry = state
        .storage
        .add_to_blacklist(&ip, reason.as_deref())
        .await?;
    info!(ip = %entry.ip, "IP blacklisted");

    Ok(Json(BlacklistSaved {
        success: true,
        ip: entry.ip,
        reason: entry.reason,
    }))
}

pub async fn remove_from_blacklist(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> ApiResult<Json<IpRemoved>> {
    let ip = canonical_ip(&ip);
    if !state.storage.remove_from_blacklist(&ip).await? {
        return Err(ApiError::NotFound("IP not found in blacklist"));
    }
    info!(%ip, "IP removed from blacklist");

    Ok(Json(IpRemoved { success: true, ip }))
}

pub async fn list_tokens(State(state): State<Arc<AppState>>) -> ApiResult<Json<TokensResponse>> {
    let tokens = state.storage.list_tokens().await?;
    Ok(Json(TokensResponse { tokens }))
}

/// Issue a token. The secret is only ever returned here and by the list.
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTokenRequest>,
) -> ApiResult<Json<TokenCreated>> {
    let (name, scopes) = payload.validate()?;

    for _ in 0..TOKEN_CREATE_ATTEMPTS {
        match state
            .storage
            .create_token(&name, &generate_token_secret(), &scopes)
            .await
        {
            Ok(token) => {
                info!(id = token.id, name = %token.name, scopes = %Scope::join(&token.scopes), "API token created");
                return Ok(Json(TokenCreated {
                    success: true,
                    id: token.id,
                    token: token.token,
                    name: token.name,
                    scopes: token.scopes,
                }));
            }
            Err(StorageError::Conflict) => continue,
            Err(StorageError::Other(e)) => return Err(ApiError::Internal(e)),
        }
    }

    Err(ApiError::Internal(anyhow::anyhow!(
        "token secret collided {TOKEN_CREATE_ATTEMPTS} times"
    )))
}

pub async fn delete_token(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<TokenDeleted>> {
    let id = raw_id
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest("invalid id".to_string()))?;

    if !state.storage.delete_token(id).await? {
        return Err(ApiError::NotFound("Token not found"));
    }
    info!(id, "API token revoked");

    Ok(Json(TokenDeleted { success: true, id }))
}
