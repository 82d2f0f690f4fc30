use axum::{
    extract::Request,
    middleware::{self, Next},
    routing::{delete, get},
    Router,
};
use std::sync::Arc;

use crate::auth::{admin_auth, token_auth};
use crate::models::Scope;
use crate::state::AppState;
use crate::tracking::ClientIp;

use super::export::export_csv;
use super::handlers::{
    add_to_blacklist, create_token, delete_link, delete_token, list_blacklist, list_links,
    list_tokens, remove_from_blacklist, upsert_link,
};
use super::hits::{admin_stats, api_stats, list_hits, purge_hits};
use super::logs::{download_db, list_logs};

/// `/admin/...`: IP allow-list plus bearer password
pub fn create_admin_router(state: Arc<AppState>) -> Router {
    let guard_state = Arc::clone(&state);

    Router::new()
        .route("/admin/links", get(list_links).post(upsert_link))
        .route("/admin/links/{slug}", delete(delete_link))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/hits", get(list_hits))
        .route("/admin/hits/{slug}", delete(purge_hits))
        .route("/admin/export/csv", get(export_csv))
        .route("/admin/blacklist", get(list_blacklist).post(add_to_blacklist))
        .route("/admin/blacklist/{ip}", delete(remove_from_blacklist))
        .route("/admin/tokens", get(list_tokens).post(create_token))
        .route("/admin/tokens/{id}", delete(delete_token))
        .route("/admin/logs", get(list_logs))
        .route("/admin/download/db", get(download_db))
        .route_layer(middleware::from_fn(
            move |client_ip: ClientIp, req: Request, next: Next| {
                admin_auth(Arc::clone(&guard_state), client_ip, req, next)
            },
        ))
        .with_state(state)
}

/// Routes that all require `scope`
fn scoped(state: &Arc<AppState>, scope: Scope, routes: Router<Arc<AppState>>) -> Router {
    let guard_state = Arc::clone(state);
    routes
        .route_layer(middleware::from_fn(move |req: Request, next: Next| {
            token_auth(Arc::clone(&guard_state), scope, req, next)
        }))
        .with_state(Arc::clone(state))
}

/// `/api/...`: bearer or `?access_token=` token, one scope per group
pub fn create_api_router(state: Arc<AppState>) -> Router {
    let links = Router::new()
        .route("/api/links", get(list_links).post(upsert_link))
        .route("/api/links/{slug}", delete(delete_link));
    let hits = Router::new().route("/api/hits", get(list_hits));
    let stats = Router::new().route("/api/stats", get(api_stats));
    let export = Router::new().route("/api/export/csv", get(export_csv));
    let blacklist = Router::new()
        .route("/api/blacklist", get(list_blacklist).post(add_to_blacklist))
        .route("/api/blacklist/{ip}", delete(remove_from_blacklist));

    Router::new()
        .merge(scoped(&state, Scope::Links, links))
        .merge(scoped(&state, Scope::Hits, hits))
        .merge(scoped(&state, Scope::Stats, stats))
        .merge(scoped(&state, Scope::Export, export))
        .merge(scoped(&state, Scope::Blacklist, blacklist))
}
