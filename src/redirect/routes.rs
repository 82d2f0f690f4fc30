use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

use super::handlers::{collect, health_check, not_found, pixel, redirect_link, root};

/// Public tracking surface: redirects, pixel, beacon, health and the 404 catch-all
pub fn create_redirect_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/l/{slug}", get(redirect_link))
        .route("/p/{slug}", get(pixel))
        .route("/a/collect", post(collect).layer(cors))
        .fallback(not_found)
        .with_state(state)
}
