use axum::{
    extract::Request,
    middleware::{self, Next},
    Router,
};
use std::sync::Arc;

use crate::api::{create_admin_router, create_api_router};
use crate::redirect::{create_redirect_router, log_requests};
use crate::state::AppState;
use crate::tracking::ClientIp;

/// The whole HTTP surface. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the peer
/// address is available when no proxy headers are present.
pub fn create_app(state: Arc<AppState>) -> Router {
    create_admin_router(Arc::clone(&state))
        .merge(create_api_router(Arc::clone(&state)))
        .merge(create_redirect_router(Arc::clone(&state)))
        .layer(middleware::from_fn(
            move |client_ip: ClientIp, req: Request, next: Next| {
                log_requests(Arc::clone(&state), client_ip, req, next)
            },
        ))
}
