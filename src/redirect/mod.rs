pub mod handlers;
pub mod middleware;
pub mod routes;

pub use middleware::{log_requests, RequestLogged};
pub use routes::create_redirect_router;
