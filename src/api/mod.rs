pub mod error;
pub mod export;
pub mod handlers;
pub mod hits;
pub mod logs;
pub mod routes;

pub use error::{ApiError, ApiResult, ErrorDetail, ErrorResponse};
pub use routes::{create_admin_router, create_api_router};
