pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod cursor;
pub mod models;
pub mod redirect;
pub mod state;
pub mod storage;
pub mod tracking;

pub use app::create_app;
pub use state::AppState;
