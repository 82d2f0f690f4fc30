use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::storage::Storage;
use crate::tracking::Tracker;

/// Shared by every handler; built once at startup
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub config: Arc<Config>,
    pub tracker: Tracker,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, config: Config) -> Self {
        let tracker = Tracker::new(
            Arc::clone(&storage),
            config.tracking.rate_limit_window_secs,
        );
        Self {
            storage,
            config: Arc::new(config),
            tracker,
            started_at: Instant::now(),
        }
    }
}
