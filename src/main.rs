use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use linktrail::config::{AdminConfig, Config};
use linktrail::cursor::init_cursor_hmac_key;
use linktrail::storage::{self, CachedStorage, Storage};
use linktrail::{create_app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    info!(
        backend = ?config.database.backend,
        url = %config.database.url,
        "Initializing storage"
    );
    let storage = storage::open(&config.database).await?;
    let storage: Arc<dyn Storage> = Arc::new(CachedStorage::new(
        storage,
        config.cache.max_entries,
        config.cache.ttl_secs,
    ));
    info!("Database initialized successfully");

    init_cursor_hmac_key(config.pagination.cursor_hmac_secret.as_deref());
    if config.pagination.cursor_hmac_secret.is_none() {
        info!("CURSOR_HMAC_SECRET not set, hit cursors will not survive a restart");
    }

    if config.admin.password == AdminConfig::DEFAULT_PASSWORD {
        warn!("ADMIN_PASSWORD is the default value, set it before exposing the admin API");
    }
    info!(allowed = ?config.admin.allowed_ips, "Admin IP allow-list");

    if config.tracking.rate_limit_window_secs == 0 {
        info!("Rate limiting disabled, every hit is recorded");
    } else {
        info!(
            window_secs = config.tracking.rate_limit_window_secs,
            "Rate limiting one hit per ip and slug per window"
        );
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(storage, config));
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
