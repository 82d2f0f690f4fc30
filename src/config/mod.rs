use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub tracking: TrackingConfig,
    pub redirects: RedirectConfig,
    pub cache: CacheConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub password: String,
    /// Entries are single addresses, CIDR ranges, or `*`
    pub allowed_ips: Vec<String>,
}

/// Tuning for the hit-ingestion path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Dedup window in seconds; 0 disables rate limiting
    pub rate_limit_window_secs: u64,
    pub session_window_mins: u64,
    pub visitor_cookie_days: u64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectConfig {
    pub root: String,
    pub not_found: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub cursor_hmac_secret: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            rate_limit_window_secs: 60,
            session_window_mins: 30,
            visitor_cookie_days: 730,
            cookie_secure: false,
        }
    }
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            root: "https://example.com".to_string(),
            not_found: "https://example.com".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_secs: 60,
        }
    }
}

impl AdminConfig {
    pub const DEFAULT_PASSWORD: &'static str = "changeme";

    /// Check a client address against the allow-list.
    ///
    /// The address is the one resolved from the proxy header chain, so it
    /// may be `"unknown"` or otherwise unparseable; such values only match
    /// an identical literal entry or the `*` wildcard.
    pub fn allows(&self, client_ip: &str) -> bool {
        let parsed = IpAddr::from_str(client_ip).ok();

        self.allowed_ips.iter().any(|entry| {
            let entry = entry.trim();
            if entry == "*" || entry == client_ip {
                return true;
            }
            match (parsed, IpNet::from_str(entry)) {
                (Some(ip), Ok(net)) => net.contains(&ip),
                _ => matches!(
                    (parsed, IpAddr::from_str(entry)),
                    (Some(ip), Ok(allowed)) if ip == allowed
                ),
            }
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match env_or("DATABASE_BACKEND", "sqlite").to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = env_or("DATABASE_URL", "sqlite://./data/app.db");
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 5u32)?;

        let host = env_or("HOST", "0.0.0.0");
        let port = env_parse("PORT", 3000u16)?;

        let password = env_or("ADMIN_PASSWORD", AdminConfig::DEFAULT_PASSWORD);
        let allowed_ips = env_or("ALLOWED_ADMIN_IPS", "127.0.0.1")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let tracking = TrackingConfig {
            rate_limit_window_secs: env_parse("RATE_LIMIT_WINDOW", 60u64)?,
            session_window_mins: env_parse("SESSION_WINDOW_MIN", 30u64)?.max(1),
            visitor_cookie_days: env_parse("USER_COOKIE_MAX_DAYS", 730u64)?.max(1),
            cookie_secure: env_flag("COOKIE_SECURE"),
        };

        let root = env_or("ROOT_REDIRECT", "https://example.com");
        let not_found = std::env::var("NOT_FOUND_REDIRECT").unwrap_or_else(|_| root.clone());

        let cache = CacheConfig {
            max_entries: env_parse("CACHE_MAX_ENTRIES", 10_000u64)?,
            ttl_secs: env_parse("CACHE_TTL_SECS", 60u64)?,
        };

        let cursor_hmac_secret = std::env::var("CURSOR_HMAC_SECRET").ok();

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            admin: AdminConfig {
                password,
                allowed_ips,
            },
            tracking,
            redirects: RedirectConfig { root, not_found },
            cache,
            pagination: PaginationConfig { cursor_hmac_secret },
        })
    }
}
