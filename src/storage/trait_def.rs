use crate::models::{
    ApiToken, Hit, IpBlacklistEntry, Link, LinkSummary, LogLevel, NewHit, NewRequestLog,
    RequestLog, Scope,
};
use crate::storage::filter::{DimensionCount, HitFilter, StatsDimension};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("token secret already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Result of a hit insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitInsert {
    Inserted,
    /// A hit with the same rate-limit key already exists
    Duplicate,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Create tables and indexes if missing
    async fn init(&self) -> Result<()>;

    /// Insert a link, or replace the destination of an existing slug
    async fn upsert_link(&self, slug: &str, destination: &str) -> Result<Link>;

    async fn get_link(&self, slug: &str) -> Result<Option<Link>>;

    /// Returns false when the slug did not exist
    async fn delete_link(&self, slug: &str) -> Result<bool>;

    /// All links, newest first, with their redirect-hit counts
    async fn list_links(&self) -> Result<Vec<LinkSummary>>;

    async fn count_links(&self) -> Result<i64>;

    /// Insert a hit; uniqueness of `rate_limit_key` is enforced by the store
    async fn insert_hit(&self, hit: &NewHit) -> Result<HitInsert>;

    /// Matching hits, newest first. `None` returns every match.
    async fn list_hits(&self, filter: &HitFilter, limit: Option<i64>) -> Result<Vec<Hit>>;

    async fn count_hits(&self, filter: &HitFilter) -> Result<i64>;

    /// Hit counts grouped by `dimension`, largest first; NULLs group as `unknown`
    async fn aggregate_hits(
        &self,
        filter: &HitFilter,
        dimension: StatsDimension,
    ) -> Result<Vec<DimensionCount>>;

    /// Bulk purge; returns the number of hits removed
    async fn delete_hits_by_slug(&self, slug: &str) -> Result<u64>;

    /// Add an IP, or update the reason of an existing entry
    async fn add_to_blacklist(&self, ip: &str, reason: Option<&str>) -> Result<IpBlacklistEntry>;

    async fn remove_from_blacklist(&self, ip: &str) -> Result<bool>;

    async fn is_blacklisted(&self, ip: &str) -> Result<bool>;

    async fn list_blacklist(&self) -> Result<Vec<IpBlacklistEntry>>;

    /// Fails with `StorageError::Conflict` if the secret is already taken
    async fn create_token(
        &self,
        name: &str,
        secret: &str,
        scopes: &[Scope],
    ) -> StorageResult<ApiToken>;

    async fn get_token_by_secret(&self, secret: &str) -> Result<Option<ApiToken>>;

    async fn list_tokens(&self) -> Result<Vec<ApiToken>>;

    async fn delete_token(&self, id: i64) -> Result<bool>;

    /// Record use of a token at unix time `at`
    async fn touch_token(&self, id: i64, at: i64) -> Result<()>;

    async fn insert_log(&self, entry: &NewRequestLog) -> Result<()>;

    /// Request logs, newest first, optionally restricted to one level and
    /// to entries created at or after unix time `since`
    async fn list_logs(
        &self,
        level: Option<LogLevel>,
        since: Option<i64>,
        limit: i64,
    ) -> Result<Vec<RequestLog>>;

    async fn count_logs(&self, level: LogLevel, since: Option<i64>) -> Result<i64>;

    /// A consistent copy of the whole database file, or `None` when the
    /// backend has no single-file form
    async fn snapshot(&self) -> Result<Option<Vec<u8>>>;
}
