use crate::models::{
    ApiToken, Hit, IpBlacklistEntry, Link, LinkSummary, LogLevel, NewHit, NewRequestLog,
    RequestLog, Scope,
};
use crate::storage::filter::{DimensionCount, HitFilter, StatsDimension};
use crate::storage::{HitInsert, Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache for link resolution
///
/// Entries, including negative lookups, are invalidated when the same slug
/// is mutated through this wrapper. Writes made by another process (the
/// admin CLI) become visible once the TTL lapses. Blacklist checks are not
/// cached.
pub struct CachedStorage {
    /// Underlying storage implementation
    inner: Arc<dyn Storage>,
    /// Slug -> link, including negative lookups
    link_cache: Cache<String, Option<Link>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_cache_entries: u64, ttl_secs: u64) -> Self {
        let ttl = Duration::from_secs(ttl_secs.max(1));
        let link_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(ttl)
            .build();

        Self { inner, link_cache }
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn upsert_link(&self, slug: &str, destination: &str) -> Result<Link> {
        let link = self.inner.upsert_link(slug, destination).await?;
        self.link_cache
            .insert(slug.to_string(), Some(link.clone()))
            .await;
        Ok(link)
    }

    async fn get_link(&self, slug: &str) -> Result<Option<Link>> {
        if let Some(cached) = self.link_cache.get(slug).await {
            return Ok(cached);
        }

        let result = self.inner.get_link(slug).await?;
        self.link_cache
            .insert(slug.to_string(), result.clone())
            .await;
        Ok(result)
    }

    async fn delete_link(&self, slug: &str) -> Result<bool> {
        let deleted = self.inner.delete_link(slug).await?;
        self.link_cache.invalidate(slug).await;
        Ok(deleted)
    }

    async fn list_links(&self) -> Result<Vec<LinkSummary>> {
        self.inner.list_links().await
    }

    async fn count_links(&self) -> Result<i64> {
        self.inner.count_links().await
    }

    async fn insert_hit(&self, hit: &NewHit) -> Result<HitInsert> {
        self.inner.insert_hit(hit).await
    }

    async fn list_hits(&self, filter: &HitFilter, limit: Option<i64>) -> Result<Vec<Hit>> {
        self.inner.list_hits(filter, limit).await
    }

    async fn count_hits(&self, filter: &HitFilter) -> Result<i64> {
        self.inner.count_hits(filter).await
    }

    async fn aggregate_hits(
        &self,
        filter: &HitFilter,
        dimension: StatsDimension,
    ) -> Result<Vec<DimensionCount>> {
        self.inner.aggregate_hits(filter, dimension).await
    }

    async fn delete_hits_by_slug(&self, slug: &str) -> Result<u64> {
        self.inner.delete_hits_by_slug(slug).await
    }

    async fn add_to_blacklist(&self, ip: &str, reason: Option<&str>) -> Result<IpBlacklistEntry> {
        self.inner.add_to_blacklist(ip, reason).await
    }

    async fn remove_from_blacklist(&self, ip: &str) -> Result<bool> {
        self.inner.remove_from_blacklist(ip).await
    }

    async fn is_blacklisted(&self, ip: &str) -> Result<bool> {
        self.inner.is_blacklisted(ip).await
    }

    async fn list_blacklist(&self) -> Result<Vec<IpBlacklistEntry>> {
        self.inner.list_blacklist().await
    }

    async fn create_token(
        &self,
        name: &str,
        secret: &str,
        scopes: &[Scope],
    ) -> StorageResult<ApiToken> {
        self.inner.create_token(name, secret, scopes).await
    }

    async fn get_token_by_secret(&self, secret: &str) -> Result<Option<ApiToken>> {
        self.inner.get_token_by_secret(secret).await
    }

    async fn list_tokens(&self) -> Result<Vec<ApiToken>> {
        self.inner.list_tokens().await
    }

    async fn delete_token(&self, id: i64) -> Result<bool> {
        self.inner.delete_token(id).await
    }

    async fn touch_token(&self, id: i64, at: i64) -> Result<()> {
        self.inner.touch_token(id, at).await
    }

    async fn insert_log(&self, entry: &NewRequestLog) -> Result<()> {
        self.inner.insert_log(entry).await
    }

    async fn list_logs(
        &self,
        level: Option<LogLevel>,
        since: Option<i64>,
        limit: i64,
    ) -> Result<Vec<RequestLog>> {
        self.inner.list_logs(level, since, limit).await
    }

    async fn count_logs(&self, level: LogLevel, since: Option<i64>) -> Result<i64> {
        self.inner.count_logs(level, since).await
    }

    async fn snapshot(&self) -> Result<Option<Vec<u8>>> {
        self.inner.snapshot().await
    }
}
