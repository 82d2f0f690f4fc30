use crate::models::{
    ApiToken, ApiTokenRow, Hit, IpBlacklistEntry, Link, LinkSummary, LogLevel, NewHit,
    NewRequestLog, RequestLog, Scope,
};
use crate::storage::filter::{push_filter, DimensionCount, FilterValue, HitFilter, StatsDimension};
use crate::storage::sqlite::{HIT_COLUMNS, LOG_COLUMNS, LOG_INDEXES};
use crate::storage::{HitInsert, Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn bind_value(qb: &mut QueryBuilder<'_, Postgres>, value: FilterValue) {
    match value {
        FilterValue::Text(text) => {
            qb.push_bind(text);
        }
        FilterValue::Int(int) => {
            qb.push_bind(int);
        }
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                slug TEXT PRIMARY KEY,
                destination TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hits (
                id BIGSERIAL PRIMARY KEY,
                hit_type TEXT NOT NULL,
                slug TEXT NOT NULL,
                ip TEXT,
                timestamp TEXT NOT NULL,
                user_agent TEXT,
                browser TEXT,
                os TEXT,
                device TEXT,
                referer TEXT,
                accept_language TEXT,
                query_params TEXT,
                session_id TEXT,
                visitor_id TEXT,
                extra TEXT,
                rate_limit_key TEXT UNIQUE,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        for (name, column) in [
            ("idx_hits_slug", "slug"),
            ("idx_hits_type", "hit_type"),
            ("idx_hits_timestamp", "timestamp"),
            ("idx_hits_ip", "ip"),
            ("idx_hits_session", "session_id"),
            ("idx_hits_visitor", "visitor_id"),
        ] {
            sqlx::query(&format!("CREATE INDEX IF NOT EXISTS {name} ON hits({column})"))
                .execute(self.pool.as_ref())
                .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ip_blacklist (
                ip TEXT PRIMARY KEY,
                reason TEXT,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_tokens (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                token TEXT NOT NULL UNIQUE,
                scopes TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                last_used_at BIGINT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id BIGSERIAL PRIMARY KEY,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                path TEXT,
                method TEXT,
                status_code BIGINT,
                duration_ms DOUBLE PRECISION,
                ip TEXT,
                error_stack TEXT,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        for (name, column) in LOG_INDEXES {
            sqlx::query(&format!("CREATE INDEX IF NOT EXISTS {name} ON logs({column})"))
                .execute(self.pool.as_ref())
                .await?;
        }

        Ok(())
    }

    async fn upsert_link(&self, slug: &str, destination: &str) -> Result<Link> {
        let now = now();
        let link = sqlx::query_as::<_, Link>(
            r#"
            INSERT INTO links (slug, destination, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (slug) DO UPDATE SET
                destination = EXCLUDED.destination,
                updated_at = EXCLUDED.updated_at
            RETURNING slug, destination, created_at, updated_at
            "#,
        )
        .bind(slug)
        .bind(destination)
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn get_link(&self, slug: &str) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(
            "SELECT slug, destination, created_at, updated_at FROM links WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn delete_link(&self, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM links WHERE slug = $1")
            .bind(slug)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_links(&self) -> Result<Vec<LinkSummary>> {
        let links = sqlx::query_as::<_, LinkSummary>(
            r#"
            SELECT l.slug, l.destination, l.created_at, l.updated_at, COUNT(h.id) AS hits
            FROM links l
            LEFT JOIN hits h ON h.slug = l.slug AND h.hit_type = 'redirect'
            GROUP BY l.slug, l.destination, l.created_at, l.updated_at
            ORDER BY l.created_at DESC, l.slug ASC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(links)
    }

    async fn count_links(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM links")
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count)
    }

    async fn insert_hit(&self, hit: &NewHit) -> Result<HitInsert> {
        let result = sqlx::query(
            r#"
            INSERT INTO hits (
                hit_type, slug, ip, timestamp, user_agent, browser, os, device,
                referer, accept_language, query_params, session_id, visitor_id,
                extra, rate_limit_key, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (rate_limit_key) DO NOTHING
            "#,
        )
        .bind(hit.hit_type.as_str())
        .bind(&hit.slug)
        .bind(&hit.ip)
        .bind(&hit.timestamp)
        .bind(&hit.user_agent)
        .bind(&hit.browser)
        .bind(&hit.os)
        .bind(&hit.device)
        .bind(&hit.referer)
        .bind(&hit.accept_language)
        .bind(&hit.query_params)
        .bind(&hit.session_id)
        .bind(&hit.visitor_id)
        .bind(&hit.extra)
        .bind(&hit.rate_limit_key)
        .bind(hit.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(if result.rows_affected() == 0 {
            HitInsert::Duplicate
        } else {
            HitInsert::Inserted
        })
    }

    async fn list_hits(&self, filter: &HitFilter, limit: Option<i64>) -> Result<Vec<Hit>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {HIT_COLUMNS} FROM hits"));
        push_filter(&mut qb, filter, bind_value);
        qb.push(" ORDER BY id DESC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let hits = qb
            .build_query_as::<Hit>()
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(hits)
    }

    async fn count_hits(&self, filter: &HitFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM hits");
        push_filter(&mut qb, filter, bind_value);

        let (count,) = qb
            .build_query_as::<(i64,)>()
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count)
    }

    async fn aggregate_hits(
        &self,
        filter: &HitFilter,
        dimension: StatsDimension,
    ) -> Result<Vec<DimensionCount>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT COALESCE({}, 'unknown') AS dimension, COUNT(*) AS count FROM hits",
            dimension.column()
        ));
        push_filter(&mut qb, filter, bind_value);
        qb.push(" GROUP BY 1 ORDER BY 2 DESC, 1 ASC");

        let counts = qb
            .build_query_as::<DimensionCount>()
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(counts)
    }

    async fn delete_hits_by_slug(&self, slug: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM hits WHERE slug = $1")
            .bind(slug)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }

    async fn add_to_blacklist(&self, ip: &str, reason: Option<&str>) -> Result<IpBlacklistEntry> {
        let entry = sqlx::query_as::<_, IpBlacklistEntry>(
            r#"
            INSERT INTO ip_blacklist (ip, reason, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (ip) DO UPDATE SET reason = EXCLUDED.reason
            RETURNING ip, reason, created_at
            "#,
        )
        .bind(ip)
        .bind(reason)
        .bind(now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(entry)
    }

    async fn remove_from_blacklist(&self, ip: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ip_blacklist WHERE ip = $1")
            .bind(ip)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_blacklisted(&self, ip: &str) -> Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM ip_blacklist WHERE ip = $1)")
                .bind(ip)
                .fetch_one(self.pool.as_ref())
                .await?;

        Ok(exists)
    }

    async fn list_blacklist(&self) -> Result<Vec<IpBlacklistEntry>> {
        let entries = sqlx::query_as::<_, IpBlacklistEntry>(
            "SELECT ip, reason, created_at FROM ip_blacklist ORDER BY created_at DESC, ip ASC",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(entries)
    }

    async fn create_token(
        &self,
        name: &str,
        secret: &str,
        scopes: &[Scope],
    ) -> StorageResult<ApiToken> {
        let row = sqlx::query_as::<_, ApiTokenRow>(
            r#"
            INSERT INTO api_tokens (name, token, scopes, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (token) DO NOTHING
            RETURNING id, name, token, scopes, created_at, last_used_at
            "#,
        )
        .bind(name)
        .bind(secret)
        .bind(Scope::join(scopes))
        .bind(now())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        row.map(ApiToken::from).ok_or(StorageError::Conflict)
    }

    async fn get_token_by_secret(&self, secret: &str) -> Result<Option<ApiToken>> {
        let row = sqlx::query_as::<_, ApiTokenRow>(
            r#"
            SELECT id, name, token, scopes, created_at, last_used_at
            FROM api_tokens
            WHERE token = $1
            "#,
        )
        .bind(secret)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(ApiToken::from))
    }

    async fn list_tokens(&self) -> Result<Vec<ApiToken>> {
        let rows = sqlx::query_as::<_, ApiTokenRow>(
            r#"
            SELECT id, name, token, scopes, created_at, last_used_at
            FROM api_tokens
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(ApiToken::from).collect())
    }

    async fn delete_token(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_token(&self, id: i64, at: i64) -> Result<()> {
        sqlx::query("UPDATE api_tokens SET last_used_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn insert_log(&self, entry: &NewRequestLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO logs (
                timestamp, level, message, path, method, status_code,
                duration_ms, ip, error_stack, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&entry.timestamp)
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(&entry.path)
        .bind(&entry.method)
        .bind(entry.status_code)
        .bind(entry.duration_ms)
        .bind(&entry.ip)
        .bind(&entry.error_stack)
        .bind(entry.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn list_logs(
        &self,
        level: Option<LogLevel>,
        since: Option<i64>,
        limit: i64,
    ) -> Result<Vec<RequestLog>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {LOG_COLUMNS} FROM logs WHERE 1 = 1"));
        if let Some(level) = level {
            qb.push(" AND level = ").push_bind(level.as_str());
        }
        if let Some(since) = since {
            qb.push(" AND created_at >= ").push_bind(since);
        }
        qb.push(" ORDER BY id DESC LIMIT ").push_bind(limit);

        let logs = qb
            .build_query_as::<RequestLog>()
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(logs)
    }

    async fn count_logs(&self, level: LogLevel, since: Option<i64>) -> Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM logs WHERE level = ");
        qb.push_bind(level.as_str());
        if let Some(since) = since {
            qb.push(" AND created_at >= ").push_bind(since);
        }

        let (count,) = qb
            .build_query_as::<(i64,)>()
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count)
    }

    async fn snapshot(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}
