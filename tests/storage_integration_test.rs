//! Storage backend tests
//!
//! SQLite runs in memory, or in a temporary file when a test needs more
//! than one pooled connection. PostgreSQL tests run only when `DATABASE_URL`
//! points at a Postgres instance; filter with `DATABASE_BACKEND`.

use linktrail::models::{HitType, LogLevel, NewHit, NewRequestLog, Scope};
use linktrail::storage::{
    CachedStorage, HitFilter, HitInsert, PostgresStorage, SqliteStorage, StatsDimension, Storage,
    StorageError,
};
use std::path::Path;
use std::sync::Arc;

fn should_test_backend(backend: &str) -> bool {
    match std::env::var("DATABASE_BACKEND") {
        Ok(val) => val.to_lowercase() == backend.to_lowercase(),
        Err(_) => true,
    }
}

async fn create_sqlite_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// File-backed SQLite with a real connection pool
async fn create_sqlite_file_storage(dir: &Path) -> Arc<dyn Storage> {
    let url = format!("sqlite://{}", dir.join("linktrail.db").display());
    let storage = SqliteStorage::new(&url, 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn create_postgres_storage() -> Option<Arc<dyn Storage>> {
    let db_url = std::env::var("DATABASE_URL").ok()?;
    if !db_url.starts_with("postgres") {
        return None;
    }
    let storage = PostgresStorage::new(&db_url, 5).await.ok()?;
    storage.init().await.ok()?;
    Some(Arc::new(storage))
}

/// Every backend the environment provides
async fn backends() -> Vec<(&'static str, Arc<dyn Storage>)> {
    let mut backends = Vec::new();
    if should_test_backend("sqlite") {
        backends.push(("sqlite", create_sqlite_storage().await));
    }
    if should_test_backend("postgres") {
        if let Some(storage) = create_postgres_storage().await {
            backends.push(("postgres", storage));
        }
    }
    backends
}

/// Slugs are prefixed per test so a shared Postgres database stays usable
fn new_hit(slug: &str, ip: &str, rate_limit_key: Option<String>) -> NewHit {
    NewHit {
        hit_type: HitType::Pixel,
        slug: slug.to_string(),
        ip: ip.to_string(),
        timestamp: "2024-01-01T00:00:00.000Z".to_string(),
        user_agent: "Unknown".to_string(),
        browser: "Chrome 120".to_string(),
        os: "Windows 10".to_string(),
        device: "desktop".to_string(),
        referer: "Direct".to_string(),
        accept_language: "en".to_string(),
        query_params: None,
        session_id: None,
        visitor_id: None,
        extra: None,
        rate_limit_key,
        created_at: 1_704_067_200,
    }
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", linktrail::tracking::identity::generate_id(6))
}

#[tokio::test]
async fn test_link_upsert_and_delete() {
    for (backend, storage) in backends().await {
        let slug = unique("link");

        let created = storage.upsert_link(&slug, "https://a.example.com").await.unwrap();
        let updated = storage.upsert_link(&slug, "https://b.example.com").await.unwrap();
        assert_eq!(created.created_at, updated.created_at, "{backend}");
        assert_eq!(updated.destination, "https://b.example.com", "{backend}");

        let fetched = storage.get_link(&slug).await.unwrap().unwrap();
        assert_eq!(fetched.destination, "https://b.example.com", "{backend}");

        assert!(storage.delete_link(&slug).await.unwrap(), "{backend}");
        assert!(!storage.delete_link(&slug).await.unwrap(), "{backend}");
        assert!(storage.get_link(&slug).await.unwrap().is_none(), "{backend}");
    }
}

#[tokio::test]
async fn test_link_list_counts_redirect_hits() {
    for (backend, storage) in backends().await {
        let slug = unique("counted");
        storage.upsert_link(&slug, "https://a.example.com").await.unwrap();

        let mut redirect = new_hit(&slug, "1.1.1.1", None);
        redirect.hit_type = HitType::Redirect;
        storage.insert_hit(&redirect).await.unwrap();
        storage.insert_hit(&redirect).await.unwrap();
        storage.insert_hit(&new_hit(&slug, "1.1.1.1", None)).await.unwrap();

        let links = storage.list_links().await.unwrap();
        let summary = links.iter().find(|l| l.slug == slug).unwrap();
        assert_eq!(summary.hits, 2, "{backend}");
    }
}

#[tokio::test]
async fn test_duplicate_rate_limit_key_is_rejected() {
    for (backend, storage) in backends().await {
        let slug = unique("dup");
        let key = Some(format!("1.1.1.1|{slug}|1700000020"));

        let first = storage.insert_hit(&new_hit(&slug, "1.1.1.1", key.clone())).await.unwrap();
        let second = storage.insert_hit(&new_hit(&slug, "1.1.1.1", key)).await.unwrap();
        assert_eq!(first, HitInsert::Inserted, "{backend}");
        assert_eq!(second, HitInsert::Duplicate, "{backend}");

        // no key means no dedup
        storage.insert_hit(&new_hit(&slug, "1.1.1.1", None)).await.unwrap();
        storage.insert_hit(&new_hit(&slug, "1.1.1.1", None)).await.unwrap();

        let count = storage.count_hits(&HitFilter::for_slug(&slug)).await.unwrap();
        assert_eq!(count, 3, "{backend}");
    }
}

#[tokio::test]
async fn test_concurrent_duplicates_store_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let mut pooled = Vec::new();
    if should_test_backend("sqlite") {
        pooled.push(("sqlite", create_sqlite_file_storage(dir.path()).await));
    }
    if should_test_backend("postgres") {
        if let Some(storage) = create_postgres_storage().await {
            pooled.push(("postgres", storage));
        }
    }

    for (backend, storage) in pooled {
        let slug = unique("race");
        let key = format!("5.5.5.5|{slug}|1700000020");

        let mut handles = vec![];
        for _ in 0..20 {
            let storage = Arc::clone(&storage);
            let hit = new_hit(&slug, "5.5.5.5", Some(key.clone()));
            handles.push(tokio::spawn(async move { storage.insert_hit(&hit).await }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == HitInsert::Inserted {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1, "{backend}");
        let count = storage.count_hits(&HitFilter::for_slug(&slug)).await.unwrap();
        assert_eq!(count, 1, "{backend}");
    }
}

#[tokio::test]
async fn test_hit_filters_and_keyset() {
    for (backend, storage) in backends().await {
        let slug = unique("filter");
        for ip in ["1.1.1.1", "2.2.2.2", "1.1.1.1"] {
            storage.insert_hit(&new_hit(&slug, ip, None)).await.unwrap();
        }

        let by_ip = HitFilter {
            slug: Some(slug.clone()),
            ip: Some("1.1.1.1".to_string()),
            ..HitFilter::default()
        };
        assert_eq!(storage.count_hits(&by_ip).await.unwrap(), 2, "{backend}");

        let page = storage.list_hits(&HitFilter::for_slug(&slug), Some(2)).await.unwrap();
        assert_eq!(page.len(), 2, "{backend}");
        assert!(page[0].id > page[1].id, "{backend}");

        let rest = HitFilter {
            before_id: Some(page[1].id),
            ..HitFilter::for_slug(&slug)
        };
        let rest = storage.list_hits(&rest, None).await.unwrap();
        assert_eq!(rest.len(), 1, "{backend}");
        assert!(rest[0].id < page[1].id, "{backend}");

        let by_type = HitFilter {
            hit_type: Some(HitType::Event),
            ..HitFilter::for_slug(&slug)
        };
        assert_eq!(storage.count_hits(&by_type).await.unwrap(), 0, "{backend}");
    }
}

#[tokio::test]
async fn test_aggregate_orders_by_count() {
    for (backend, storage) in backends().await {
        let slug = unique("agg");
        for ip in ["3.3.3.3", "4.4.4.4", "4.4.4.4"] {
            storage.insert_hit(&new_hit(&slug, ip, None)).await.unwrap();
        }

        let rows = storage
            .aggregate_hits(&HitFilter::for_slug(&slug), StatsDimension::Ip)
            .await
            .unwrap();
        let rows: Vec<(String, i64)> = rows.into_iter().map(|r| (r.dimension, r.count)).collect();
        assert_eq!(
            rows,
            vec![("4.4.4.4".to_string(), 2), ("3.3.3.3".to_string(), 1)],
            "{backend}"
        );

        let deleted = storage.delete_hits_by_slug(&slug).await.unwrap();
        assert_eq!(deleted, 3, "{backend}");
    }
}

#[tokio::test]
async fn test_blacklist_round_trip() {
    for (backend, storage) in backends().await {
        let ip = "198.51.100.77";
        storage.remove_from_blacklist(ip).await.unwrap();

        storage.add_to_blacklist(ip, Some("first")).await.unwrap();
        let entry = storage.add_to_blacklist(ip, Some("second")).await.unwrap();
        assert_eq!(entry.reason.as_deref(), Some("second"), "{backend}");
        assert!(storage.is_blacklisted(ip).await.unwrap(), "{backend}");

        assert!(storage.remove_from_blacklist(ip).await.unwrap(), "{backend}");
        assert!(!storage.is_blacklisted(ip).await.unwrap(), "{backend}");
    }
}

#[tokio::test]
async fn test_token_secret_conflict() {
    for (backend, storage) in backends().await {
        let secret = linktrail::models::generate_token_secret();
        let token = storage
            .create_token("ci", &secret, &[Scope::Hits, Scope::Stats])
            .await
            .unwrap();
        assert_eq!(token.scopes, vec![Scope::Hits, Scope::Stats], "{backend}");

        let again = storage.create_token("ci", &secret, &[Scope::Hits]).await;
        assert!(matches!(again, Err(StorageError::Conflict)), "{backend}");

        storage.touch_token(token.id, 1_700_000_000).await.unwrap();
        let found = storage.get_token_by_secret(&secret).await.unwrap().unwrap();
        assert_eq!(found.last_used_at, Some(1_700_000_000), "{backend}");

        assert!(storage.delete_token(token.id).await.unwrap(), "{backend}");
        assert!(storage.get_token_by_secret(&secret).await.unwrap().is_none(), "{backend}");
    }
}

#[tokio::test]
async fn test_cached_storage_sees_writes() {
    let inner = create_sqlite_storage().await;
    let storage = CachedStorage::new(inner, 100, 60);

    assert!(storage.get_link("cached").await.unwrap().is_none());
    storage.upsert_link("cached", "https://a.example.com").await.unwrap();
    assert_eq!(
        storage.get_link("cached").await.unwrap().unwrap().destination,
        "https://a.example.com"
    );

    assert!(!storage.is_blacklisted("7.7.7.7").await.unwrap());
    storage.add_to_blacklist("7.7.7.7", None).await.unwrap();
    assert!(storage.is_blacklisted("7.7.7.7").await.unwrap());
}

#[tokio::test]
async fn test_request_logs_filter_by_level_and_window() {
    for (backend, storage) in backends().await {
        let marker = unique("logs");
        let mut old_error = NewRequestLog::now(LogLevel::Error, format!("{marker} old"));
        old_error.created_at -= 7200;
        storage.insert_log(&old_error).await.unwrap();

        let mut not_found = NewRequestLog::now(LogLevel::Warn, format!("{marker} missing"));
        not_found.status_code = Some(404);
        not_found.duration_ms = Some(1.5);
        not_found.path = Some("/missing".to_string());
        storage.insert_log(&not_found).await.unwrap();
        storage
            .insert_log(&NewRequestLog::now(LogLevel::Error, format!("{marker} new")))
            .await
            .unwrap();

        let hour_ago = chrono::Utc::now().timestamp() - 3600;
        let recent = storage
            .list_logs(Some(LogLevel::Error), Some(hour_ago), 10)
            .await
            .unwrap();
        assert!(recent.iter().any(|l| l.message == format!("{marker} new")), "{backend}");
        assert!(!recent.iter().any(|l| l.message == format!("{marker} old")), "{backend}");

        let newest = storage.list_logs(None, None, 3).await.unwrap();
        assert_eq!(newest[0].message, format!("{marker} new"), "{backend}");
        assert_eq!(newest[1].level, "warn", "{backend}");
        assert_eq!(newest[1].status_code, Some(404), "{backend}");
        assert_eq!(newest[1].duration_ms, Some(1.5), "{backend}");
        assert_eq!(newest[1].path.as_deref(), Some("/missing"), "{backend}");

        let all_errors = storage.count_logs(LogLevel::Error, None).await.unwrap();
        let recent_errors = storage.count_logs(LogLevel::Error, Some(hour_ago)).await.unwrap();
        assert!(all_errors > recent_errors, "{backend}");
    }
}

#[tokio::test]
async fn test_sqlite_snapshot_is_a_database_file() {
    let storage = create_sqlite_storage().await;
    storage
        .upsert_link("snap", "https://example.com/")
        .await
        .unwrap();

    let bytes = storage.snapshot().await.unwrap().unwrap();
    assert!(bytes.starts_with(b"SQLite format 3\0"));

    let cached = CachedStorage::new(storage, 10, 60);
    assert!(cached.snapshot().await.unwrap().is_some());
}
