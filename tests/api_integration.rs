//! Admin and token-scoped API tests

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use linktrail::models::{LogLevel, NewRequestLog, Scope};
use linktrail::storage::HitFilter;
use serde_json::json;

fn pixel(slug: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/p/{slug}"))
        .header("user-agent", CHROME_UA)
        .body(Body::empty())
        .unwrap()
}

fn with_token(uri: &str, secret: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {secret}"))
        .body(Body::empty())
        .unwrap()
}

async fn token(app: &TestApp, scopes: &[Scope]) -> String {
    app.storage
        .create_token("test", &linktrail::models::generate_token_secret(), scopes)
        .await
        .unwrap()
        .token
}

#[tokio::test]
async fn test_admin_rejects_disallowed_ip() {
    let app = test_app().await;

    let response = app
        .send_from(peer([192, 168, 1, 20]), admin_get("/admin/links"))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await, json!({"error": "IP not allowed"}));
}

#[tokio::test]
async fn test_admin_allows_cidr_range() {
    let app = test_app().await;

    let response = app.send_from(peer([10, 1, 2, 3]), admin_get("/admin/links")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_requires_password() {
    let app = test_app().await;

    let missing = Request::builder()
        .uri("/admin/links")
        .body(Body::empty())
        .unwrap();
    let response = app.send(missing).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Missing or invalid authorization header"})
    );

    let wrong = with_token("/admin/links", "not-the-password");
    let response = app.send(wrong).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({"error": "Invalid password"}));
}

#[tokio::test]
async fn test_link_crud() {
    let app = test_app().await;

    let response = app
        .send(admin_json(
            "POST",
            "/admin/links",
            json!({"slug": "docs", "destination": "https://docs.example.com/"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"success": true, "slug": "docs", "destination": "https://docs.example.com/"})
    );

    // same slug again replaces the destination
    app.send(admin_json(
        "POST",
        "/admin/links",
        json!({"slug": "docs", "destination": "https://docs.example.com/v2"}),
    ))
    .await;
    let link = app.storage.get_link("docs").await.unwrap().unwrap();
    assert_eq!(link.destination, "https://docs.example.com/v2");

    app.send(Request::builder()
        .uri("/l/docs")
        .body(Body::empty())
        .unwrap())
        .await;

    let body = body_json(app.send(admin_get("/admin/links")).await).await;
    let links = body["links"].as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["slug"], "docs");
    assert_eq!(links[0]["hits"], 1);

    let response = app.send(admin_delete("/admin/links/docs")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.send(admin_delete("/admin/links/docs")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "Link not found"}));
}

#[tokio::test]
async fn test_link_validation() {
    let app = test_app().await;

    let response = app
        .send(admin_json(
            "POST",
            "/admin/links",
            json!({"slug": "no spaces!", "destination": "https://example.com"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(admin_json(
            "POST",
            "/admin/links",
            json!({"slug": "ok", "destination": "not a url"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(admin_json("POST", "/admin/links", json!({"slug": "ok"})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.storage.get_link("ok").await.unwrap().is_none());
}

#[tokio::test]
async fn test_admin_stats() {
    let app = test_app().await;
    app.send_from(peer([1, 1, 1, 1]), pixel("a")).await;
    app.send_from(peer([2, 2, 2, 2]), pixel("a")).await;
    app.send_from(peer([1, 1, 1, 1]), pixel("b")).await;

    let body = body_json(app.send(admin_get("/admin/stats")).await).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["byType"], json!({"pixel": 3}));
    assert_eq!(body["bySlug"], json!({"a": 2, "b": 1}));
    assert_eq!(body["byIP"], json!({"1.1.1.1": 2, "2.2.2.2": 1}));
    assert_eq!(body["byDevice"], json!({"desktop": 3}));
    assert_eq!(body["byReferer"], json!({"Direct": 3}));
    assert_eq!(body["recent"].as_array().unwrap().len(), 3);

    let body = body_json(app.send(admin_get("/admin/stats?slug=b")).await).await;
    assert_eq!(body["total"], 1);

    let response = app.send(admin_get("/admin/stats?type=bogus")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_hits_pagination() {
    let mut config = test_config();
    config.tracking.rate_limit_window_secs = 0;
    let app = test_app_with(config).await;
    for _ in 0..5 {
        app.send(pixel("promo")).await;
    }

    let body = body_json(app.send(admin_get("/admin/hits?limit=2")).await).await;
    let first: Vec<i64> = body["hits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["id"].as_i64().unwrap())
        .collect();
    assert_eq!(first.len(), 2);
    assert!(first[0] > first[1]);

    let cursor = body["next_cursor"].as_str().unwrap().to_string();
    let body = body_json(
        app.send(admin_get(&format!("/admin/hits?limit=2&cursor={cursor}")))
            .await,
    )
    .await;
    let second: Vec<i64> = body["hits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["id"].as_i64().unwrap())
        .collect();
    assert_eq!(second.len(), 2);
    assert!(second[0] < first[1]);

    let body = body_json(
        app.send(admin_get("/admin/hits?limit=10")).await,
    )
    .await;
    assert_eq!(body["hits"].as_array().unwrap().len(), 5);
    assert!(body.get("next_cursor").is_none());

    let response = app.send(admin_get("/admin/hits?cursor=forged.cursor")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_purge_hits() {
    let app = test_app().await;
    app.send(pixel("a")).await;
    app.send(pixel("b")).await;

    let body = body_json(app.send(admin_delete("/admin/hits/a")).await).await;
    assert_eq!(body, json!({"success": true, "slug": "a", "deleted": 1}));

    let body = body_json(app.send(admin_get("/admin/stats")).await).await;
    assert_eq!(body["bySlug"], json!({"b": 1}));
}

#[tokio::test]
async fn test_admin_csv_export() {
    let app = test_app().await;
    app.send_from(peer([1, 2, 3, 4]), pixel("promo")).await;

    let response = app.send(admin_get("/admin/export/csv")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/csv");
    let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"hits-"));

    let csv = String::from_utf8(body_bytes(response).await).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("\"ID\",\"Type\",\"Slug\""));
    assert!(lines[1].contains("\"pixel\",\"promo\",\"1.2.3.4\""));
}

#[tokio::test]
async fn test_blacklist_management() {
    let app = test_app().await;

    let response = app
        .send(admin_json(
            "POST",
            "/admin/blacklist",
            json!({"ip": "203.0.113.9", "reason": "scraper"}),
        ))
        .await;
    assert_eq!(
        body_json(response).await,
        json!({"success": true, "ip": "203.0.113.9", "reason": "scraper"})
    );

    let response = app
        .send(admin_json("POST", "/admin/blacklist", json!({"ip": "999.0.0.1"})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(app.send(admin_get("/admin/blacklist")).await).await;
    assert_eq!(body["blacklist"].as_array().unwrap().len(), 1);

    let response = app.send(admin_delete("/admin/blacklist/203.0.113.9")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.send(admin_delete("/admin/blacklist/203.0.113.9")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blacklist_matches_any_spelling_of_an_address() {
    let app = test_app().await;

    let response = app
        .send(admin_json("POST", "/admin/blacklist", json!({"ip": "2001:DB8::1"})))
        .await;
    assert_eq!(body_json(response).await["ip"], "2001:db8::1");

    let request = Request::builder()
        .uri("/p/promo")
        .header("x-forwarded-for", "2001:db8:0:0::1")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        app.storage.count_hits(&HitFilter::default()).await.unwrap(),
        0
    );

    let response = app.send(admin_delete("/admin/blacklist/2001:0DB8::0001")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ip"], "2001:db8::1");
}

#[tokio::test]
async fn test_token_lifecycle() {
    let app = test_app().await;

    let response = app
        .send(admin_json(
            "POST",
            "/admin/tokens",
            json!({"name": "dashboard", "scopes": ["stats", "stats", "bogus"]}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["scopes"], json!(["stats"]));
    let secret = created["token"].as_str().unwrap().to_string();
    assert_eq!(secret.len(), 48);
    let id = created["id"].as_i64().unwrap();

    let response = app.send(with_token("/api/stats", &secret)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.get("recent").is_none());

    let body = body_json(app.send(admin_get("/admin/tokens")).await).await;
    assert!(body["tokens"][0]["last_used_at"].is_i64());

    let response = app
        .send(admin_json("POST", "/admin/tokens", json!({"name": "x", "scopes": ["nope"]})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.send(admin_delete(&format!("/admin/tokens/{id}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.send(with_token("/api/stats", &secret)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(admin_delete("/admin/tokens/abc")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_token_scope_is_enforced() {
    let app = test_app().await;
    let secret = token(&app, &[Scope::Hits]).await;

    let response = app.send(with_token("/api/links", &secret)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await, json!({"error": "Missing scope: links"}));

    let response = app.send(with_token("/api/hits", &secret)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_via_query_string() {
    let app = test_app().await;
    let secret = token(&app, &[Scope::Export]).await;
    app.send(pixel("promo")).await;

    let response = app
        .send(Request::builder()
            .uri(format!("/api/export/csv?access_token={secret}&slug=promo"))
            .body(Body::empty())
            .unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/csv");
}

#[tokio::test]
async fn test_token_missing_or_invalid() {
    let app = test_app().await;

    let response = app
        .send(Request::builder()
            .uri("/api/hits")
            .body(Body::empty())
            .unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({"error": "Missing token"}));

    let response = app.send(with_token("/api/hits", "deadbeef")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({"error": "Invalid token"}));
}

#[tokio::test]
async fn test_api_is_not_ip_restricted() {
    let app = test_app().await;
    let secret = token(&app, &[Scope::Links, Scope::Blacklist]).await;

    let response = app
        .send_from(peer([192, 168, 1, 20]), with_token("/api/links", &secret))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send_from(peer([192, 168, 1, 20]), with_token("/api/blacklist", &secret))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

fn json_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("accept", "application/json")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_unknown_paths_are_logged_once_and_filterable() {
    let app = test_app().await;

    let response = app.send_from(peer([203, 0, 113, 5]), json_get("/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    app.storage
        .insert_log(&NewRequestLog::now(LogLevel::Error, "boom"))
        .await
        .unwrap();

    let body = body_json(app.send(admin_get("/admin/logs?level=warn")).await).await;
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["message"], "404 Not Found: GET /nope");
    assert_eq!(logs[0]["level"], "warn");
    assert_eq!(logs[0]["status_code"], 404);
    assert_eq!(logs[0]["method"], "GET");
    assert_eq!(logs[0]["path"], "/nope");
    assert_eq!(logs[0]["ip"], "203.0.113.5");

    let body = body_json(app.send(admin_get("/admin/logs?level=error")).await).await;
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["message"], "boom");

    let body = body_json(app.send(admin_get("/admin/logs?level=verbose")).await).await;
    assert!(body["logs"].as_array().unwrap().len() >= 2);

    let body = body_json(app.send(admin_get("/admin/logs?limit=1")).await).await;
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_client_errors_are_logged_by_the_request_logger() {
    let app = test_app().await;

    let response = app.send(json_get("/l/missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let logs = app
        .storage
        .list_logs(Some(LogLevel::Warn), None, 10)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].message.starts_with("GET /l/missing - 404 - "));
    assert!(logs[0].message.ends_with("ms"));
    assert_eq!(logs[0].status_code, Some(404));
    assert!(logs[0].duration_ms.is_some());
    assert_eq!(logs[0].ip.as_deref(), Some("127.0.0.1"));
}

#[tokio::test]
async fn test_health_degrades_with_recent_errors() {
    let app = test_app().await;

    let response = app.send(json_get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["errors_last_hour"], 0);
    assert_eq!(body["recent_errors"], json!([]));

    app.storage
        .insert_log(&NewRequestLog::now(LogLevel::Error, "first failure"))
        .await
        .unwrap();
    app.storage
        .insert_log(&NewRequestLog::now(LogLevel::Warn, "slow"))
        .await
        .unwrap();

    let response = app.send(json_get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["errors_total"], 1);
    assert_eq!(body["warnings_total"], 1);
    assert_eq!(body["errors_last_hour"], 1);
    assert_eq!(body["recent_errors"][0]["message"], "first failure");

    for i in 0..10 {
        app.storage
            .insert_log(&NewRequestLog::now(LogLevel::Error, format!("failure {i}")))
            .await
            .unwrap();
    }

    let response = app.send(json_get("/health")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["errors_last_hour"], 11);
    assert_eq!(body["recent_errors"].as_array().unwrap().len(), 5);
    assert_eq!(body["recent_errors"][0]["message"], "failure 9");

    // The 503 health responses above did not add to the error count
    assert_eq!(
        app.storage.count_logs(LogLevel::Error, None).await.unwrap(),
        11
    );
}

#[tokio::test]
async fn test_database_download() {
    let app = test_app().await;
    app.storage
        .upsert_link("docs", "https://docs.example.com/")
        .await
        .unwrap();

    let response = app.send(admin_get("/admin/download/db")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"app.db\""
    );
    let body = body_bytes(response).await;
    assert!(body.starts_with(b"SQLite format 3\0"));

    let response = app
        .send_from(peer([192, 168, 1, 20]), admin_get("/admin/download/db"))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
