//! Shared helpers for the integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::connect_info::ConnectInfo,
    http::{Request, Response},
    Router,
};
use linktrail::config::{
    AdminConfig, CacheConfig, Config, DatabaseBackend, DatabaseConfig, PaginationConfig,
    RedirectConfig, ServerConfig, TrackingConfig,
};
use linktrail::cursor::init_cursor_hmac_key;
use linktrail::storage::{SqliteStorage, Storage};
use linktrail::{create_app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::{Layer, ServiceExt};

pub const ADMIN_PASSWORD: &str = "s3cret";
pub const ROOT_REDIRECT: &str = "https://home.example.com/";
pub const NOT_FOUND_REDIRECT: &str = "https://home.example.com/missing";
pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            backend: DatabaseBackend::Sqlite,
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        admin: AdminConfig {
            password: ADMIN_PASSWORD.to_string(),
            allowed_ips: vec!["127.0.0.1".to_string(), "10.0.0.0/8".to_string()],
        },
        tracking: TrackingConfig::default(),
        redirects: RedirectConfig {
            root: ROOT_REDIRECT.to_string(),
            not_found: NOT_FOUND_REDIRECT.to_string(),
        },
        cache: CacheConfig::default(),
        pagination: PaginationConfig {
            cursor_hmac_secret: Some("integration-secret".to_string()),
        },
    }
}

pub async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

pub struct TestApp {
    pub storage: Arc<dyn Storage>,
    pub router: Router,
}

pub async fn test_app_with(config: Config) -> TestApp {
    init_cursor_hmac_key(config.pagination.cursor_hmac_secret.as_deref());
    let storage = create_test_storage().await;
    let state = Arc::new(AppState::new(Arc::clone(&storage), config));
    TestApp {
        storage,
        router: create_app(state),
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(test_config()).await
}

/// Layer that stamps a fixed peer address on every request
#[derive(Clone)]
pub struct TestConnectInfoLayer(pub SocketAddr);

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware {
            inner,
            addr: self.0,
        }
    }
}

#[derive(Clone)]
pub struct TestConnectInfoMiddleware<S> {
    inner: S,
    addr: SocketAddr,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.extensions_mut().insert(ConnectInfo(self.addr));
        self.inner.call(req)
    }
}

pub fn peer(ip: [u8; 4]) -> SocketAddr {
    SocketAddr::from((ip, 40000))
}

impl TestApp {
    /// Send one request as if it arrived from `addr`
    pub async fn send_from(&self, addr: SocketAddr, request: Request<Body>) -> Response<Body> {
        TestConnectInfoLayer(addr)
            .layer(self.router.clone())
            .oneshot(request)
            .await
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.send_from(peer([127, 0, 0, 1]), request).await
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN_PASSWORD}"))
        .body(Body::empty())
        .unwrap()
}

pub fn admin_json(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN_PASSWORD}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn admin_delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN_PASSWORD}"))
        .body(Body::empty())
        .unwrap()
}

/// A `Set-Cookie` value for `name`, without attributes
pub fn set_cookie<B>(response: &Response<B>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find_map(|pair| {
            pair.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('='))
                .map(str::to_string)
        })
}
