//! Visitor and session cookies
//!
//! Two independent pseudo-identities: a long-lived visitor id and a short
//! session id. Both are re-issued on every tracking response so their
//! expiry slides forward while the client keeps coming back.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::prelude::*;
use time::Duration;

use crate::config::TrackingConfig;

pub const VISITOR_COOKIE: &str = "ls_uid";
pub const SESSION_COOKIE: &str = "ls_sess";

const VISITOR_ID_BYTES: usize = 18;
const SESSION_ID_BYTES: usize = 16;
const MIN_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub visitor_id: String,
    pub session_id: String,
}

/// An id is accepted when it is at least 16 URL-safe base64 characters.
pub fn is_valid_id(value: &str) -> bool {
    value.len() >= MIN_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Random URL-safe id from `len` bytes of the thread-local CSPRNG.
pub fn generate_id(len: usize) -> String {
    use rand::RngExt;
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random::<u8>()).collect();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

fn existing_or_new(jar: &CookieJar, name: &str, len: usize) -> String {
    jar.get(name)
        .map(|cookie| cookie.value())
        .filter(|value| is_valid_id(value))
        .map(str::to_string)
        .unwrap_or_else(|| generate_id(len))
}

fn tracking_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

/// Read or mint both ids and queue fresh `Set-Cookie` directives for them.
pub fn resolve_identity(jar: CookieJar, config: &TrackingConfig) -> (CookieJar, ClientIdentity) {
    let visitor_id = existing_or_new(&jar, VISITOR_COOKIE, VISITOR_ID_BYTES);
    let session_id = existing_or_new(&jar, SESSION_COOKIE, SESSION_ID_BYTES);

    let jar = jar
        .add(tracking_cookie(
            VISITOR_COOKIE,
            visitor_id.clone(),
            Duration::days(config.visitor_cookie_days as i64),
            config.cookie_secure,
        ))
        .add(tracking_cookie(
            SESSION_COOKIE,
            session_id.clone(),
            Duration::minutes(config.session_window_mins as i64),
            config.cookie_secure,
        ));

    (
        jar,
        ClientIdentity {
            visitor_id,
            session_id,
        },
    )
}
