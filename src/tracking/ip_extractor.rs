//! Client IP extraction from proxy headers
//!
//! Resolution order:
//! - first entry of `X-Forwarded-For`
//! - `X-Real-IP`
//! - the socket peer address
//! - the literal `"unknown"`
//!
//! Proxies are trusted as-is. Parseable addresses are rendered in
//! canonical form so they match blacklist entries; anything else is
//! recorded as forwarded.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

pub const UNKNOWN_IP: &str = "unknown";

/// Extract the client IP from headers, falling back to the peer address
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    if let Some(ip) = header_value(headers, "x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return canonical_ip(ip);
    }

    if let Some(ip) = header_value(headers, "x-real-ip")
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return canonical_ip(ip);
    }

    peer.map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

/// Canonical text of an IP address, or the input unchanged when it does not parse
pub fn canonical_ip(raw: &str) -> String {
    raw.parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

/// Extractor yielding the resolved client IP.
///
/// Works with or without `ConnectInfo`; routers served without
/// `into_make_service_with_connect_info` fall through to `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(extract_client_ip(&parts.headers, peer)))
    }
}
