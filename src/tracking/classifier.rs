//! User-agent classification and bot heuristics

use axum::http::HeaderMap;
use serde::Serialize;
use woothee::parser::Parser;

const UNKNOWN: &str = "Unknown";
const WOOTHEE_UNKNOWN: &str = "UNKNOWN";

const BOT_SIGNATURES: &[&str] = &[
    "bot",
    "spider",
    "crawler",
    "crawl",
    "slurp",
    "facebookexternalhit",
    "headlesschrome",
    "phantomjs",
    "lighthouse",
    "python-requests",
    "python-urllib",
    "curl/",
    "wget/",
    "go-http-client",
    "libwww-perl",
    "okhttp",
    "axios/",
    "node-fetch",
    "java/",
    "httpclient",
    "scrapy",
    "preview",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    /// Browser name and version, e.g. `"Chrome 120.0.0.0"`
    pub browser: String,
    /// OS name and version, e.g. `"Mac OSX 10.15.7"`
    pub os: String,
    /// `desktop`, `mobile`, `tablet` or `appliance`
    pub device: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            browser: UNKNOWN.to_string(),
            os: UNKNOWN.to_string(),
            device: "desktop".to_string(),
        }
    }
}

fn known(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && value != WOOTHEE_UNKNOWN).then_some(value)
}

fn name_with_version(name: &str, version: &str) -> String {
    let name = known(name).unwrap_or(UNKNOWN);
    match known(version) {
        Some(version) => format!("{name} {version}"),
        None => name.to_string(),
    }
}

/// Parse a user-agent string. Unparseable input yields `Unknown`/`desktop`.
pub fn classify(user_agent: &str) -> ClientInfo {
    let parser = Parser::new();
    let Some(result) = parser.parse(user_agent) else {
        return ClientInfo::default();
    };

    let os_version = result.os_version.to_string();
    let device = match result.category {
        "smartphone" if result.os == "iPad" || user_agent.contains("Tablet") => "tablet",
        "smartphone" | "mobilephone" => "mobile",
        "appliance" => "appliance",
        _ => "desktop",
    };

    ClientInfo {
        browser: name_with_version(result.name, result.version),
        os: name_with_version(result.os, &os_version),
        device: device.to_string(),
    }
}

/// Heuristic bot check from the user agent and client-hint headers.
pub fn is_bot(user_agent: &str, headers: &HeaderMap) -> bool {
    if user_agent.trim().is_empty() {
        return false;
    }

    let ua = user_agent.to_ascii_lowercase();
    if BOT_SIGNATURES.iter().any(|sig| ua.contains(sig)) {
        return true;
    }

    let headless_hint = headers
        .get("sec-ch-ua")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("headless"))
        .unwrap_or(false);
    if headless_hint {
        return true;
    }

    Parser::new()
        .parse(user_agent)
        .map(|result| result.category == "crawler")
        .unwrap_or(false)
}
