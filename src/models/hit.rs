use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Slug recorded for hits on the site root
pub const ROOT_SLUG: &str = "__root__";
/// Prefix of the slug recorded for requests that matched no route
pub const NOT_FOUND_SLUG_PREFIX: &str = "__404__:";

/// Kind of tracking request that produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitType {
    Redirect,
    Pixel,
    Page,
    Event,
}

impl HitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitType::Redirect => "redirect",
            HitType::Pixel => "pixel",
            HitType::Page => "page",
            HitType::Event => "event",
        }
    }
}

impl fmt::Display for HitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HitType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redirect" => Ok(HitType::Redirect),
            "pixel" => Ok(HitType::Pixel),
            "page" => Ok(HitType::Page),
            "event" => Ok(HitType::Event),
            _ => Err(()),
        }
    }
}

/// A persisted hit row
///
/// `query_params` and `extra` hold sanitized JSON documents as text.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Hit {
    pub id: i64,
    #[serde(rename = "type")]
    pub hit_type: String,
    pub slug: String,
    pub ip: Option<String>,
    pub timestamp: String,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub referer: Option<String>,
    pub accept_language: Option<String>,
    pub query_params: Option<String>,
    pub session_id: Option<String>,
    pub visitor_id: Option<String>,
    pub extra: Option<String>,
    pub rate_limit_key: Option<String>,
    pub created_at: i64,
}

/// A hit ready for insertion; every string has already been sanitized
#[derive(Debug, Clone)]
pub struct NewHit {
    pub hit_type: HitType,
    pub slug: String,
    pub ip: String,
    pub timestamp: String,
    pub user_agent: String,
    pub browser: String,
    pub os: String,
    pub device: String,
    pub referer: String,
    pub accept_language: String,
    pub query_params: Option<String>,
    pub session_id: Option<String>,
    pub visitor_id: Option<String>,
    pub extra: Option<String>,
    pub rate_limit_key: Option<String>,
    pub created_at: i64,
}
