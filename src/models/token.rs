use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use super::ValidationError;
use crate::tracking::sanitize::sanitize_str;

const TOKEN_SECRET_BYTES: usize = 24;

/// Capability an API token may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Links,
    Hits,
    Blacklist,
    Export,
    Stats,
}

impl Scope {
    pub const ALL: [Scope; 5] = [
        Scope::Links,
        Scope::Hits,
        Scope::Blacklist,
        Scope::Export,
        Scope::Stats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Links => "links",
            Scope::Hits => "hits",
            Scope::Blacklist => "blacklist",
            Scope::Export => "export",
            Scope::Stats => "stats",
        }
    }

    /// Parse a stored comma-separated scope list, skipping unknown names.
    pub fn parse_list(raw: &str) -> Vec<Scope> {
        raw.split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    pub fn join(scopes: &[Scope]) -> String {
        scopes
            .iter()
            .map(Scope::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| format!("unknown scope '{s}'"))
    }
}

/// Raw `api_tokens` row; scopes are stored comma-separated
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ApiTokenRow {
    pub id: i64,
    pub name: String,
    pub token: String,
    pub scopes: String,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiToken {
    pub id: i64,
    pub name: String,
    pub token: String,
    pub scopes: Vec<Scope>,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
}

impl ApiToken {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

impl From<ApiTokenRow> for ApiToken {
    fn from(row: ApiTokenRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            token: row.token,
            scopes: Scope::parse_list(&row.scopes),
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub name: Option<String>,
    pub scopes: Option<Vec<String>>,
}

impl CreateTokenRequest {
    /// Sanitize the name and keep only recognised scopes (deduplicated).
    pub fn validate(&self) -> Result<(String, Vec<Scope>), ValidationError> {
        let (name, raw_scopes) = match (self.name.as_deref(), self.scopes.as_ref()) {
            (Some(name), Some(scopes)) if !name.is_empty() && !scopes.is_empty() => {
                (name, scopes)
            }
            _ => return Err(ValidationError::Missing("name and scopes[] are")),
        };

        let mut scopes: Vec<Scope> = Vec::new();
        for scope in raw_scopes.iter().filter_map(|s| s.parse::<Scope>().ok()) {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        if scopes.is_empty() {
            return Err(ValidationError::NoValidScopes);
        }

        Ok((sanitize_str(name, 100), scopes))
    }
}

/// Generate a new token secret: 24 random bytes, hex encoded.
pub fn generate_token_secret() -> String {
    use rand::RngExt;
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..TOKEN_SECRET_BYTES).map(|_| rng.random::<u8>()).collect();
    hex::encode(bytes)
}
