use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::net::IpAddr;

use super::ValidationError;
use crate::tracking::sanitize::sanitize_str;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IpBlacklistEntry {
    pub ip: String,
    pub reason: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateBlacklistRequest {
    pub ip: Option<String>,
    pub reason: Option<String>,
}

impl CreateBlacklistRequest {
    /// Sanitize and validate, returning `(ip, reason)`.
    pub fn validate(&self) -> Result<(String, Option<String>), ValidationError> {
        let raw_ip = self
            .ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .ok_or(ValidationError::Missing("ip is"))?;
        let ip = validate_blacklist_ip(raw_ip)?;
        let reason = self
            .reason
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(|r| sanitize_str(r, 200));
        Ok((ip, reason))
    }
}

/// Blacklist entries are matched textually against the resolved client
/// address, so both are stored in canonical `IpAddr` form.
pub fn validate_blacklist_ip(raw: &str) -> Result<String, ValidationError> {
    let ip = sanitize_str(raw, 50)
        .parse::<IpAddr>()
        .map_err(|_| ValidationError::InvalidIp)?;
    Ok(ip.to_string())
}
