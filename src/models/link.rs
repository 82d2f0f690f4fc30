use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ValidationError;
use crate::tracking::sanitize::sanitize_str;

const MAX_SLUG_LEN: usize = 100;
const MAX_DESTINATION_LEN: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Link {
    pub slug: String,
    pub destination: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A link together with the number of redirect hits recorded for it
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LinkSummary {
    pub slug: String,
    pub destination: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub hits: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub slug: Option<String>,
    pub destination: Option<String>,
}

impl CreateLinkRequest {
    /// Sanitize and validate both fields, returning `(slug, destination)`.
    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        match (self.slug.as_deref(), self.destination.as_deref()) {
            (Some(slug), Some(destination)) if !slug.is_empty() && !destination.is_empty() => {
                Ok((validate_slug(slug)?, validate_destination(destination)?))
            }
            _ => Err(ValidationError::Missing("slug and destination are")),
        }
    }
}

pub fn validate_slug(raw: &str) -> Result<String, ValidationError> {
    let slug = sanitize_str(raw, MAX_SLUG_LEN);
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(slug)
    } else {
        Err(ValidationError::InvalidSlug)
    }
}

pub fn validate_destination(raw: &str) -> Result<String, ValidationError> {
    let destination = sanitize_str(raw, MAX_DESTINATION_LEN);
    url::Url::parse(&destination).map_err(|_| ValidationError::InvalidDestination)?;
    Ok(destination)
}
