mod blacklist;
mod hit;
mod link;
mod request_log;
mod token;

pub use blacklist::{validate_blacklist_ip, CreateBlacklistRequest, IpBlacklistEntry};
pub use hit::{Hit, HitType, NewHit, NOT_FOUND_SLUG_PREFIX, ROOT_SLUG};
pub use link::{
    validate_destination, validate_slug, CreateLinkRequest, Link, LinkSummary,
};
pub use request_log::{LogLevel, NewRequestLog, RequestLog};
pub use token::{generate_token_secret, ApiToken, CreateTokenRequest, Scope};
pub(crate) use token::ApiTokenRow;

use thiserror::Error;

/// Rejected user input; the message is returned to the caller verbatim
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} required")]
    Missing(&'static str),
    #[error("slug must contain only letters, numbers, dashes, and underscores")]
    InvalidSlug,
    #[error("destination must be a valid URL")]
    InvalidDestination,
    #[error("invalid IP address format")]
    InvalidIp,
    #[error("at least one valid scope is required")]
    NoValidScopes,
}
