//! Shared hit filtering
//!
//! Every query over the hits table (listing, counting, grouping, export,
//! pagination) narrows its rows through one [`HitFilter`]. Backends render
//! it with their own `sqlx::QueryBuilder`, so placeholder syntax stays a
//! backend concern.

use sqlx::{Database, QueryBuilder};

use crate::models::HitType;

/// Optional equality filters over hits; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HitFilter {
    pub slug: Option<String>,
    pub hit_type: Option<HitType>,
    pub ip: Option<String>,
    pub session_id: Option<String>,
    pub visitor_id: Option<String>,
    /// Keyset pagination: only hits with a smaller id
    pub before_id: Option<i64>,
}

/// A bound value in a rendered condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
}

impl HitFilter {
    pub fn for_slug(slug: impl Into<String>) -> Self {
        Self {
            slug: Some(slug.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// `(column comparison, value)` pairs, each to be joined with `AND`.
    pub fn conditions(&self) -> Vec<(&'static str, FilterValue)> {
        let mut conditions = Vec::new();
        if let Some(slug) = &self.slug {
            conditions.push(("slug = ", FilterValue::Text(slug.clone())));
        }
        if let Some(hit_type) = self.hit_type {
            conditions.push(("hit_type = ", FilterValue::Text(hit_type.as_str().to_string())));
        }
        if let Some(ip) = &self.ip {
            conditions.push(("ip = ", FilterValue::Text(ip.clone())));
        }
        if let Some(session_id) = &self.session_id {
            conditions.push(("session_id = ", FilterValue::Text(session_id.clone())));
        }
        if let Some(visitor_id) = &self.visitor_id {
            conditions.push(("visitor_id = ", FilterValue::Text(visitor_id.clone())));
        }
        if let Some(before_id) = self.before_id {
            conditions.push(("id < ", FilterValue::Int(before_id)));
        }
        conditions
    }
}

/// Append ` WHERE ...` for `filter` to a query under construction.
///
/// Generic over the backend; the caller supplies how a value is bound,
/// since `Encode` bounds for `String`/`i64` are backend-specific.
pub fn push_filter<'args, DB, F>(qb: &mut QueryBuilder<'args, DB>, filter: &HitFilter, mut bind: F)
where
    DB: Database,
    F: FnMut(&mut QueryBuilder<'args, DB>, FilterValue),
{
    for (i, (comparison, value)) in filter.conditions().into_iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(comparison);
        bind(qb, value);
    }
}

/// Column a stats query groups hits by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsDimension {
    Type,
    Slug,
    Ip,
    Browser,
    Os,
    Device,
    Referer,
}

impl StatsDimension {
    pub const ALL: [StatsDimension; 7] = [
        StatsDimension::Type,
        StatsDimension::Slug,
        StatsDimension::Ip,
        StatsDimension::Browser,
        StatsDimension::Os,
        StatsDimension::Device,
        StatsDimension::Referer,
    ];

    /// Column name in the hits table. Only ever a fixed identifier.
    pub fn column(&self) -> &'static str {
        match self {
            StatsDimension::Type => "hit_type",
            StatsDimension::Slug => "slug",
            StatsDimension::Ip => "ip",
            StatsDimension::Browser => "browser",
            StatsDimension::Os => "os",
            StatsDimension::Device => "device",
            StatsDimension::Referer => "referer",
        }
    }
}

/// One row of a grouped count
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DimensionCount {
    pub dimension: String,
    pub count: i64,
}
