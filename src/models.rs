use chrono::NaiveDateTime;

/// A short link record from the `short_links` table.
///
/// `code` is the public identifier; `original_url` is always
/// schema-qualified (the service normalizes it before insert). All
/// timestamps are UTC.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShortLink {
    pub id: i64,
    pub code: String,
    pub original_url: String,
    pub created_at: NaiveDateTime,
    pub clicks: i64,
}

/// An access rule from the `short_link_rules` table.
///
/// At most one per link (UNIQUE on `short_link_id`). A rule with both
/// fields `None` places no restriction on the link.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShortLinkRule {
    pub id: i64,
    pub short_link_id: i64,
    pub expires_at: Option<NaiveDateTime>,
    pub max_clicks: Option<i64>,
    pub created_at: NaiveDateTime,
}

/// A link row joined with its rule fields, used for the admin listing.
#[derive(Debug, Clone)]
pub struct LinkWithRule {
    pub id: i64,
    pub code: String,
    pub original_url: String,
    pub created_at: NaiveDateTime,
    pub clicks: i64,
    pub expires_at: Option<NaiveDateTime>,
    pub max_clicks: Option<i64>,
}
