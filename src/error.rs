use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Typed errors surfaced by the link and rule stores.
///
/// Constraint violations are mapped to their own variants so callers can
/// react to them (retry code generation, route to the rule-update path)
/// without string-matching on database messages.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert violated the UNIQUE constraint on `short_links.code`.
    #[error("short code '{0}' already exists")]
    DuplicateCode(String),

    /// Insert violated the UNIQUE constraint on `short_link_rules.short_link_id`.
    #[error("link {0} already has a rule")]
    DuplicateRule(i64),

    /// The requested link does not exist.
    #[error("link not found")]
    NotFound,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
