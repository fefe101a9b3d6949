use crate::{
    error::{Result, StoreError},
    models::{LinkWithRule, ShortLink, ShortLinkRule},
};
use chrono::NaiveDateTime;
use sqlx::SqlitePool;

// ── Links ──────────────────────────────────────────────────────────────────

/// Insert a new link and return the newly created row.
///
/// A UNIQUE violation on `code` maps to `StoreError::DuplicateCode` so the
/// generator can tell a collision apart from any other database failure.
pub async fn insert_link(pool: &SqlitePool, code: &str, original_url: &str) -> Result<ShortLink> {
    let id = sqlx::query("INSERT INTO short_links (code, original_url) VALUES (?1, ?2)")
        .bind(code)
        .bind(original_url)
        .execute(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateCode(code.to_owned())
            }
            _ => StoreError::Database(e),
        })?
        .last_insert_rowid();

    let link = sqlx::query_as(
        "SELECT id, code, original_url, created_at, clicks FROM short_links WHERE id = ?1",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(link)
}

/// Fetch a single link by its public code.
pub async fn get_link_by_code(pool: &SqlitePool, code: &str) -> Result<Option<ShortLink>> {
    let link = sqlx::query_as(
        "SELECT id, code, original_url, created_at, clicks FROM short_links WHERE code = ?1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(link)
}

/// Fetch a single link by its primary key.
pub async fn get_link_by_id(pool: &SqlitePool, id: i64) -> Result<Option<ShortLink>> {
    let link = sqlx::query_as(
        "SELECT id, code, original_url, created_at, clicks FROM short_links WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(link)
}

/// Fetch by id, mapping absence to `NotFound` for callers that need the
/// link to exist.
pub async fn require_link(pool: &SqlitePool, id: i64) -> Result<ShortLink> {
    get_link_by_id(pool, id).await?.ok_or(StoreError::NotFound)
}

/// Whether a code is already taken. Used by the generator's pre-check; the
/// UNIQUE constraint remains the real guarantee.
pub async fn code_exists(pool: &SqlitePool, code: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM short_links WHERE code = ?1")
        .bind(code)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

/// Return all links joined with their rule fields, newest first.
pub async fn list_links(pool: &SqlitePool) -> Result<Vec<LinkWithRule>> {
    let rows: Vec<(
        i64,
        String,
        String,
        NaiveDateTime,
        i64,
        Option<NaiveDateTime>,
        Option<i64>,
    )> = sqlx::query_as(
        "SELECT l.id, l.code, l.original_url, l.created_at, l.clicks,
                r.expires_at, r.max_clicks
         FROM short_links l
         LEFT JOIN short_link_rules r ON r.short_link_id = l.id
         ORDER BY l.created_at DESC, l.id DESC",
    )
    .fetch_all(pool)
    .await?;

    let result = rows
        .into_iter()
        .map(
            |(id, code, original_url, created_at, clicks, expires_at, max_clicks)| LinkWithRule {
                id,
                code,
                original_url,
                created_at,
                clicks,
                expires_at,
                max_clicks,
            },
        )
        .collect();

    Ok(result)
}

/// Increment the click counter by exactly one, guarded by the link's click
/// cap when it has one.
///
/// The cap check and the increment happen in a single UPDATE, so two
/// concurrent resolutions can never both read a stale count and both
/// consume the last slot. No rule row (or a NULL cap) degenerates to
/// `clicks < clicks + 1`, which always passes.
///
/// Returns `false` when the cap was already reached and nothing was written.
pub async fn register_click(pool: &SqlitePool, link_id: i64) -> Result<bool> {
    let affected = sqlx::query(
        "UPDATE short_links
         SET clicks = clicks + 1
         WHERE id = ?1
           AND clicks < COALESCE(
               (SELECT max_clicks FROM short_link_rules WHERE short_link_id = ?1),
               clicks + 1)",
    )
    .bind(link_id)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(affected > 0)
}

/// Reset the click counter to zero. The rule, if any, is left untouched.
pub async fn reset_clicks(pool: &SqlitePool, link_id: i64) -> Result<()> {
    sqlx::query("UPDATE short_links SET clicks = 0 WHERE id = ?1")
        .bind(link_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Permanently delete a link (cascades to its rule via FK).
pub async fn delete_link(pool: &SqlitePool, link_id: i64) -> Result<bool> {
    let affected = sqlx::query("DELETE FROM short_links WHERE id = ?1")
        .bind(link_id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

// ── Rules ──────────────────────────────────────────────────────────────────

/// Insert the access rule for a link that has none.
///
/// A UNIQUE violation on `short_link_id` maps to `StoreError::DuplicateRule`;
/// callers that may race an existing rule should use the update path instead.
pub async fn insert_rule(
    pool: &SqlitePool,
    link_id: i64,
    expires_at: Option<NaiveDateTime>,
    max_clicks: Option<i64>,
) -> Result<ShortLinkRule> {
    let id = sqlx::query(
        "INSERT INTO short_link_rules (short_link_id, expires_at, max_clicks) VALUES (?1, ?2, ?3)",
    )
    .bind(link_id)
    .bind(expires_at)
    .bind(max_clicks)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateRule(link_id),
        _ => StoreError::Database(e),
    })?
    .last_insert_rowid();

    let rule = sqlx::query_as(
        "SELECT id, short_link_id, expires_at, max_clicks, created_at
         FROM short_link_rules WHERE id = ?1",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(rule)
}

/// Fetch the rule attached to a link. `None` is the common case, not an error.
pub async fn get_rule(pool: &SqlitePool, link_id: i64) -> Result<Option<ShortLinkRule>> {
    let rule = sqlx::query_as(
        "SELECT id, short_link_id, expires_at, max_clicks, created_at
         FROM short_link_rules WHERE short_link_id = ?1",
    )
    .bind(link_id)
    .fetch_optional(pool)
    .await?;

    Ok(rule)
}

/// Overwrite both restriction fields of an existing rule.
pub async fn update_rule(
    pool: &SqlitePool,
    rule_id: i64,
    expires_at: Option<NaiveDateTime>,
    max_clicks: Option<i64>,
) -> Result<()> {
    sqlx::query("UPDATE short_link_rules SET expires_at = ?1, max_clicks = ?2 WHERE id = ?3")
        .bind(expires_at)
        .bind(max_clicks)
        .bind(rule_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Remove the rule attached to a link, leaving the link itself in place.
pub async fn delete_rule(pool: &SqlitePool, link_id: i64) -> Result<bool> {
    let affected = sqlx::query("DELETE FROM short_link_rules WHERE short_link_id = ?1")
        .bind(link_id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

// ── Test support ───────────────────────────────────────────────────────────

/// Fresh in-memory database with migrations applied. Single connection:
/// every pool connection to `sqlite::memory:` would otherwise get its own
/// empty database.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            "sqlite::memory:"
                .parse::<sqlx::sqlite::SqliteConnectOptions>()
                .expect("parse sqlite url")
                .foreign_keys(true),
        )
        .await
        .expect("open in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");

    pool
}
