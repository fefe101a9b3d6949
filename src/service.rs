//! The redirection service: URL normalization, TTL/click-cap parsing,
//! unique-code creation, rule upsert, and the end-to-end resolution
//! protocol. Everything below is orchestration over `db` plus the pure
//! evaluator in `access`; the stores never see these business rules.

use crate::{
    access::{self, Access, ExpiryReason},
    db,
    error::{Result, StoreError},
    models::ShortLink,
};
use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::SqlitePool;

/// Default public code length. Three alphanumeric characters keep codes
/// typable; collisions are handled by retrying.
const CODE_LEN: usize = 3;

/// Code length for the fallback insert once the short-code retries are
/// exhausted. At 62^8 combinations a collision is negligible.
const FALLBACK_CODE_LEN: usize = 8;

/// How many short-code attempts before falling back to a long code.
const MAX_TRIES: u32 = 5;

/// Terminal outcome of resolving a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Access granted; the click has been recorded.
    Redirect(String),
    /// The code does not map to any link.
    NotFound,
    /// The link exists but its rule denies access.
    Blocked(ExpiryReason),
}

// ── Input parsing ──────────────────────────────────────────────────────────

/// Return the URL with an http scheme prepended if none is present.
/// Trims surrounding whitespace. Idempotent.
pub fn normalize_url(raw: &str) -> String {
    let url = raw.trim();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_owned()
    } else {
        format!("http://{url}")
    }
}

/// Parse a TTL token into an absolute expiry time.
///
/// The token set is closed: `"3h"` and `"6h"` (case-insensitive, trimmed).
/// Anything else, including the empty string, means "no expiry" rather
/// than an error. New durations are added here, nowhere else.
pub fn parse_ttl(raw: &str) -> Option<NaiveDateTime> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "3h" => Some(Utc::now().naive_utc() + Duration::hours(3)),
        "6h" => Some(Utc::now().naive_utc() + Duration::hours(6)),
        _ => None,
    }
}

/// Parse a click cap from user input.
///
/// Accepted only when the trimmed input is non-empty and entirely decimal
/// digits; everything else (signs, decimals, words) means "no limit",
/// never an error.
pub fn parse_max_clicks(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}

// ── Creation ───────────────────────────────────────────────────────────────

/// Normalize the URL, mint a unique code, and attach a rule only when a
/// TTL or click cap was actually requested. Unrestricted links never get
/// a rule row.
pub async fn create_short_link(
    pool: &SqlitePool,
    original_url: &str,
    ttl: &str,
    max_clicks: &str,
) -> Result<ShortLink> {
    let normalized = normalize_url(original_url);
    let link = create_unique(pool, &normalized, MAX_TRIES).await?;

    let expires_at = parse_ttl(ttl);
    let limit_clicks = parse_max_clicks(max_clicks);

    if expires_at.is_some() || limit_clicks.is_some() {
        db::insert_rule(pool, link.id, expires_at, limit_clicks).await?;
    }

    Ok(link)
}

/// Persist a link under a freshly generated code.
///
/// Up to `max_tries` attempts with short codes, pre-checking the store and
/// retrying when an insert loses a race anyway. After that, one insert with
/// a long code and no pre-check; the UNIQUE constraint is the backstop, and
/// a collision there surfaces as `DuplicateCode` instead of looping.
pub async fn create_unique(
    pool: &SqlitePool,
    original_url: &str,
    max_tries: u32,
) -> Result<ShortLink> {
    for _ in 0..max_tries {
        let code = random_code(CODE_LEN);
        if db::code_exists(pool, &code).await? {
            continue;
        }
        match db::insert_link(pool, &code, original_url).await {
            Ok(link) => return Ok(link),
            Err(StoreError::DuplicateCode(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    db::insert_link(pool, &random_code(FALLBACK_CODE_LEN), original_url).await
}

// ── Rules ──────────────────────────────────────────────────────────────────

/// Upsert the rule for a link from the raw TTL / click-cap pair.
///
/// Both fields are recomputed together, so callers pass the desired final
/// state, not a patch: an unrecognized token clears that restriction while
/// the other is kept. A link with no rule gains one only if a restriction
/// was requested.
pub async fn update_rule(
    pool: &SqlitePool,
    link: &ShortLink,
    ttl: &str,
    max_clicks: &str,
) -> Result<()> {
    let expires_at = parse_ttl(ttl);
    let limit_clicks = parse_max_clicks(max_clicks);

    match db::get_rule(pool, link.id).await? {
        None => {
            if expires_at.is_some() || limit_clicks.is_some() {
                db::insert_rule(pool, link.id, expires_at, limit_clicks).await?;
            }
        }
        Some(rule) => db::update_rule(pool, rule.id, expires_at, limit_clicks).await?,
    }

    Ok(())
}

// ── Resolution ─────────────────────────────────────────────────────────────

/// The end-to-end resolution protocol: look up the link, evaluate its rule
/// against the pre-increment click count, then record the click.
///
/// The click is recorded if and only if access was granted. The recording
/// itself is the store's conditional increment, so if a concurrent
/// resolution consumed the last slot under a cap between our check and our
/// write, the increment reports it and this attempt is blocked too.
pub async fn resolve(pool: &SqlitePool, code: &str) -> Result<Resolution> {
    let Some(link) = db::get_link_by_code(pool, code).await? else {
        return Ok(Resolution::NotFound);
    };

    let rule = db::get_rule(pool, link.id).await?;
    if let Access::Denied(reason) = access::check_access(&link, rule.as_ref()) {
        return Ok(Resolution::Blocked(reason));
    }

    if !register_click(pool, &link).await? {
        return Ok(Resolution::Blocked(ExpiryReason::Clicks));
    }

    Ok(Resolution::Redirect(link.original_url))
}

/// Record one successful resolution. Call only after `check_access` allowed
/// the attempt; the link reference is already resolved, so there is no
/// separate existence re-check.
///
/// Returns `false` when the store's conditional increment found the cap
/// already consumed by a concurrent resolution.
pub async fn register_click(pool: &SqlitePool, link: &ShortLink) -> Result<bool> {
    db::register_click(pool, link.id).await
}

// ── Administrative operations ──────────────────────────────────────────────

/// Reset the click counter; the rule stays as it is.
pub async fn reset_clicks(pool: &SqlitePool, link: &ShortLink) -> Result<()> {
    db::reset_clicks(pool, link.id).await
}

/// Remove the link and, through the cascade, its rule.
pub async fn delete_short_link(pool: &SqlitePool, link: &ShortLink) -> Result<()> {
    db::delete_link(pool, link.id).await?;
    Ok(())
}

// ── Code generation ────────────────────────────────────────────────────────

/// Generate a random alphanumeric code of the given length.
///
/// `thread_rng` is a CSPRNG, so codes are not guessable from previously
/// issued ones.
fn random_code(len: usize) -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    // ── Pure functions ─────────────────────────────────────────────────────

    #[test]
    fn normalize_url_prepends_scheme() {
        assert_eq!(normalize_url("example.com"), "http://example.com");
        assert_eq!(normalize_url("  example.com  "), "http://example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
        assert_eq!(normalize_url("HTTPS://example.com"), "HTTPS://example.com");
    }

    #[test]
    fn normalize_url_is_idempotent() {
        for raw in ["example.com", "https://x.io/path?q=1", "  spaced.com ", ""] {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once);
        }
    }

    #[test]
    fn parse_ttl_recognizes_only_known_tokens() {
        let before = Utc::now().naive_utc();
        let three = parse_ttl("3h").unwrap();
        let six = parse_ttl(" 6H ").unwrap();
        let after = Utc::now().naive_utc();

        assert!(three >= before + Duration::hours(3));
        assert!(three <= after + Duration::hours(3));
        assert!(six >= before + Duration::hours(6));
        assert!(six <= after + Duration::hours(6));

        assert_eq!(parse_ttl(""), None);
        assert_eq!(parse_ttl("1d"), None);
        assert_eq!(parse_ttl("3 h"), None);
        assert_eq!(parse_ttl("9h"), None);
    }

    #[test]
    fn parse_max_clicks_accepts_digits_only() {
        assert_eq!(parse_max_clicks("0"), Some(0));
        assert_eq!(parse_max_clicks("42"), Some(42));
        assert_eq!(parse_max_clicks(" 7 "), Some(7));
        assert_eq!(parse_max_clicks(""), None);
        assert_eq!(parse_max_clicks("abc"), None);
        assert_eq!(parse_max_clicks("-3"), None);
        assert_eq!(parse_max_clicks("3.5"), None);
        assert_eq!(parse_max_clicks("+3"), None);
    }

    #[test]
    fn random_code_length_and_alphabet() {
        for len in [3, 8] {
            let code = random_code(len);
            assert_eq!(code.len(), len);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    // ── Scenarios ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn basic_shorten_and_resolve() {
        let pool = test_pool().await;

        let link = create_short_link(&pool, "example.com", "", "").await.unwrap();
        assert_eq!(link.original_url, "http://example.com");
        assert_eq!(link.code.len(), 3);
        assert!(db::get_rule(&pool, link.id).await.unwrap().is_none());

        let outcome = resolve(&pool, &link.code).await.unwrap();
        assert_eq!(outcome, Resolution::Redirect("http://example.com".into()));

        let link = db::get_link_by_id(&pool, link.id).await.unwrap().unwrap();
        assert_eq!(link.clicks, 1);
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let pool = test_pool().await;
        assert_eq!(resolve(&pool, "nope").await.unwrap(), Resolution::NotFound);
    }

    #[tokio::test]
    async fn click_capped_link() {
        let pool = test_pool().await;

        let link = create_short_link(&pool, "https://x.io", "", "1").await.unwrap();
        let rule = db::get_rule(&pool, link.id).await.unwrap().unwrap();
        assert_eq!(rule.max_clicks, Some(1));
        assert_eq!(rule.expires_at, None);

        assert!(matches!(
            resolve(&pool, &link.code).await.unwrap(),
            Resolution::Redirect(_)
        ));
        assert_eq!(
            resolve(&pool, &link.code).await.unwrap(),
            Resolution::Blocked(ExpiryReason::Clicks)
        );

        let link = db::get_link_by_id(&pool, link.id).await.unwrap().unwrap();
        assert_eq!(link.clicks, 1);
    }

    #[tokio::test]
    async fn cap_admits_exactly_k_resolutions() {
        let pool = test_pool().await;

        let link = create_short_link(&pool, "example.com", "", "3").await.unwrap();
        for _ in 0..3 {
            assert!(matches!(
                resolve(&pool, &link.code).await.unwrap(),
                Resolution::Redirect(_)
            ));
        }
        assert_eq!(
            resolve(&pool, &link.code).await.unwrap(),
            Resolution::Blocked(ExpiryReason::Clicks)
        );

        let link = db::get_link_by_id(&pool, link.id).await.unwrap().unwrap();
        assert_eq!(link.clicks, 3);
    }

    #[tokio::test]
    async fn ttl_creates_a_rule_with_absolute_expiry() {
        let pool = test_pool().await;

        let before = Utc::now().naive_utc();
        let link = create_short_link(&pool, "example.com", "3h", "").await.unwrap();
        let rule = db::get_rule(&pool, link.id).await.unwrap().unwrap();

        let expires_at = rule.expires_at.unwrap();
        assert!(expires_at >= before + Duration::hours(3));
        assert!(expires_at <= Utc::now().naive_utc() + Duration::hours(3));
        assert_eq!(rule.max_clicks, None);
    }

    #[tokio::test]
    async fn unrecognized_restrictions_create_no_rule() {
        let pool = test_pool().await;

        let link = create_short_link(&pool, "example.com", "1d", "abc").await.unwrap();
        assert!(db::get_rule(&pool, link.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_link_is_blocked_with_time_reason() {
        let pool = test_pool().await;

        let link = create_short_link(&pool, "example.com", "", "").await.unwrap();
        let past = Utc::now().naive_utc() - Duration::seconds(1);
        db::insert_rule(&pool, link.id, Some(past), None).await.unwrap();

        assert_eq!(
            resolve(&pool, &link.code).await.unwrap(),
            Resolution::Blocked(ExpiryReason::Time)
        );

        // No click is recorded on a blocked attempt.
        let link = db::get_link_by_id(&pool, link.id).await.unwrap().unwrap();
        assert_eq!(link.clicks, 0);
    }

    #[tokio::test]
    async fn expired_time_wins_over_exhausted_cap() {
        let pool = test_pool().await;

        let link = create_short_link(&pool, "example.com", "", "").await.unwrap();
        let past = Utc::now().naive_utc() - Duration::seconds(1);
        db::insert_rule(&pool, link.id, Some(past), Some(0)).await.unwrap();

        assert_eq!(
            resolve(&pool, &link.code).await.unwrap(),
            Resolution::Blocked(ExpiryReason::Time)
        );
    }

    #[tokio::test]
    async fn update_rule_creates_overwrites_and_clears() {
        let pool = test_pool().await;

        let link = create_short_link(&pool, "example.com", "", "").await.unwrap();

        // No rule, no restriction requested: still no rule.
        update_rule(&pool, &link, "", "").await.unwrap();
        assert!(db::get_rule(&pool, link.id).await.unwrap().is_none());

        // First restriction creates the rule.
        update_rule(&pool, &link, "", "5").await.unwrap();
        let rule = db::get_rule(&pool, link.id).await.unwrap().unwrap();
        assert_eq!(rule.max_clicks, Some(5));
        assert_eq!(rule.expires_at, None);

        // Both fields are recomputed together: setting a TTL while passing
        // an empty cap clears the cap.
        update_rule(&pool, &link, "3h", "").await.unwrap();
        let rule = db::get_rule(&pool, link.id).await.unwrap().unwrap();
        assert!(rule.expires_at.is_some());
        assert_eq!(rule.max_clicks, None);

        // Clearing everything leaves an empty rule row, which behaves like
        // no rule at all.
        update_rule(&pool, &link, "", "").await.unwrap();
        let rule = db::get_rule(&pool, link.id).await.unwrap().unwrap();
        assert_eq!(rule.expires_at, None);
        assert_eq!(rule.max_clicks, None);
        assert!(matches!(
            resolve(&pool, &link.code).await.unwrap(),
            Resolution::Redirect(_)
        ));
    }

    #[tokio::test]
    async fn created_codes_are_unique() {
        let pool = test_pool().await;

        let mut codes = std::collections::HashSet::new();
        for _ in 0..30 {
            let link = create_short_link(&pool, "example.com", "", "").await.unwrap();
            assert!(codes.insert(link.code));
        }
    }

    #[tokio::test]
    async fn exhausted_tries_fall_back_to_a_long_code() {
        let pool = test_pool().await;

        let link = create_unique(&pool, "http://example.com", 0).await.unwrap();
        assert_eq!(link.code.len(), 8);
    }

    #[tokio::test]
    async fn reset_and_delete() {
        let pool = test_pool().await;

        let link = create_short_link(&pool, "example.com", "", "2").await.unwrap();
        resolve(&pool, &link.code).await.unwrap();

        reset_clicks(&pool, &link).await.unwrap();
        let fetched = db::get_link_by_id(&pool, link.id).await.unwrap().unwrap();
        assert_eq!(fetched.clicks, 0);
        // The rule survives a reset.
        assert!(db::get_rule(&pool, link.id).await.unwrap().is_some());

        delete_short_link(&pool, &link).await.unwrap();
        assert_eq!(resolve(&pool, &link.code).await.unwrap(), Resolution::NotFound);
        assert!(db::get_rule(&pool, link.id).await.unwrap().is_none());
    }
}
