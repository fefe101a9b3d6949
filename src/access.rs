use crate::models::{ShortLink, ShortLinkRule};
use chrono::{NaiveDateTime, Utc};

/// Why a resolution attempt was denied.
///
/// The string forms are user-visible (logs and the admin API), so the
/// variants and their names are part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    Time,
    Clicks,
}

impl ExpiryReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpiryReason::Time => "expired_time",
            ExpiryReason::Clicks => "expired_clicks",
        }
    }
}

/// Outcome of evaluating a link against its rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied(ExpiryReason),
}

/// Decide whether a resolution attempt is allowed right now.
///
/// Pure decision, no side effects; the caller records the click afterwards.
pub fn check_access(link: &ShortLink, rule: Option<&ShortLinkRule>) -> Access {
    check_access_at(link, rule, Utc::now().naive_utc())
}

/// `check_access` against an explicit clock.
///
/// The time check runs strictly before the click check: when both limits
/// are exceeded the reported reason is `Time`. The cap uses `>=`, so
/// `max_clicks = 3` admits exactly three resolutions.
pub fn check_access_at(
    link: &ShortLink,
    rule: Option<&ShortLinkRule>,
    now: NaiveDateTime,
) -> Access {
    let Some(rule) = rule else {
        return Access::Allowed;
    };

    if let Some(expires_at) = rule.expires_at {
        if now > expires_at {
            return Access::Denied(ExpiryReason::Time);
        }
    }

    if let Some(max_clicks) = rule.max_clicks {
        if link.clicks >= max_clicks {
            return Access::Denied(ExpiryReason::Clicks);
        }
    }

    Access::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn link(clicks: i64) -> ShortLink {
        ShortLink {
            id: 1,
            code: "abc".into(),
            original_url: "http://example.com".into(),
            created_at: Utc::now().naive_utc(),
            clicks,
        }
    }

    fn rule(expires_at: Option<NaiveDateTime>, max_clicks: Option<i64>) -> ShortLinkRule {
        ShortLinkRule {
            id: 1,
            short_link_id: 1,
            expires_at,
            max_clicks,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn no_rule_always_allows() {
        assert_eq!(check_access(&link(0), None), Access::Allowed);
        assert_eq!(check_access(&link(1_000_000), None), Access::Allowed);
    }

    #[test]
    fn empty_rule_allows() {
        let r = rule(None, None);
        assert_eq!(check_access(&link(42), Some(&r)), Access::Allowed);
    }

    #[test]
    fn time_boundary() {
        let now = Utc::now().naive_utc();

        let past = rule(Some(now - Duration::seconds(1)), None);
        assert_eq!(
            check_access_at(&link(0), Some(&past), now),
            Access::Denied(ExpiryReason::Time)
        );

        let future = rule(Some(now + Duration::hours(1)), None);
        assert_eq!(check_access_at(&link(0), Some(&future), now), Access::Allowed);

        // Exactly at the deadline is still allowed; denial needs now > expires_at.
        let exact = rule(Some(now), None);
        assert_eq!(check_access_at(&link(0), Some(&exact), now), Access::Allowed);
    }

    #[test]
    fn click_cap_uses_greater_or_equal() {
        let r = rule(None, Some(3));
        assert_eq!(check_access(&link(2), Some(&r)), Access::Allowed);
        assert_eq!(
            check_access(&link(3), Some(&r)),
            Access::Denied(ExpiryReason::Clicks)
        );
        assert_eq!(
            check_access(&link(4), Some(&r)),
            Access::Denied(ExpiryReason::Clicks)
        );
    }

    #[test]
    fn zero_cap_denies_immediately() {
        let r = rule(None, Some(0));
        assert_eq!(
            check_access(&link(0), Some(&r)),
            Access::Denied(ExpiryReason::Clicks)
        );
    }

    #[test]
    fn time_wins_the_tie_break() {
        let now = Utc::now().naive_utc();
        let r = rule(Some(now - Duration::seconds(1)), Some(1));
        assert_eq!(
            check_access_at(&link(1), Some(&r), now),
            Access::Denied(ExpiryReason::Time)
        );
    }
}
