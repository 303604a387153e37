//! Token lifecycle policy
//!
//! Pure functions over a bundle's timestamps. No clock reads, no I/O.

use super::types::TokenBundle;

/// Safety margin subtracted from the nominal lifetime (clock drift, request latency)
pub const SKEW_SECS: i64 = 300;

/// `now <= issued_at + expires_in - SKEW_SECS`
pub fn is_valid(bundle: &TokenBundle, now: i64) -> bool {
    now <= bundle
        .issued_at
        .saturating_add(bundle.expires_in)
        .saturating_sub(SKEW_SECS)
}

/// Whether the bundle carries a refresh token at all
pub fn can_refresh(bundle: &TokenBundle) -> bool {
    bundle
        .refresh_token
        .as_deref()
        .is_some_and(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(issued_at: i64, expires_in: i64) -> TokenBundle {
        TokenBundle {
            access_token: "a".to_string(),
            id_token: "b".to_string(),
            refresh_token: Some("c".to_string()),
            token_type: "Bearer".to_string(),
            expires_in,
            issued_at,
        }
    }

    #[test]
    fn test_skew_boundary() {
        let issued_at = 1_700_000_000;
        for expires_in in (601..=7200).step_by(37).chain([601, 3600, 86_400]) {
            let b = bundle(issued_at, expires_in);
            let expiry = issued_at + expires_in;

            assert!(!is_valid(&b, expiry), "valid at expiry ({expires_in})");
            assert!(!is_valid(&b, expiry + 1));
            assert!(is_valid(&b, expiry - 301), "invalid before margin ({expires_in})");
            assert!(is_valid(&b, expiry - SKEW_SECS));
            assert!(!is_valid(&b, expiry - SKEW_SECS + 1));
            assert!(is_valid(&b, issued_at));
        }
    }

    #[test]
    fn test_short_lifetime_never_valid() {
        // Lifetime shorter than the margin is already stale when issued
        let b = bundle(100, 200);
        assert!(!is_valid(&b, 100));
    }

    #[test]
    fn test_no_overflow_on_extreme_values() {
        let b = bundle(i64::MAX, i64::MAX);
        assert!(is_valid(&b, 0));
    }

    #[test]
    fn test_can_refresh() {
        let mut b = bundle(0, 3600);
        assert!(can_refresh(&b));

        b.refresh_token = Some(String::new());
        assert!(!can_refresh(&b));

        b.refresh_token = None;
        assert!(!can_refresh(&b));
        // Still evaluable without a refresh token
        assert!(is_valid(&b, 0));
    }
}
