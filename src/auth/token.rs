use std::fmt;

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_token";

const TOKEN_BYTES: usize = 32;

/// Opaque session token. Only equality is meaningful.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// 256 bits from the OS CSPRNG, URL-safe base64 without padding.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(Base64UrlUnpadded::encode_string(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// Tokens are bearer credentials; keep them out of logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// `None` when the result falls outside the representable date range.
pub fn expiry_for(issued_at: OffsetDateTime, ttl: Duration) -> Option<OffsetDateTime> {
    issued_at.checked_add(ttl)
}

/// Strict comparison: a session is still valid at its exact expiry instant.
pub fn is_expired(expires_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    now > expires_at
}

pub fn format_expiry(at: OffsetDateTime) -> Result<String, time::error::Format> {
    at.format(&Rfc3339)
}

pub fn parse_expiry(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(raw, &Rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use time::macros::datetime;

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let tokens: HashSet<String> = (0..1000)
            .map(|_| SessionToken::generate().into_string())
            .collect();
        assert_eq!(tokens.len(), 1000);
        for t in &tokens {
            assert_eq!(t.len(), 43);
            assert!(t
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn debug_does_not_print_token() {
        let token = SessionToken::generate();
        assert!(!format!("{token:?}").contains(token.as_str()));
    }

    #[test]
    fn expiry_is_issue_time_plus_ttl() {
        let issued = datetime!(2024-03-01 10:00 UTC);
        assert_eq!(
            expiry_for(issued, Duration::minutes(120)),
            Some(datetime!(2024-03-01 12:00 UTC))
        );
    }

    #[test]
    fn expiry_past_the_calendar_is_none() {
        let issued = datetime!(2024-03-01 10:00 UTC);
        assert_eq!(expiry_for(issued, Duration::minutes(10_000_000_000)), None);
    }

    #[test]
    fn expiry_check_is_strict() {
        let exp = datetime!(2024-03-01 12:00 UTC);
        assert!(!is_expired(exp, exp));
        assert!(!is_expired(exp, exp - Duration::seconds(1)));
        assert!(is_expired(exp, exp + Duration::nanoseconds(1)));
    }

    #[test]
    fn expiry_text_roundtrips_exactly() {
        let at = datetime!(2024-03-01 12:00:00.123456789 UTC);
        let text = format_expiry(at).unwrap();
        assert_eq!(parse_expiry(&text).unwrap(), at);
        assert!(parse_expiry("tomorrow-ish").is_err());
    }
}
