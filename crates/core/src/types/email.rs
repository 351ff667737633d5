//! Email address type.
//!
//! Emails are the identity key throughout MarketPulse: the backend keys carts,
//! wishlists, orders and roles by the requester's email, so the role cache and
//! the optimistic collection caches are keyed by [`Email`] as well.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// The input string is empty.
    #[error("email cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("email must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input does not contain an @ symbol.
    #[error("email must contain an @ symbol")]
    MissingAtSymbol,
    /// The local part (before @) is empty.
    #[error("email local part cannot be empty")]
    EmptyLocalPart,
    /// The domain part (after @) is empty.
    #[error("email domain cannot be empty")]
    EmptyDomain,
}

/// An email address.
///
/// Parsing trims surrounding whitespace and lowercases the address, so two
/// spellings of the same mailbox map to the same cache key.
///
/// ## Constraints
///
/// - Length: 1-254 characters (RFC 5321 limit)
/// - Must contain an @ symbol
/// - Local part (before @) must not be empty
/// - Domain part (after @) must not be empty
///
/// ## Examples
///
/// ```
/// use market_pulse_core::Email;
///
/// assert!(Email::parse("vendor@market.example").is_ok());
/// assert_eq!(Email::parse(" Shopper@Example.COM ").unwrap().as_str(), "shopper@example.com");
///
/// assert!(Email::parse("").is_err());
/// assert!(Email::parse("no-at-symbol").is_err());
/// assert!(Email::parse("@domain.com").is_err());
/// assert!(Email::parse("user@").is_err());
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse an `Email` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input:
    /// - Is empty
    /// - Is longer than 254 characters
    /// - Does not contain an @ symbol
    /// - Has an empty local part or domain
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let s = s.trim();

        if s.is_empty() {
            return Err(EmailError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        let at_pos = s.find('@').ok_or(EmailError::MissingAtSymbol)?;

        if at_pos == 0 {
            return Err(EmailError::EmptyLocalPart);
        }

        if at_pos == s.len() - 1 {
            return Err(EmailError::EmptyDomain);
        }

        Ok(Self(s.to_lowercase()))
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Email` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns the local part of the email (before the @).
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or("")
    }

    /// Returns the domain part of the email (after the @).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split('@').nth(1).unwrap_or("")
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Backend and identity-provider payloads go through the same validation.
impl<'de> Deserialize<'de> for Email {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_emails() {
        assert!(Email::parse("user@example.com").is_ok());
        assert!(Email::parse("user.name@example.com").is_ok());
        assert!(Email::parse("user+tag@example.com").is_ok());
        assert!(Email::parse("farmer@subdomain.market.example").is_ok());
        assert!(Email::parse("a@b.c").is_ok());
    }

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let email = Email::parse("  Vendor@Market.Example ").unwrap();
        assert_eq!(email.as_str(), "vendor@market.example");
        assert_eq!(email, Email::parse("vendor@market.example").unwrap());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Email::parse(""), Err(EmailError::Empty));
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            Email::parse(&long),
            Err(EmailError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_missing_at() {
        assert_eq!(Email::parse("no-at-symbol"), Err(EmailError::MissingAtSymbol));
    }

    #[test]
    fn test_parse_empty_parts() {
        assert_eq!(Email::parse("@domain.com"), Err(EmailError::EmptyLocalPart));
        assert_eq!(Email::parse("user@"), Err(EmailError::EmptyDomain));
    }

    #[test]
    fn test_local_part_and_domain() {
        let email = Email::parse("user@example.com").unwrap();
        assert_eq!(email.local_part(), "user");
        assert_eq!(email.domain(), "example.com");
    }

    #[test]
    fn test_deserialize_validates() {
        let parsed: Email = serde_json::from_str("\"Buyer@Example.com\"").unwrap();
        assert_eq!(parsed.as_str(), "buyer@example.com");

        assert!(serde_json::from_str::<Email>("\"not-an-email\"").is_err());
    }

    #[test]
    fn test_serialize_is_transparent() {
        let email = Email::parse("user@example.com").unwrap();
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"user@example.com\"");
    }
}
