//! Capture tokens.
//!
//! A token is the UUID naming one endpoint on the capture service. Every
//! operation that takes a token validates it first, so malformed input never
//! reaches the network.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::{Uuid, Version};

/// A validated UUID-v4 capture token.
///
/// # Example
///
/// ```
/// use webhook_sync::Token;
///
/// let token = Token::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
/// assert_eq!(token.as_str(), "550e8400-e29b-41d4-a716-446655440000");
///
/// assert!(Token::parse("not-a-uuid").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token(String);

impl Token {
    /// Validates and wraps a token string.
    ///
    /// The canonical lowercase hyphenated form is stored, so tokens compare
    /// equal regardless of the casing they were supplied in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] unless `raw` is a UUID of version 4.
    pub fn parse(raw: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(raw.trim()).map_err(|_| Error::invalid_token(raw))?;
        if uuid.get_version() != Some(Version::Random) {
            return Err(Error::invalid_token(raw));
        }
        Ok(Self(uuid.hyphenated().to_string()))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Token {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_v4() {
        let token = Token::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(token.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_parse_normalizes_case() {
        let token = Token::parse("550E8400-E29B-41D4-A716-446655440000").unwrap();
        assert_eq!(token.as_str(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_rejects_garbage() {
        let err = Token::parse("not-a-uuid").unwrap_err();
        assert!(matches!(err, Error::InvalidToken { .. }));
        assert!(Token::parse("").is_err());
    }

    #[test]
    fn test_rejects_other_versions() {
        // Version 1 (time-based) UUID
        assert!(Token::parse("6ba7b810-9dad-11d1-80b4-00c04fd430c8").is_err());
        // Nil UUID
        assert!(Token::parse("00000000-0000-0000-0000-000000000000").is_err());
    }

    #[test]
    fn test_serde_validates() {
        let ok: std::result::Result<Token, _> =
            serde_json::from_str("\"550e8400-e29b-41d4-a716-446655440000\"");
        assert!(ok.is_ok());

        let bad: std::result::Result<Token, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
