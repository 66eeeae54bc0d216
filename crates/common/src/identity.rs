use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator between the username and the domain in the canonical form
pub const SEPARATOR: char = '@';

/// Errors raised for identities that are not well formed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("malformed identity: empty {0}")]
    Empty(&'static str),
    #[error("malformed identity: {field} contains illegal character {ch:?}")]
    IllegalCharacter { field: &'static str, ch: char },
    #[error("malformed identity: expected user@domain, got {0:?}")]
    Unparsable(String),
}

/// Check that a single identity field is usable as a key and in the canonical form.
fn validate_field(field: &'static str, value: &str) -> Result<(), IdentityError> {
    if value.is_empty() {
        return Err(IdentityError::Empty(field));
    }
    if let Some(ch) = value
        .chars()
        .find(|c| *c == SEPARATOR || c.is_whitespace() || c.is_control())
    {
        return Err(IdentityError::IllegalCharacter { field, ch });
    }
    Ok(())
}

/// Validate a bare domain name, as used to key the certificate and session tables
pub fn validate_domain(domain: &str) -> Result<(), IdentityError> {
    validate_field("domain", domain)
}

/// Names one end of a connection as a user within a domain
///
/// Ordering and equality are by `(domain, username)`. The canonical string form
/// is `username@domain` and [`FromStr`] is its exact inverse.
///
/// Values built with [`IdentityAddress::new`] or parsed from a string are always
/// well formed. Values that arrive through `serde` are not checked on the way in;
/// anything accepting them from the outside calls [`IdentityAddress::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityAddress {
    domain: String,
    username: String,
}

impl IdentityAddress {
    pub fn new(
        domain: impl Into<String>,
        username: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let identity = Self {
            domain: domain.into(),
            username: username.into(),
        };
        identity.validate()?;
        Ok(identity)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Re-check well-formedness, for values that came off the wire
    pub fn validate(&self) -> Result<(), IdentityError> {
        validate_field("domain", &self.domain)?;
        validate_field("username", &self.username)
    }
}

impl Display for IdentityAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.username, SEPARATOR, self.domain)
    }
}

impl FromStr for IdentityAddress {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (username, domain) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| IdentityError::Unparsable(s.to_string()))?;
        Self::new(domain, username)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_canonical_round_trip() {
        let id = IdentityAddress::new("example.org", "alice").unwrap();
        assert_eq!(id.to_string(), "alice@example.org");
        assert_eq!("alice@example.org".parse::<IdentityAddress>().unwrap(), id);
    }

    #[test]
    fn test_rejects_empty_fields() {
        assert_eq!(
            IdentityAddress::new("", "alice").unwrap_err(),
            IdentityError::Empty("domain")
        );
        assert_eq!(
            IdentityAddress::new("example.org", "").unwrap_err(),
            IdentityError::Empty("username")
        );
    }

    #[test]
    fn test_rejects_separator_in_fields() {
        assert!(matches!(
            IdentityAddress::new("example.org", "al@ice"),
            Err(IdentityError::IllegalCharacter { field: "username", ch: '@' })
        ));
        assert!(matches!(
            IdentityAddress::new("exa mple.org", "alice"),
            Err(IdentityError::IllegalCharacter { field: "domain", .. })
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("alice".parse::<IdentityAddress>().is_err());
        assert!("@example.org".parse::<IdentityAddress>().is_err());
        assert!("alice@".parse::<IdentityAddress>().is_err());
        assert!("a@b@c".parse::<IdentityAddress>().is_err());
    }

    #[test]
    fn test_ordering_is_domain_first() {
        let zed_at_a = IdentityAddress::new("a.org", "zed").unwrap();
        let amy_at_b = IdentityAddress::new("b.org", "amy").unwrap();
        assert!(zed_at_a < amy_at_b);
    }

    #[test]
    fn test_validate_catches_deserialized_garbage() {
        let raw = r#"{"domain":"example.org","username":"bad user"}"#;
        let id: IdentityAddress = serde_json::from_str(raw).unwrap();
        assert!(id.validate().is_err());
    }
}
