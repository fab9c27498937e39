//! Cache key naming
//!
//! Every key has the shape `{type}:{identifier}` where `type` belongs to a
//! closed set. Anything else is rejected.

use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// Key namespaces accepted by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    User,
    Jobs,
    Referrals,
    Session,
    Api,
}

impl KeyType {
    pub const ALL: [KeyType; 5] = [
        KeyType::User,
        KeyType::Jobs,
        KeyType::Referrals,
        KeyType::Session,
        KeyType::Api,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Jobs => "jobs",
            Self::Referrals => "referrals",
            Self::Session => "session",
            Self::Api => "api",
        }
    }

    /// Build the key for `identifier` in this namespace
    pub fn key(self, identifier: impl fmt::Display) -> String {
        format!("{}:{identifier}", self.as_str())
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CacheError::InvalidKeyType(s.to_string()))
    }
}

/// Build a `{type}:{identifier}` key from a type name
///
/// # Errors
///
/// Returns [`CacheError::InvalidKeyType`] if `key_type` is not one of
/// `user`, `jobs`, `referrals`, `session`, `api`.
pub fn generate_key(key_type: &str, identifier: impl fmt::Display) -> Result<String, CacheError> {
    Ok(key_type.parse::<KeyType>()?.key(identifier))
}
