//! Owner identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of an owner identifier.
pub const MAX_OWNER_LEN: usize = 128;

/// An authenticated owner identifier.
///
/// The identity itself is established upstream; this type only guarantees the
/// value is safe to embed as a single object key segment (`users/{owner}/...`).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Create from a string, validating format.
    pub fn new(owner: impl Into<String>) -> crate::Result<Self> {
        let owner = owner.into();
        if owner.is_empty() {
            return Err(crate::Error::InvalidOwner(
                "owner id cannot be empty".to_string(),
            ));
        }
        if owner.len() > MAX_OWNER_LEN {
            return Err(crate::Error::InvalidOwner(format!(
                "owner id must be at most {MAX_OWNER_LEN} chars, got {}",
                owner.len()
            )));
        }
        if owner == "." || owner.contains("..") {
            return Err(crate::Error::InvalidOwner(format!(
                "owner id cannot be a relative path segment: {owner}"
            )));
        }
        for c in owner.chars() {
            if !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '@') {
                return Err(crate::Error::InvalidOwner(format!(
                    "invalid character in owner id: {c:?}"
                )));
            }
        }
        Ok(Self(owner))
    }

    /// Get the owner id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object key prefix holding every object this owner stores.
    pub fn key_prefix(&self) -> String {
        format!("users/{}/", self.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({self})")
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
