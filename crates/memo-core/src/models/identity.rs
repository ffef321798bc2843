//! Authenticated identity the remote document is scoped to.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Account uid handed over by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Build an identity from a raw uid, rejecting empty values and path separators.
    pub fn parse(raw: &str) -> Result<Self> {
        let uid = raw.trim();
        if uid.is_empty() {
            return Err(Error::InvalidInput("identity must not be empty".into()));
        }
        if uid.contains(['/', '\\']) || uid == "." || uid == ".." {
            return Err(Error::InvalidInput(format!("invalid identity: {uid}")));
        }
        Ok(Self(uid.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
