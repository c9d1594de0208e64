//! Validated commit object ids.

use std::fmt;

use crate::error::{GitError, Result};

/// A full 40-character hexadecimal git object id.
///
/// Construction validates the format; once built the id is immutable and
/// cheap to clone and compare.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parses a 40-hex-digit object id, normalizing to lowercase.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 40 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GitError::InvalidObjectId(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// The id as a lowercase hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
