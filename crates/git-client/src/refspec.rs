//! Fetch refspec parsing.
//!
//! A refspec maps remote ref names to local ref names during fetch, e.g.
//! `+refs/heads/*:refs/remotes/origin/*`. A leading `+` requests force
//! updates (the destination ref is overwritten even on non-fast-forward).

use std::fmt;

use crate::error::{GitError, Result};

/// A parsed `[+]source:destination` ref mapping. Immutable value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpec {
    source: String,
    destination: String,
    force: bool,
}

impl RefSpec {
    /// Parses a refspec string.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::MalformedRefSpec`] if the colon separator is
    /// absent or either side is empty.
    pub fn parse(spec: &str) -> Result<Self> {
        let (force, rest) = match spec.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };

        let Some((source, destination)) = rest.split_once(':') else {
            return Err(GitError::MalformedRefSpec {
                refspec: spec.to_string(),
                reason: "missing ':' separator".to_string(),
            });
        };

        if source.is_empty() || destination.is_empty() {
            return Err(GitError::MalformedRefSpec {
                refspec: spec.to_string(),
                reason: "source and destination must be non-empty".to_string(),
            });
        }

        Ok(Self {
            source: source.to_string(),
            destination: destination.to_string(),
            force,
        })
    }

    /// The remote-side pattern.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The local-side pattern.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Whether non-fast-forward updates are forced.
    pub fn is_force(&self) -> bool {
        self.force
    }
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.force {
            f.write_str("+")?;
        }
        write!(f, "{}:{}", self.source, self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_plain_refspec() {
        let spec = RefSpec::parse("refs/heads/main:refs/remotes/origin/main").unwrap();
        assert_eq!(spec.source(), "refs/heads/main");
        assert_eq!(spec.destination(), "refs/remotes/origin/main");
        assert!(!spec.is_force());
    }

    #[test]
    fn parse_force_refspec() {
        let spec = RefSpec::parse("+refs/heads/*:refs/remotes/origin/*").unwrap();
        assert_eq!(spec.source(), "refs/heads/*");
        assert!(spec.is_force());
    }

    #[test]
    fn round_trip_preserves_input() {
        for input in [
            "refs/heads/main:refs/remotes/origin/main",
            "+refs/heads/*:refs/remotes/origin/*",
            "+refs/tags/v1:refs/tags/v1",
        ] {
            assert_eq!(RefSpec::parse(input).unwrap().to_string(), input);
        }
    }

    #[test]
    fn parse_rejects_missing_colon() {
        assert!(matches!(
            RefSpec::parse("refs/heads/main"),
            Err(GitError::MalformedRefSpec { .. })
        ));
    }

    #[test]
    fn parse_rejects_empty_sides() {
        assert!(RefSpec::parse(":refs/remotes/origin/main").is_err());
        assert!(RefSpec::parse("refs/heads/main:").is_err());
        assert!(RefSpec::parse("+:").is_err());
    }
}
