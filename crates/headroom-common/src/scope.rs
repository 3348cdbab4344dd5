//! Cgroup scope naming and validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{HeadroomError, HeadroomResult};

/// Prefix shared by every scope headroom creates.
pub const SCOPE_PREFIX: &str = "headroom";

/// A validated cgroup scope name.
///
/// Scope names must:
/// - Be 1-64 characters long
/// - Contain only alphanumeric characters, hyphens, and underscores
/// - Start with an alphanumeric character
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeName(String);

impl ScopeName {
    /// Maximum length of a scope name.
    pub const MAX_LENGTH: usize = 64;

    /// Create a new scope name, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the name format is invalid.
    pub fn new(name: impl Into<String>) -> HeadroomResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// The scope for a governed process.
    ///
    /// Derived from the PID so concurrent invocations never collide.
    #[must_use]
    pub fn for_pid(pid: u32) -> Self {
        Self(format!("{SCOPE_PREFIX}-{pid}"))
    }

    /// Get the scope name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate a scope name string.
    fn validate(name: &str) -> HeadroomResult<()> {
        let invalid = || HeadroomError::InvalidScopeName {
            name: name.to_string(),
        };

        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return Err(invalid());
        }

        if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }

        if name
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
        {
            return Err(invalid());
        }

        Ok(())
    }
}

/// A unique, disposable file name for the write benchmark.
#[must_use]
pub fn scratch_file_name() -> String {
    format!("{SCOPE_PREFIX}-bench-{}", uuid::Uuid::new_v4())
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ScopeName {
    type Err = HeadroomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ScopeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_scope_names() {
        assert!(ScopeName::new("headroom-123").is_ok());
        assert!(ScopeName::new("my_scope").is_ok());
        assert!(ScopeName::new("Scope-123_test").is_ok());
    }

    #[test]
    fn invalid_scope_names() {
        assert!(ScopeName::new("").is_err());
        assert!(ScopeName::new("-invalid").is_err());
        assert!(ScopeName::new("../escape").is_err());
        assert!(ScopeName::new("a/b").is_err());
        assert!(ScopeName::new("a".repeat(65)).is_err());
    }

    #[test]
    fn scope_for_pid() {
        let scope = ScopeName::for_pid(4242);
        assert_eq!(scope.as_str(), "headroom-4242");
        assert!(ScopeName::new(scope.as_str()).is_ok());
    }

    #[test]
    fn scratch_names_are_unique() {
        let a = scratch_file_name();
        let b = scratch_file_name();
        assert_ne!(a, b);
        assert!(a.starts_with("headroom-bench-"));
    }
}
