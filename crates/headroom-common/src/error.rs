//! Common error types for headroom.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`HeadroomError`].
pub type HeadroomResult<T> = Result<T, HeadroomError>;

/// Errors raised while setting up or running the governor.
#[derive(Error, Diagnostic, Debug)]
pub enum HeadroomError {
    /// The host does not expose the unified cgroup v2 hierarchy.
    #[error("Unified cgroup hierarchy not available at {root}")]
    #[diagnostic(
        code(headroom::cgroup::unavailable),
        help("headroom requires cgroup v2; boot with systemd.unified_cgroup_hierarchy=1")
    )]
    CgroupUnavailable {
        /// The cgroup root that was probed.
        root: String,
    },

    /// A cgroup operation failed.
    #[error("Cgroup error ({scope}): {message}")]
    #[diagnostic(code(headroom::cgroup))]
    Cgroup {
        /// The scope the operation targeted.
        scope: String,
        /// The error message.
        message: String,
    },

    /// Invalid cgroup scope name.
    #[error("Invalid scope name: {name}")]
    #[diagnostic(
        code(headroom::cgroup::invalid_scope),
        help("Scope names must be alphanumeric with hyphens and underscores, 1-64 characters")
    )]
    InvalidScopeName {
        /// The rejected name.
        name: String,
    },

    /// A kernel statistics file could not be parsed.
    #[error("Malformed statistics in {source_file}: {message}")]
    #[diagnostic(code(headroom::stats::malformed))]
    MalformedStats {
        /// The file being parsed.
        source_file: String,
        /// What was wrong with it.
        message: String,
    },

    /// Unparsable throughput figure.
    #[error("Invalid throughput: {value}")]
    #[diagnostic(
        code(headroom::rate::invalid),
        help("Expected a number followed by a rate unit, e.g. '98.4 MB/sec'")
    )]
    InvalidRate {
        /// The rejected text.
        value: String,
    },

    /// Block device enumeration failed.
    #[error("Device enumeration failed: {message}")]
    #[diagnostic(
        code(headroom::device::enumeration),
        help("Make sure `lsblk` from util-linux is installed and on PATH")
    )]
    DeviceEnumeration {
        /// The error message.
        message: String,
    },

    /// The governed process could not be started or awaited.
    #[error("Failed to run {command}: {message}")]
    #[diagnostic(code(headroom::process))]
    Process {
        /// The program being launched.
        command: String,
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(headroom::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(headroom::serialization))]
    Serialization(String),

    /// Permission denied.
    #[error("Permission denied: {operation}")]
    #[diagnostic(
        code(headroom::permission_denied),
        help("Try running with elevated privileges (sudo)")
    )]
    PermissionDenied {
        /// The operation that was denied.
        operation: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(headroom::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(headroom::internal),
        help("This is a bug, please report it at https://github.com/fishmindlabs360/headroom/issues")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl From<serde_json::Error> for HeadroomError {
    fn from(err: serde_json::Error) -> Self {
        HeadroomError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = HeadroomError::Cgroup {
            scope: "headroom-42".to_string(),
            message: "write cpu.max".to_string(),
        };
        assert_eq!(err.to_string(), "Cgroup error (headroom-42): write cpu.max");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HeadroomError = io_err.into();
        assert!(matches!(err, HeadroomError::Io(_)));
    }

    #[test]
    fn error_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: HeadroomError = json_err.into();
        assert!(matches!(err, HeadroomError::Serialization(_)));
    }
}
