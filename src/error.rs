//! # Error Handling
//!
//! This module defines the centralized error type for `conf-center`. It uses
//! the `thiserror` library to build one `Error` enum covering every failure
//! mode of the library, so that each component returns a result-or-error
//! value and nothing crosses a component boundary as a different error kind.
//!
//! ## Taxonomy
//!
//! - **Validation**: bad username, malformed version tag, malformed env
//!   number, missing required file. Raised before any storage I/O.
//! - **Not found**: an absent document or absent version history. Each
//!   resource gets its own message, absence is never defaulted.
//! - **Lookup**: resolution failures from the lookup resolver, always naming
//!   the lookup that failed (see [`LookupFailure`]).
//! - **Backend**: storage I/O failures, unavailable locks, rejected commits.
//!
//! The RPC layer turns any of these into a human-readable status string via
//! `Display`.

use thiserror::Error;

/// Main error type for conf-center operations
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any I/O took place.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// A document or record that was expected to exist is absent.
    #[error("{resource} not found: {key}")]
    NotFound { resource: String, key: String },

    /// A service key could not be resolved.
    #[error("lookup of '{key}' failed: {failure}")]
    Lookup { key: String, failure: LookupFailure },

    /// A template failed to parse or execute.
    ///
    /// Includes the template name when known.
    #[error("template error{}: {message}", name.as_ref().map(|n| format!(" in '{}'", n)).unwrap_or_default())]
    Template {
        message: String,
        /// The template being parsed or executed, if applicable
        name: Option<String>,
    },

    /// An explicit version tag is already present in history.
    #[error("repeated version: {tag}")]
    RepeatedVersion { tag: String },

    /// COMMIT found nothing under the caller's staging namespace.
    #[error("no staged data for user {user}")]
    NoStagedData { user: String },

    /// The staged batch changed between validation and commit.
    #[error("staged data for user {user} changed during commit")]
    StagedDataChanged { user: String },

    /// The distributed commit lock could not be obtained.
    #[error("lock unavailable: {message}")]
    LockUnavailable { message: String },

    /// A storage backend operation failed.
    #[error("storage error: {operation} - {message}")]
    Storage { operation: String, message: String },

    /// A path/key in the namespace was malformed.
    #[error("invalid key: {message}")]
    Key { message: String },

    /// The version record held in storage could not be decoded.
    #[error("corrupt version record: {message}")]
    VersionRecord { message: String },

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON parsing error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A semantic versioning parsing error, wrapped from `semver::Error`.
    #[error("Semver parsing error: {0}")]
    Semver(#[from] semver::Error),
}

/// The distinct ways a single service-key lookup can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// The key is absent from the service list.
    MissingKey,
    /// Indexed addressing needs at least two dot-separated segments.
    BadFormat,
    /// `deployment_info.<localId>.hostname` is absent.
    MissingHostname { local_id: String },
    /// No infrastructure leaf ends in `<hostname>.<interior>`.
    NoInfrastructureMatch { suffix: String },
    /// Several infrastructure leaves match with different values.
    AmbiguousInfrastructure { suffix: String, candidates: Vec<String> },
    /// The resolved value was `{}`.
    EmptyIndirection,
}

impl std::fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingKey => write!(f, "key not present in service list"),
            Self::BadFormat => write!(f, "indexed key needs at least two dot segments"),
            Self::MissingHostname { local_id } => {
                write!(f, "no hostname for deployment_info.{}", local_id)
            }
            Self::NoInfrastructureMatch { suffix } => {
                write!(f, "no infrastructure entry ends with '{}'", suffix)
            }
            Self::AmbiguousInfrastructure { suffix, candidates } => write!(
                f,
                "ambiguous infrastructure entries for '{}': {}",
                suffix,
                candidates.join(", ")
            ),
            Self::EmptyIndirection => write!(f, "empty indirection '{{}}'"),
        }
    }
}

impl Error {
    /// Shorthand for a [`Error::Validation`].
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(resource: &str, key: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.to_string(),
            key: key.into(),
        }
    }

    /// Shorthand for a [`Error::Lookup`].
    pub fn lookup(key: &str, failure: LookupFailure) -> Self {
        Self::Lookup {
            key: key.to_string(),
            failure,
        }
    }

    /// Shorthand for a [`Error::Storage`].
    pub fn storage(operation: &str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let error = Error::validation("username", "must not contain ','");
        let display = format!("{}", error);
        assert_eq!(display, "invalid username: must not contain ','");
    }

    #[test]
    fn test_error_display_not_found() {
        let error = Error::not_found("service list", "0.0.1/1/web/service_list");
        let display = format!("{}", error);
        assert!(display.contains("service list not found"));
        assert!(display.contains("0.0.1/1/web/service_list"));
    }

    #[test]
    fn test_error_display_lookup_missing_hostname() {
        let error = Error::lookup(
            "deployment_info.3.IP",
            LookupFailure::MissingHostname {
                local_id: "3".to_string(),
            },
        );
        let display = format!("{}", error);
        assert!(display.contains("lookup of 'deployment_info.3.IP' failed"));
        assert!(display.contains("no hostname for deployment_info.3"));
    }

    #[test]
    fn test_error_display_empty_indirection() {
        let error = Error::lookup("deployment_info.0.IP", LookupFailure::EmptyIndirection);
        assert!(format!("{}", error).contains("empty indirection '{}'"));
    }

    #[test]
    fn test_error_display_ambiguous() {
        let failure = LookupFailure::AmbiguousInfrastructure {
            suffix: "h1.ip".to_string(),
            candidates: vec!["a.h1.ip".to_string(), "b.h1.ip".to_string()],
        };
        assert_eq!(
            failure.to_string(),
            "ambiguous infrastructure entries for 'h1.ip': a.h1.ip, b.h1.ip"
        );
    }

    #[test]
    fn test_error_template_with_name() {
        let error = Error::Template {
            message: "unexpected {{end}}".to_string(),
            name: Some("nginx.conf".to_string()),
        };
        let display = format!("{}", error);
        assert!(display.contains("template error in 'nginx.conf'"));
        assert!(display.contains("unexpected {{end}}"));
    }

    #[test]
    fn test_error_template_without_name() {
        let error = Error::Template {
            message: "bad".to_string(),
            name: None,
        };
        assert_eq!(format!("{}", error), "template error: bad");
    }

    #[test]
    fn test_error_repeated_version() {
        let error = Error::RepeatedVersion {
            tag: "1.2.3".to_string(),
        };
        assert_eq!(format!("{}", error), "repeated version: 1.2.3");
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();
        let display = format!("{}", error);
        assert!(display.contains("I/O error"));
        assert!(display.contains("File not found"));
    }

    #[test]
    fn test_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{unclosed").unwrap_err();
        let error: Error = json_error.into();
        assert!(format!("{}", error).contains("JSON error"));
    }

    #[test]
    fn test_error_from_regex_error() {
        let regex_error = regex::Error::Syntax("Invalid regex".to_string());
        let error: Error = regex_error.into();
        let display = format!("{}", error);
        assert!(display.contains("Regex error"));
    }
}
