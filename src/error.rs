//! Error kinds raised while building requests, running calls and
//! checking responses.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The verb is not one of GET, POST, PUT, PATCH, DELETE, OPTIONS, HEAD.
    #[error(
        "unsupported HTTP method \"{0}\" (expected one of GET, POST, PUT, \
         PATCH, DELETE, OPTIONS, HEAD)"
    )]
    InvalidMethod(String),
    /// A `{{ name }}` marker refers to a key missing from the dataset.
    #[error("placeholder \"{{{{ {0} }}}}\" cannot be resolved from the dataset")]
    UnresolvedPlaceholder(String),
    /// Secrets are seeded once and cannot be overwritten by steps.
    #[error("dataset key \"{0}\" holds a secret and cannot be overwritten")]
    ProtectedKey(String),
    #[error("invalid request url \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid payload path \"{0}\"")]
    InvalidPayloadPath(String),
    #[error("invalid JSON path \"{path}\": {reason}")]
    InvalidJsonPath { path: String, reason: String },
    #[error("invalid regular expression \"{pattern}\": {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("no API call has been started in this scenario")]
    NoActiveCall,
    #[error("the current API call has no response")]
    NoResponse,
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

/// A failed expectation. Both sides are kept as display strings so the
/// failure can be reported without access to the response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (expected: {expected}, actual: {actual})")]
pub struct AssertionFailure {
    pub message: String,
    pub expected: String,
    pub actual: String,
}

impl AssertionFailure {
    pub fn new(
        message: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self {
            message: message.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// The transport could not obtain any response (DNS, connection, timeout).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportFailure {
    pub message: String,
}

impl TransportFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_failure_reports_both_sides() {
        let failure = AssertionFailure::new("status mismatch", 200, 404);
        let err: Error = failure.into();
        assert_eq!(
            err.to_string(),
            "status mismatch (expected: 200, actual: 404)"
        );
    }

    #[test]
    fn test_unresolved_placeholder_message() {
        let err = Error::UnresolvedPlaceholder("user_id".into());
        assert_eq!(
            err.to_string(),
            "placeholder \"{{ user_id }}\" cannot be resolved from the dataset"
        );
    }
}
