use std::sync::Arc;
use thiserror::Error;

/// Message committed when a failure carries no text of its own.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Failure reported by a field contract or validator.
///
/// Only the message survives: it is what ends up in
/// [`FieldValidation::error`](crate::FieldValidation::error).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: Arc<str>,
}

impl ValidationError {
    /// Error with the given message; an empty message becomes
    /// [`UNKNOWN_ERROR`].
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::unknown()
        } else {
            Self {
                message: message.into(),
            }
        }
    }

    /// Error without a usable message
    pub fn unknown() -> Self {
        Self {
            message: Arc::from(UNKNOWN_ERROR),
        }
    }

    /// Capture the display text of any error value
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::new(err.to_string())
    }

    /// The message committed to the field
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_error(&err)
    }
}

impl From<std::num::ParseIntError> for ValidationError {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::from_error(&err)
    }
}

impl From<std::num::ParseFloatError> for ValidationError {
    fn from(err: std::num::ParseFloatError) -> Self {
        Self::from_error(&err)
    }
}

/// Structural errors of the dynamic form layer.
#[derive(Debug, Error)]
pub enum FormError {
    /// A shape or init value for a group was not a JSON object
    #[error("expected an object for group `{path}`")]
    NotAnObject {
        /// Dotted path of the group, empty for the root
        path: String,
    },

    /// An init value could not be deserialized into the field's state type
    #[error("invalid init state for field `{field}`: {source}")]
    InitState {
        /// Name of the field
        field: String,
        /// Deserialization failure
        #[source]
        source: serde_json::Error,
    },

    /// A JSON edit could not be deserialized into the field's state type
    #[error("invalid state for field `{field}`: {source}")]
    State {
        /// Name of the field
        field: String,
        /// Deserialization failure
        #[source]
        source: serde_json::Error,
    },

    /// A field state could not be serialized
    #[error("failed to snapshot state of field `{field}`: {source}")]
    Snapshot {
        /// Name of the field
        field: String,
        /// Serialization failure
        #[source]
        source: serde_json::Error,
    },
}

/// Reasons a [`Form::submit`](crate::Form::submit) did not succeed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// A field failed validation; carries the first field error
    #[error("{0}")]
    Invalid(String),

    /// The form-level validate callback rejected the snapshot
    #[error("{0}")]
    Rejected(String),

    /// The submit callback failed
    #[error("{0}")]
    Failed(String),

    /// A newer submit or a reset superseded this one
    #[error("submit aborted")]
    Aborted,
}

impl SubmitError {
    /// Message shown to the user for this failure
    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_becomes_placeholder() {
        assert_eq!(ValidationError::new("").message(), UNKNOWN_ERROR);
        assert_eq!(ValidationError::from("   ").message(), UNKNOWN_ERROR);
        assert_eq!(ValidationError::from("required").to_string(), "required");
    }

    #[test]
    fn error_values_keep_their_display_text() {
        let err: ValidationError = "abc".parse::<i32>().unwrap_err().into();
        assert_eq!(err.message(), "invalid digit found in string");
    }

    #[test]
    fn submit_error_messages() {
        assert_eq!(SubmitError::Invalid("required".into()).message(), "required");
        assert_eq!(SubmitError::Aborted.to_string(), "submit aborted");
    }
}
