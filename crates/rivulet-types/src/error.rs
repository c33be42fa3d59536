//! Error hierarchy for Rivulet.

use thiserror::Error;

/// Errors raised while building or driving an event source connection.
///
/// Only construction errors are returned to callers directly. Everything that
/// goes wrong once the connection is running is reported through `error`
/// events, using the `Display` text of these variants as the event data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventSourceError {
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    #[error("No Tokio runtime available to drive the connection")]
    NoRuntime,

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error! status: {status}")]
    Status { status: u16 },

    #[error("Invalid Content-Type: {}", content_type.as_deref().unwrap_or("<none>"))]
    ContentType { content_type: Option<String> },

    #[error("HTTP response body is missing")]
    MissingBody,

    #[error("Invalid UTF-8 in event stream: {0}")]
    Decode(String),

    #[error("Event stream ended")]
    StreamEnded,

    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_message() {
        let err = EventSourceError::Status { status: 503 };
        assert_eq!(err.to_string(), "HTTP error! status: 503");
    }

    #[test]
    fn content_type_error_message() {
        let err = EventSourceError::ContentType {
            content_type: Some("application/json".into()),
        };
        assert_eq!(err.to_string(), "Invalid Content-Type: application/json");

        let err = EventSourceError::ContentType { content_type: None };
        assert_eq!(err.to_string(), "Invalid Content-Type: <none>");
    }

    #[test]
    fn config_error_message() {
        let err = ConfigError::InvalidValue {
            key: "reconnect.backoff_factor".into(),
            message: "must be >= 1.0".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'reconnect.backoff_factor': must be >= 1.0"
        );
    }
}
