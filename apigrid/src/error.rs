//! Error handling for apigrid.
//!
//! Most operations in this crate report problems as data (lists of error and
//! warning strings). This type is used where a caller asked for a strict
//! answer: the raw parsers, file loading and the HTTP layer.

use thiserror::Error;

/// The main error type for apigrid operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed query string or JSON parameter text.
    #[error("Format error: {0}")]
    Format(String),
    /// Items or total path could not be resolved against a response.
    #[error("Mapping error: {0}")]
    Mapping(String),
    /// The same parameter key is defined by more than one source.
    #[error("Conflict error: {0}")]
    Conflict(String),
    /// Structural problem in a configuration object.
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(String),
    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}

/// A Result type alias for apigrid operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_format_display() {
        let err = Error::Format("bad escape".to_string());
        assert_eq!(format!("{}", err), "Format error: bad escape");
    }

    #[test]
    fn test_error_config_validation_display() {
        let err = Error::ConfigValidation("dataKey is required".to_string());
        assert_eq!(format!("{}", err), "Invalid configuration: dataKey is required");
    }

    #[test]
    fn test_error_io_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(format!("{}", err).contains("IO error"));
    }

    #[test]
    fn test_error_source_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_source_conflict() {
        let err = Error::Conflict("page".to_string());
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_error_debug() {
        let err = Error::Mapping("debug test".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Mapping"));
        assert!(debug_str.contains("debug test"));
    }
}
