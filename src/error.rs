use thiserror::Error;

/// Errors produced by the change-detection engine and its collaborators
#[derive(Error, Debug)]
pub enum WatchError {
    /// The rendered document had no body to extract from
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// Rendering or network failure; retried on the next cycle
    #[error("fetch failed: {0}")]
    FetchTransient(String),

    /// The analysis service could not be reached or answered badly
    #[error("annotation failed: {0}")]
    AnnotationFailed(String),

    /// Malformed target URL, interval or rule table
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// No job registered under this id
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Job already has a live monitor task
    #[error("job already running: {0}")]
    JobAlreadyRunning(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<regex::Error> for WatchError {
    fn from(err: regex::Error) -> Self {
        WatchError::ConfigurationInvalid(format!("invalid pattern: {}", err))
    }
}

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WatchError::ExtractionFailed("no <body> element".into());
        assert_eq!(err.to_string(), "extraction failed: no <body> element");

        let err =
            WatchError::ConfigurationInvalid("check interval must be at least 1 minute".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: check interval must be at least 1 minute"
        );
    }

    #[test]
    fn test_regex_error_is_configuration_error() {
        let regex_err = regex::Regex::new("(unclosed").unwrap_err();
        let err: WatchError = regex_err.into();
        assert!(matches!(err, WatchError::ConfigurationInvalid(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: WatchError = json_err.into();
        assert!(matches!(err, WatchError::Json(_)));
    }
}
