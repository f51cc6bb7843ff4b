use thiserror::Error;

/// Container certification error types
#[derive(Error, Debug)]
pub enum CertError {
    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// OCI image error
    #[error("OCI image error: {0}")]
    OciImageError(String),

    /// Filesystem extraction failed
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// Archive entry resolved outside of the extraction root
    #[error("Archive entry escapes extraction root: {0}")]
    PathTraversal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Certification authority API error
    #[error("Authority error: {operation} - {message}")]
    AuthorityError { operation: String, message: String },

    /// Submission failed
    #[error("Submission error: {0}")]
    SubmissionError(String),

    /// A file required for submission is not on disk
    #[error("Missing artifact for submission: {0}")]
    MissingArtifact(String),

    /// The run was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A check could not complete
    #[error("Check {check} failed to execute: {message}")]
    CheckError { check: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CertError {
    fn from(err: serde_json::Error) -> Self {
        CertError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CertError {
    fn from(err: serde_yaml::Error) -> Self {
        CertError::SerializationError(err.to_string())
    }
}

impl CertError {
    /// Shorthand for an authority error tagged with the failing operation.
    pub fn authority(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CertError::AuthorityError {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error was caused by cancellation of the run.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CertError::Cancelled(_))
    }
}

/// Result type alias for certification operations
pub type Result<T> = std::result::Result<T, CertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let error = CertError::RegistryError {
            registry: "quay.io".to_string(),
            message: "Authentication failed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Registry error: quay.io - Authentication failed"
        );
    }

    #[test]
    fn test_path_traversal_display() {
        let error = CertError::PathTraversal("../etc/passwd".to_string());
        assert_eq!(
            error.to_string(),
            "Archive entry escapes extraction root: ../etc/passwd"
        );
    }

    #[test]
    fn test_authority_helper() {
        let error = CertError::authority("get project", "404 Not Found");
        assert_eq!(error.to_string(), "Authority error: get project - 404 Not Found");
    }

    #[test]
    fn test_check_error_display() {
        let error = CertError::CheckError {
            check: "HasLicense".to_string(),
            message: "unreadable directory".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Check HasLicense failed to execute: unreadable directory"
        );
    }

    #[test]
    fn test_missing_artifact_display() {
        let error = CertError::MissingArtifact("cert-image.json".to_string());
        assert!(error.to_string().contains("cert-image.json"));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(CertError::Cancelled("pull".to_string()).is_cancelled());
        assert!(!CertError::Other("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CertError = io_error.into();
        assert!(matches!(err, CertError::IoError(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ invalid");
        let err: CertError = result.unwrap_err().into();
        assert!(matches!(err, CertError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let err: CertError = result.unwrap_err().into();
        assert!(matches!(err, CertError::SerializationError(_)));
    }
}
