//! Error Handling Module
//!
//! Defines custom error types for the face attribute training library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for face attribute operations
#[derive(Error, Debug)]
pub enum FaceAttributeError {
    /// Error loading or decoding an image
    #[error("Failed to load image at {0:?}: {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error reading the annotation table
    #[error("Annotation error: {0}")]
    Annotation(String),

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error (hyperparameter space, run settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0:?}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for FaceAttributeError {
    fn from(err: serde_json::Error) -> Self {
        FaceAttributeError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for FaceAttributeError {
    fn from(err: csv::Error) -> Self {
        FaceAttributeError::Annotation(err.to_string())
    }
}

/// Convenience Result type for face attribute operations
pub type Result<T> = std::result::Result<T, FaceAttributeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FaceAttributeError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/path/to/face.png");
        let err = FaceAttributeError::ImageLoad(path, "file not found".to_string());
        assert!(format!("{}", err).contains("face.png"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: FaceAttributeError = io_err.into();
        assert!(matches!(err, FaceAttributeError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: FaceAttributeError = json_err.into();
        assert!(matches!(err, FaceAttributeError::Serialization(_)));
    }
}
