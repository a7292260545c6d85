//! Error types for the inference engine.
//!
//! Load-time errors are fatal: a detector is either fully constructed or not
//! constructed at all. Classification itself has no error path.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while loading or evaluating a model.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid scaling bounds, threshold, or calibration input.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// Loaded layers do not match the fixed autoencoder topology.
    #[error("graph load error: {reason}")]
    GraphLoad { reason: String },

    /// Layer or buffer size mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Buffer access outside the active length.
    #[error("index {index} out of bounds for length {len}")]
    Index { index: usize, len: usize },

    /// Artifact bytes could not be decoded.
    #[error("invalid artifact format: {reason}")]
    InvalidFormat { reason: String },

    /// I/O error while reading an artifact or companion file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Companion parameter (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Create a new configuration error.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a new graph load error.
    #[must_use]
    pub fn graph_load(reason: impl Into<String>) -> Self {
        Self::GraphLoad {
            reason: reason.into(),
        }
    }

    /// Create a new invalid format error.
    #[must_use]
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }

    /// Whether this error was raised while validating the model graph.
    #[must_use]
    pub fn is_graph_load(&self) -> bool {
        matches!(self, Self::GraphLoad { .. })
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_configuration() {
        let err = EngineError::configuration("min must be below max");
        assert_eq!(
            err.to_string(),
            "configuration error: min must be below max"
        );
    }

    #[test]
    fn test_error_display_graph_load() {
        let err = EngineError::graph_load("expected 4 layers, found 3");
        assert_eq!(
            err.to_string(),
            "graph load error: expected 4 layers, found 3"
        );
        assert!(err.is_graph_load());
    }

    #[test]
    fn test_error_display_dimension_mismatch() {
        let err = EngineError::DimensionMismatch {
            expected: 8,
            actual: 4,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 8, got 4");
        assert!(!err.is_graph_load());
    }

    #[test]
    fn test_error_display_index() {
        let err = EngineError::Index { index: 9, len: 8 };
        assert_eq!(err.to_string(), "index 9 out of bounds for length 8");
    }

    #[test]
    fn test_error_display_invalid_format() {
        let err = EngineError::invalid_format("magic bytes mismatch");
        assert_eq!(
            err.to_string(),
            "invalid artifact format: magic bytes mismatch"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EngineError = io_err.into();
        assert!(err.to_string().contains("io error"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: EngineError = json_err.into();
        assert!(matches!(err, EngineError::Serialization(_)));
    }
}
