//! Error taxonomy of the scene engine.

use thiserror::Error;
use vioviz_env::BackendError;

/// Errors reported by the visualizer.
///
/// Per-frame errors (`MalformedInput`, `MissingResource`) are collected in the
/// frame's output and never abort the remaining steps. `BackendUnavailable`
/// and `Config` are startup errors and surface immediately.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VizError {
    /// Input data is inconsistent (index out of range, count mismatch, ...)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A file or path the step needed is missing or unwritable
    #[error("Missing resource: {0}")]
    MissingResource(String),

    /// Render context could not be created
    #[error("Render backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The rendering thread is gone
    #[error("Render thread error: {0}")]
    RenderThread(String),
}

impl VizError {
    /// Creates a malformed-input error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Creates a missing-resource error.
    pub fn missing(msg: impl Into<String>) -> Self {
        Self::MissingResource(msg.into())
    }

    /// Whether the error only affects the frame it happened in.
    pub fn is_per_frame(&self) -> bool {
        matches!(self, Self::MalformedInput(_) | Self::MissingResource(_))
    }
}

impl From<BackendError> for VizError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Unavailable(msg) => Self::BackendUnavailable(msg),
            BackendError::Io(io) => Self::MissingResource(io.to_string()),
            other => Self::RenderThread(other.to_string()),
        }
    }
}

/// Result type alias for visualizer operations
pub type Result<T> = std::result::Result<T, VizError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_unavailable_maps_to_startup_error() {
        let err: VizError = BackendError::unavailable("no display").into();
        assert_eq!(err, VizError::BackendUnavailable("no display".to_string()));
        assert!(!err.is_per_frame());
    }

    #[test]
    fn test_io_maps_to_missing_resource() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: VizError = BackendError::Io(io).into();
        assert!(matches!(err, VizError::MissingResource(_)));
        assert!(err.is_per_frame());
    }
}
