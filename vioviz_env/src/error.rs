//! Error types for the render backend abstraction.

use thiserror::Error;

use crate::primitive::PrimitiveKind;
use crate::types::WidgetHandle;

/// Errors that can occur while talking to a render backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Render context could not be created (e.g. no display and no off-screen mode)
    #[error("Render backend unavailable: {0}")]
    Unavailable(String),

    /// Handle was never issued or was already removed
    #[error("Unknown widget handle: {0}")]
    UnknownHandle(WidgetHandle),

    /// Backend cannot draw this kind of primitive
    #[error("Unsupported primitive: {0:?}")]
    UnsupportedPrimitive(PrimitiveKind),

    /// Screenshot or recording failed
    #[error("Capture error: {0}")]
    Capture(String),

    /// Underlying file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Creates an unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Creates a capture error.
    pub fn capture(msg: impl std::fmt::Display) -> Self {
        Self::Capture(msg.to_string())
    }
}
