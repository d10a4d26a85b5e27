//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during a conversion request.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Input bytes do not carry a recognized media signature.
    #[error("Unsupported input format: {reason}")]
    UnsupportedFormat { reason: String },

    /// Option value is missing, unknown or out of range.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Input category is valid but the requested pipeline does not accept it.
    #[error("Unsupported media type: {category} is not accepted by {intent}")]
    UnsupportedMediaType { intent: String, category: String },

    /// The engine exited non-zero or was killed by a signal.
    #[error("Transcode failed: {reason}")]
    Transcode {
        reason: String,
        stderr: Option<String>,
    },

    /// The engine exceeded the configured wall-clock bound.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Concurrency gate and its wait queue are both full.
    #[error("Converter overloaded: {max_concurrent} running, {max_queue} queued")]
    Overloaded {
        max_concurrent: usize,
        max_queue: usize,
    },

    /// Engine binary not found.
    #[error("Engine not found at path: {}", path.display())]
    EngineNotFound { path: PathBuf },

    /// Scratch directory or file operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller cancelled the request.
    #[error("Conversion cancelled")]
    Cancelled,
}

impl ConvertError {
    /// Creates an unsupported format error.
    pub fn unsupported_format(reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            reason: reason.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Creates an unsupported media type error.
    pub fn unsupported_media_type(intent: impl Into<String>, category: impl Into<String>) -> Self {
        Self::UnsupportedMediaType {
            intent: intent.into(),
            category: category.into(),
        }
    }

    /// Creates a transcode error with an optional stderr excerpt.
    pub fn transcode(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Transcode {
            reason: reason.into(),
            stderr,
        }
    }

    /// Whether the error was caused by the request itself rather than the host.
    ///
    /// These are all raised before any subprocess is spawned.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. }
                | Self::InvalidArgument { .. }
                | Self::UnsupportedMediaType { .. }
        )
    }

    /// Short stable label, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::UnsupportedMediaType { .. } => "unsupported_media_type",
            Self::Transcode { .. } => "transcode",
            Self::Timeout { .. } => "timeout",
            Self::Overloaded { .. } => "overloaded",
            Self::EngineNotFound { .. } => "engine_not_found",
            Self::Io(_) => "io",
            Self::Cancelled => "cancelled",
        }
    }
}
