//! Content-signature based format detection.

use infer::MatcherType;

use super::error::ConvertError;
use super::types::{MediaBuffer, MediaCategory, MediaKind};

/// Classifies buffers by their leading magic bytes.
///
/// Caller supplied names or extensions are never consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatDetector;

impl FormatDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detects the kind of `bytes`.
    pub fn detect(&self, bytes: &[u8]) -> Result<MediaKind, ConvertError> {
        if bytes.is_empty() {
            return Err(ConvertError::unsupported_format("input is empty"));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| ConvertError::unsupported_format("no known signature matched"))?;

        let category = match kind.matcher_type() {
            MatcherType::Image => MediaCategory::Image,
            MatcherType::Video => MediaCategory::Video,
            MatcherType::Audio => MediaCategory::Audio,
            other => {
                return Err(ConvertError::unsupported_format(format!(
                    "{} ({:?}) is not image, video or audio",
                    kind.mime_type(),
                    other
                )))
            }
        };

        Ok(MediaKind {
            category,
            extension: kind.extension(),
            mime_type: kind.mime_type(),
        })
    }

    /// Detects and wraps `bytes` into an immutable [`MediaBuffer`].
    pub fn classify(&self, bytes: Vec<u8>) -> Result<MediaBuffer, ConvertError> {
        let kind = self.detect(&bytes)?;
        Ok(MediaBuffer::new(bytes, kind))
    }
}
