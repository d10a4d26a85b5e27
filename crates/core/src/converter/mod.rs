//! Media conversion over an external engine.
//!
//! Callers hand over in-memory buffers and an [`Intent`]. The converter
//! detects what the bytes are, picks an engine pipeline, stages the inputs
//! in scratch files, runs ffmpeg under a timeout and a concurrency limit,
//! and returns the output bytes. Scratch files never outlive the call.
//!
//! # Example
//!
//! ```ignore
//! use mediaconv_core::converter::{ConverterConfig, Direction, MediaConverter};
//!
//! let converter = MediaConverter::from_config(ConverterConfig::default());
//! converter.runner().validate().await?;
//!
//! let rotated = converter.flip_or_rotate(jpeg_bytes, Direction::Right).await?;
//! assert_eq!(rotated.mime_type, "image/jpeg");
//!
//! let sticker = converter.to_sticker(mp4_bytes, "My pack", "me").await?;
//! assert_eq!(sticker.extension, "webp");
//! ```

mod capabilities;
mod config;
mod detect;
mod error;
mod ffmpeg;
mod gate;
mod registry;
mod service;
mod traits;
mod types;

pub use capabilities::EngineCapabilities;
pub use config::{ConverterConfig, EngineConfig, LimitsConfig, ScratchConfig, StickerConfig};
pub use detect::FormatDetector;
pub use error::ConvertError;
pub use ffmpeg::FfmpegRunner;
pub use gate::{ConcurrencyGate, GatePermit, GateStatus};
pub use registry::{EngineInput, PipelineRegistry, PipelineSpec};
pub use service::MediaConverter;
pub use traits::EngineRunner;
pub use types::{
    ConversionOptions, ConversionRequest, ConversionResult, Direction, EngineReport, Intent,
    MediaBuffer, MediaCategory, MediaKind,
};
