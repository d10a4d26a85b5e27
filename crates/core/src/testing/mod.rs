//! Testing utilities: a mock engine runner and media byte fixtures.
//!
//! The mock lets conversion flows be exercised end to end, including
//! scratch lifecycle, concurrency limits and cancellation, without an
//! ffmpeg binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediaconv_core::converter::{ConverterConfig, MediaConverter};
//! use mediaconv_core::testing::{fixtures, MockRunner};
//!
//! let converter = MediaConverter::new(ConverterConfig::default(), MockRunner::new());
//! let result = converter.to_sticker(fixtures::png_header(), "pack", "me").await?;
//! assert_eq!(converter.runner().run_count().await, 1);
//! ```

pub mod fixtures;
mod mock_runner;

pub use mock_runner::{MockRunner, RecordedRun};
