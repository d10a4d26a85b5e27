//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::ConvertError;
use super::registry::PipelineSpec;
use super::types::EngineReport;

/// Runs the external transcoding engine for one pipeline.
#[async_trait]
pub trait EngineRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Runs `spec` reading `inputs` and writing `output`.
    ///
    /// `inputs` are the scratch paths of the pipeline's buffer inputs, in index
    /// order. The child process must be gone by the time this returns,
    /// whatever the outcome, and must be terminated when `timeout` elapses
    /// or `cancel` fires.
    async fn run(
        &self,
        spec: &PipelineSpec,
        inputs: &[PathBuf],
        output: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<EngineReport, ConvertError>;

    /// Validates that the engine is installed and runnable.
    async fn validate(&self) -> Result<(), ConvertError>;
}
