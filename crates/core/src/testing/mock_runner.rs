//! Mock engine runner for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::fixtures;
use crate::converter::{ConvertError, EngineReport, EngineRunner, Intent, PipelineSpec};

/// A recorded engine run for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub intent: Intent,
    /// Scratch paths handed to the engine.
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub output_args: Vec<String>,
    /// Whether every input file existed when the run started.
    pub inputs_present: bool,
    /// Input file contents, in order.
    pub input_bytes: Vec<Vec<u8>>,
}

/// Mock implementation of the EngineRunner trait.
///
/// Provides controllable behavior for testing:
/// - Track runs for assertions
/// - Simulate engine failures
/// - Simulate slow runs, honouring timeout and cancellation
/// - Track how many runs overlap
///
/// Without an explicit output it writes a plausible file for the
/// pipeline's output extension: a 512x512 WebP for stickers, a signature
/// header for mp3/mp4/jpg, and a copy of the first input otherwise.
#[derive(Debug)]
pub struct MockRunner {
    runs: Arc<RwLock<Vec<RecordedRun>>>,
    /// If set, the next run will fail with this error.
    next_error: Arc<RwLock<Option<ConvertError>>>,
    /// Simulated run duration.
    delay: Arc<RwLock<Duration>>,
    /// Bytes written to the output path instead of the default.
    output: Arc<RwLock<Option<Vec<u8>>>>,
    /// When false, runs succeed without writing anything.
    write_output: Arc<RwLock<bool>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the active counter honest if the run future is dropped.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            output: Arc::new(RwLock::new(None)),
            write_output: Arc::new(RwLock::new(true)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock runner whose runs take `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Arc::new(RwLock::new(delay)),
            ..Self::new()
        }
    }

    /// Get all recorded runs.
    pub async fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.read().await.clone()
    }

    /// Get the number of runs started.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Set an error to be returned on the next run.
    pub async fn set_next_error(&self, error: ConvertError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set the simulated run duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Set the bytes every subsequent run writes.
    pub async fn set_output(&self, bytes: Vec<u8>) {
        *self.output.write().await = Some(bytes);
    }

    /// Make subsequent runs succeed without producing a file.
    pub async fn skip_output(&self) {
        *self.write_output.write().await = false;
    }

    /// Runs in flight right now.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping runs seen.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn default_output(&self, spec: &PipelineSpec, inputs: &[PathBuf]) -> Vec<u8> {
        match spec.output_extension {
            "webp" if spec.intent == Intent::VideoToSticker => fixtures::webp_animated(512, 512),
            "webp" if spec.output_args.iter().any(|a| a == "-loop") => {
                fixtures::webp_animated(512, 512)
            }
            "webp" => fixtures::webp_lossless(512, 512, true),
            "mp3" => fixtures::mp3_header(),
            "mp4" => fixtures::mp4_header(),
            "jpg" => fixtures::jpeg_header(),
            _ => match inputs.first() {
                Some(path) => tokio::fs::read(path).await.unwrap_or_default(),
                None => Vec::new(),
            },
        }
    }
}

#[async_trait]
impl EngineRunner for MockRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(
        &self,
        spec: &PipelineSpec,
        inputs: &[PathBuf],
        output: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<EngineReport, ConvertError> {
        let mut input_bytes = Vec::with_capacity(inputs.len());
        let mut inputs_present = true;
        for path in inputs {
            match tokio::fs::read(path).await {
                Ok(bytes) => input_bytes.push(bytes),
                Err(_) => inputs_present = false,
            }
        }
        self.runs.write().await.push(RecordedRun {
            intent: spec.intent,
            inputs: inputs.to_vec(),
            output: output.to_path_buf(),
            output_args: spec.output_args.clone(),
            inputs_present,
            input_bytes,
        });

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.peak.fetch_max(active, Ordering::SeqCst);

        let delay = *self.delay.read().await;
        tokio::select! {
            _ = tokio::time::sleep(delay), if delay < timeout => {}
            _ = tokio::time::sleep(timeout), if delay >= timeout => {
                return Err(ConvertError::Timeout { timeout_secs: timeout.as_secs() });
            }
            _ = cancel.cancelled() => return Err(ConvertError::Cancelled),
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        if *self.write_output.read().await {
            let bytes = match self.output.read().await.clone() {
                Some(bytes) => bytes,
                None => self.default_output(spec, inputs).await,
            };
            tokio::fs::write(output, bytes).await?;
        }

        Ok(EngineReport {
            diagnostics: None,
            duration_ms: delay.as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), ConvertError> {
        Ok(())
    }
}
