//! Request orchestration: validate, gate, stage, run, read back, clean up.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::ConverterConfig;
use super::detect::FormatDetector;
use super::error::ConvertError;
use super::ffmpeg::FfmpegRunner;
use super::gate::{ConcurrencyGate, GateStatus};
use super::registry::{PipelineRegistry, PipelineSpec};
use super::traits::EngineRunner;
use super::types::{
    ConversionOptions, ConversionRequest, ConversionResult, Direction, Intent, MediaBuffer,
    MediaKind,
};
use crate::metrics;
use crate::scratch::{ScratchScope, TempPathAllocator};

/// Buffer-in/buffer-out media converter.
///
/// Each call is independent. Validation failures return before anything
/// touches disk or spawns a process; everything written to scratch is gone
/// by the time a call returns, whatever the outcome.
pub struct MediaConverter<R: EngineRunner = FfmpegRunner> {
    config: ConverterConfig,
    runner: Arc<R>,
    detector: FormatDetector,
    registry: PipelineRegistry,
    allocator: Arc<TempPathAllocator>,
    gate: ConcurrencyGate,
}

impl<R: EngineRunner> Clone for MediaConverter<R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            runner: Arc::clone(&self.runner),
            detector: self.detector,
            registry: self.registry.clone(),
            allocator: Arc::clone(&self.allocator),
            gate: self.gate.clone(),
        }
    }
}

impl MediaConverter<FfmpegRunner> {
    /// Creates a converter driving the ffmpeg binary named in `config`.
    pub fn from_config(config: ConverterConfig) -> Self {
        let runner = FfmpegRunner::new(config.engine.clone());
        Self::new(config, runner)
    }
}

impl<R: EngineRunner> MediaConverter<R> {
    /// Creates a converter around an arbitrary runner.
    pub fn new(config: ConverterConfig, runner: R) -> Self {
        let allocator = Arc::new(TempPathAllocator::new(&config.scratch.temp_root));
        let gate = ConcurrencyGate::new(
            config.limits.max_concurrent_processes,
            config.limits.max_queue_depth,
        );
        let registry = PipelineRegistry::new(config.sticker.clone());
        Self {
            config,
            runner: Arc::new(runner),
            detector: FormatDetector::new(),
            registry,
            allocator,
            gate,
        }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Process-scoped scratch directory.
    pub fn scratch_root(&self) -> &std::path::Path {
        self.allocator.root()
    }

    /// Current concurrency gate counters.
    pub fn status(&self) -> GateStatus {
        self.gate.status()
    }

    /// Detects the kind of a buffer without converting it.
    pub fn detect(&self, bytes: &[u8]) -> Result<MediaKind, ConvertError> {
        self.detector.detect(bytes)
    }

    /// Runs one conversion.
    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionResult, ConvertError> {
        self.convert_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Runs one conversion, aborting it when `cancel` fires.
    ///
    /// Dropping the returned future has the same effect: the engine is
    /// killed and scratch files are removed.
    pub async fn convert_with_cancel(
        &self,
        request: ConversionRequest,
        cancel: CancellationToken,
    ) -> Result<ConversionResult, ConvertError> {
        let intent = request.intent;
        let request_id = request.id;
        let start = Instant::now();

        let result = self.execute(request, &cancel).await;

        let elapsed = start.elapsed();
        metrics::CONVERSION_DURATION
            .with_label_values(&[intent.as_str()])
            .observe(elapsed.as_secs_f64());
        match &result {
            Ok(output) => {
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&[intent.as_str(), "success"])
                    .inc();
                tracing::info!(
                    %request_id,
                    %intent,
                    bytes = output.bytes.len(),
                    mime = output.mime_type,
                    duration_ms = elapsed.as_millis() as u64,
                    "Conversion completed"
                );
            }
            Err(e) => {
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&[intent.as_str(), e.kind()])
                    .inc();
                if e.is_client_error() {
                    tracing::debug!(%request_id, %intent, error = %e, "Conversion rejected");
                } else {
                    tracing::warn!(%request_id, %intent, error = %e, "Conversion failed");
                }
            }
        }
        result
    }

    async fn execute(
        &self,
        request: ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<ConversionResult, ConvertError> {
        let ConversionRequest {
            id,
            intent,
            inputs,
            options,
        } = request;

        self.registry.validate_options(intent, &options)?;

        let expected = self.registry.input_count(intent);
        if inputs.len() != expected {
            return Err(ConvertError::invalid_argument(format!(
                "{} takes {} input(s), got {}",
                intent,
                expected,
                inputs.len()
            )));
        }

        let buffers = inputs
            .into_iter()
            .map(|bytes| {
                if bytes.len() > self.config.limits.max_input_bytes {
                    return Err(ConvertError::invalid_argument(format!(
                        "input is {} bytes, limit is {}",
                        bytes.len(),
                        self.config.limits.max_input_bytes
                    )));
                }
                self.detector.classify(bytes)
            })
            .collect::<Result<Vec<MediaBuffer>, _>>()?;
        let kinds: Vec<MediaKind> = buffers.iter().map(MediaBuffer::kind).collect();
        let spec = self.registry.resolve(intent, &kinds, &options)?;

        let _permit = tokio::select! {
            permit = self.gate.acquire() => permit?,
            _ = cancel.cancelled() => return Err(ConvertError::Cancelled),
        };

        let start = Instant::now();
        let mut scope = self.allocator.scope(id);
        let outcome = self.run_in_scope(&mut scope, &spec, &buffers, cancel).await;
        let cleanup = scope.release_all().await;
        if !cleanup.is_clean() {
            tracing::debug!(
                request_id = %id,
                failures = cleanup.failures.len(),
                "Scratch cleanup incomplete"
            );
        }

        let (bytes, diagnostics) = outcome?;
        Ok(ConversionResult {
            request_id: id,
            bytes,
            mime_type: spec.mime_type,
            extension: spec.output_extension,
            diagnostics,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn run_in_scope(
        &self,
        scope: &mut ScratchScope,
        spec: &PipelineSpec,
        buffers: &[MediaBuffer],
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, Option<String>), ConvertError> {
        let mut input_paths = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            input_paths.push(scope.write(buffer.kind().extension, buffer.bytes()).await?);
        }
        let output = scope.allocate(spec.output_extension).await?;

        let report = self
            .runner
            .run(
                spec,
                &input_paths,
                &output,
                self.config.engine.timeout(),
                cancel,
            )
            .await?;

        let bytes = tokio::fs::read(&output).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ConvertError::transcode("engine exited cleanly but wrote no output", None)
            } else {
                ConvertError::Io(e)
            }
        })?;
        if bytes.is_empty() {
            return Err(ConvertError::transcode(
                "engine wrote an empty output file",
                report.diagnostics,
            ));
        }

        let bytes = match &spec.sticker_metadata {
            Some(metadata) => metadata.apply(&bytes).map_err(|e| {
                ConvertError::transcode(format!("engine output is not a usable WebP: {}", e), None)
            })?,
            None => bytes,
        };

        Ok((bytes, report.diagnostics))
    }

    /// Wraps an audio track into a solid-colour video.
    pub async fn audio_to_video(
        &self,
        audio: Vec<u8>,
        options: ConversionOptions,
    ) -> Result<ConversionResult, ConvertError> {
        self.convert(ConversionRequest::new(Intent::AudioToVideo, audio).with_options(options))
            .await
    }

    /// Rotates or mirrors an image or video.
    pub async fn flip_or_rotate(
        &self,
        media: Vec<u8>,
        direction: Direction,
    ) -> Result<ConversionResult, ConvertError> {
        let options = ConversionOptions::default().with_direction(direction);
        self.convert(ConversionRequest::new(Intent::FlipOrRotate, media).with_options(options))
            .await
    }

    /// Re-encodes any audio-bearing input to stereo 44.1 kHz MP3.
    pub async fn normalize_audio(&self, media: Vec<u8>) -> Result<ConversionResult, ConvertError> {
        self.convert(ConversionRequest::new(Intent::NormalizeAudio, media))
            .await
    }

    /// Turns an image into a still sticker carrying pack attribution.
    pub async fn image_to_sticker(
        &self,
        image: Vec<u8>,
        pack: &str,
        author: &str,
    ) -> Result<ConversionResult, ConvertError> {
        let options = ConversionOptions::default().with_sticker_metadata(pack, author);
        self.convert(ConversionRequest::new(Intent::ImageToSticker, image).with_options(options))
            .await
    }

    /// Turns a video into an animated sticker.
    pub async fn video_to_sticker(&self, video: Vec<u8>) -> Result<ConversionResult, ConvertError> {
        self.convert(ConversionRequest::new(Intent::VideoToSticker, video))
            .await
    }

    /// Turns an image or video into a sticker, picking the pipeline by content.
    pub async fn to_sticker(
        &self,
        media: Vec<u8>,
        pack: &str,
        author: &str,
    ) -> Result<ConversionResult, ConvertError> {
        let options = ConversionOptions::default().with_sticker_metadata(pack, author);
        self.convert(ConversionRequest::new(Intent::DispatchSticker, media).with_options(options))
            .await
    }

    /// Re-encodes an image (typically WebP) as JPEG.
    pub async fn image_to_jpeg(&self, image: Vec<u8>) -> Result<ConversionResult, ConvertError> {
        self.convert(ConversionRequest::new(Intent::ImageToJpeg, image))
            .await
    }

    /// Removes the process-scoped scratch directory. Call once on shutdown.
    pub async fn shutdown(&self) {
        if let Err(e) = self.allocator.purge().await {
            metrics::SCRATCH_CLEANUP_FAILURES.inc();
            tracing::warn!(
                root = %self.allocator.root().display(),
                error = %e,
                "Failed to remove scratch root"
            );
        }
    }
}
