//! FFmpeg-based engine runner.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::config::EngineConfig;
use super::error::ConvertError;
use super::registry::{EngineInput, PipelineSpec};
use super::traits::EngineRunner;
use super::types::EngineReport;
use crate::metrics;

/// FFmpeg-based runner implementation.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    config: EngineConfig,
}

/// How a run ended before the result is interpreted.
enum Outcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Keeps the running-process gauge in step with the child's lifetime.
struct RunningGuard;

impl RunningGuard {
    fn new() -> Self {
        metrics::ENGINE_PROCESSES_RUNNING.inc();
        Self
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        metrics::ENGINE_PROCESSES_RUNNING.dec();
    }
}

impl FfmpegRunner {
    /// Creates a new runner with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Creates a runner with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds the full ffmpeg argument list for one run.
    pub fn build_args(
        &self,
        spec: &PipelineSpec,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<Vec<String>, ConvertError> {
        if inputs.len() != spec.required_inputs() {
            return Err(ConvertError::invalid_argument(format!(
                "{} needs {} input file(s), got {}",
                spec.intent,
                spec.required_inputs(),
                inputs.len()
            )));
        }

        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(), // Overwrite output
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
        ];

        for input in &spec.inputs {
            match input {
                EngineInput::Buffer { index, args: input_args } => {
                    let path = inputs.get(*index).ok_or_else(|| {
                        ConvertError::invalid_argument(format!("missing input #{}", index))
                    })?;
                    args.extend(input_args.iter().cloned());
                    args.push("-i".to_string());
                    args.push(path.to_string_lossy().to_string());
                }
                EngineInput::Synthetic {
                    args: input_args,
                    source,
                } => {
                    args.extend(input_args.iter().cloned());
                    args.push("-i".to_string());
                    args.push(source.clone());
                }
            }
        }

        args.extend(spec.output_args.iter().cloned());

        // Extra args
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());

        // Output
        args.push(output.to_string_lossy().to_string());

        Ok(args)
    }

    fn spawn(&self, args: &[String]) -> Result<Child, ConvertError> {
        Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.map_spawn_error(e))
    }

    fn map_spawn_error(&self, e: std::io::Error) -> ConvertError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConvertError::EngineNotFound {
                path: self.config.ffmpeg_path.clone(),
            }
        } else {
            ConvertError::Io(e)
        }
    }

    /// Asks the child to stop, then kills it once the grace period runs out.
    ///
    /// Always leaves the child reaped.
    async fn terminate(&self, child: &mut Child, reason: &'static str) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // SAFETY: `pid` is our own child and has not been reaped yet, so
                // it cannot refer to an unrelated process.
                let sent = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == 0;
                if sent {
                    match tokio::time::timeout(self.config.kill_grace(), child.wait()).await {
                        Ok(_) => {
                            metrics::ENGINE_TERMINATIONS
                                .with_label_values(&[reason, "term"])
                                .inc();
                            tracing::warn!(pid, reason, "Engine terminated");
                            return;
                        }
                        Err(_) => {
                            tracing::debug!(
                                pid,
                                grace_ms = self.config.kill_grace_ms,
                                "Engine ignored SIGTERM, killing"
                            );
                        }
                    }
                }
            }
        }

        metrics::ENGINE_TERMINATIONS
            .with_label_values(&[reason, "kill"])
            .inc();
        if let Err(e) = child.kill().await {
            tracing::warn!(error = %e, reason, "Failed to kill engine");
        } else {
            tracing::warn!(reason, "Engine killed");
        }
    }
}

/// Drains `reader`, keeping only the last `limit` bytes.
async fn collect_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}

fn describe_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("engine exited with code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("engine killed by signal {}", signal);
        }
    }
    "engine terminated abnormally".to_string()
}

#[async_trait]
impl EngineRunner for FfmpegRunner {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn run(
        &self,
        spec: &PipelineSpec,
        inputs: &[PathBuf],
        output: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<EngineReport, ConvertError> {
        let args = self.build_args(spec, inputs, output)?;
        tracing::debug!(intent = %spec.intent, ?args, "Starting engine");

        let start = Instant::now();
        let mut child = self.spawn(&args)?;
        let _running = RunningGuard::new();

        let stderr = child.stderr.take().ok_or_else(|| {
            ConvertError::Io(std::io::Error::other("engine stderr was not captured"))
        })?;
        let stderr_task = tokio::spawn(collect_tail(stderr, self.config.stderr_excerpt_bytes));

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status?),
            _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        let status = match outcome {
            Outcome::Exited(status) => status,
            Outcome::TimedOut => {
                self.terminate(&mut child, "timeout").await;
                stderr_task.abort();
                return Err(ConvertError::Timeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
            Outcome::Cancelled => {
                self.terminate(&mut child, "cancelled").await;
                stderr_task.abort();
                return Err(ConvertError::Cancelled);
            }
        };

        // A grandchild may still hold the pipe open; don't wait on it forever.
        let excerpt = match tokio::time::timeout(self.config.kill_grace(), stderr_task).await {
            Ok(Ok(text)) => text,
            _ => String::new(),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        if !status.success() {
            tracing::debug!(intent = %spec.intent, %status, "Engine failed");
            return Err(ConvertError::transcode(
                describe_status(&status),
                (!excerpt.is_empty()).then_some(excerpt),
            ));
        }

        tracing::debug!(intent = %spec.intent, duration_ms, "Engine finished");
        Ok(EngineReport {
            diagnostics: (!excerpt.is_empty()).then_some(excerpt),
            duration_ms,
        })
    }

    async fn validate(&self) -> Result<(), ConvertError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.map_spawn_error(e))?;

        if !output.status.success() {
            return Err(ConvertError::transcode(
                format!("`-version` failed: {}", describe_status(&output.status)),
                Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
            ));
        }
        Ok(())
    }
}
