//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`MediaConverter`](super::MediaConverter).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Engine binary and invocation settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Concurrency and input limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Scratch directory settings.
    #[serde(default)]
    pub scratch: ScratchConfig,
    /// Sticker pipeline parameters.
    #[serde(default)]
    pub sticker: StickerConfig,
}

/// Configuration for the external transcoding engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Timeout for a single engine run in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// How long a terminated engine gets to exit before it is killed.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Maximum number of stderr bytes kept for diagnostics.
    #[serde(default = "default_stderr_excerpt")]
    pub stderr_excerpt_bytes: usize,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Additional ffmpeg arguments, placed right before the output path.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_timeout() -> u64 {
    60
}

fn default_kill_grace_ms() -> u64 {
    2000
}

fn default_stderr_excerpt() -> usize {
    4096
}

fn default_log_level() -> String {
    "warning".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            timeout_secs: default_timeout(),
            kill_grace_ms: default_kill_grace_ms(),
            stderr_excerpt_bytes: default_stderr_excerpt(),
            ffmpeg_log_level: default_log_level(),
            extra_ffmpeg_args: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Creates a config pointing at a specific ffmpeg binary.
    pub fn with_path(ffmpeg_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ..Default::default()
        }
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the kill grace period in milliseconds.
    pub fn with_kill_grace(mut self, kill_grace_ms: u64) -> Self {
        self.kill_grace_ms = kill_grace_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Concurrency and input size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum engine processes running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_processes: usize,

    /// Maximum requests waiting for a free slot before new ones are rejected.
    #[serde(default = "default_max_queue")]
    pub max_queue_depth: usize,

    /// Largest accepted input buffer in bytes.
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_queue() -> usize {
    32
}

fn default_max_input_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_processes: default_max_concurrent(),
            max_queue_depth: default_max_queue(),
            max_input_bytes: default_max_input_bytes(),
        }
    }
}

/// Scratch directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchConfig {
    /// Root under which the process-scoped scratch directory is created.
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
}

fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("mediaconv")
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
        }
    }
}

/// Sticker pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickerConfig {
    /// Square canvas edge in pixels.
    #[serde(default = "default_sticker_size")]
    pub size: u32,

    /// WebP quality for still stickers (0-100).
    #[serde(default = "default_sticker_quality")]
    pub quality: u8,

    /// Maximum animated sticker duration in seconds.
    #[serde(default = "default_sticker_max_secs")]
    pub max_duration_secs: u32,

    /// Animated sticker frame rate.
    #[serde(default = "default_sticker_fps")]
    pub fps: u32,
}

fn default_sticker_size() -> u32 {
    512
}

fn default_sticker_quality() -> u8 {
    80
}

fn default_sticker_max_secs() -> u32 {
    8
}

fn default_sticker_fps() -> u32 {
    15
}

impl Default for StickerConfig {
    fn default() -> Self {
        Self {
            size: default_sticker_size(),
            quality: default_sticker_quality(),
            max_duration_secs: default_sticker_max_secs(),
            fps: default_sticker_fps(),
        }
    }
}

impl ConverterConfig {
    /// Sets the scratch root directory.
    pub fn with_temp_root(mut self, temp_root: PathBuf) -> Self {
        self.scratch.temp_root = temp_root;
        self
    }

    /// Sets the concurrency cap and queue depth.
    pub fn with_limits(mut self, max_concurrent: usize, max_queue: usize) -> Self {
        self.limits.max_concurrent_processes = max_concurrent;
        self.limits.max_queue_depth = max_queue;
        self
    }

    /// Replaces the engine section.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.engine.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.engine.timeout_secs, 60);
        assert_eq!(config.limits.max_concurrent_processes, 4);
        assert_eq!(config.limits.max_queue_depth, 32);
        assert_eq!(config.sticker.size, 512);
        assert_eq!(config.sticker.fps, 15);
        assert_eq!(config.sticker.max_duration_secs, 8);
    }

    #[test]
    fn test_config_builder() {
        let config = ConverterConfig::default()
            .with_engine(
                EngineConfig::with_path(PathBuf::from("/usr/local/bin/ffmpeg"))
                    .with_timeout(120)
                    .with_kill_grace(500),
            )
            .with_temp_root(PathBuf::from("/tmp/test"))
            .with_limits(8, 2);

        assert_eq!(
            config.engine.ffmpeg_path,
            PathBuf::from("/usr/local/bin/ffmpeg")
        );
        assert_eq!(config.engine.timeout(), Duration::from_secs(120));
        assert_eq!(config.engine.kill_grace(), Duration::from_millis(500));
        assert_eq!(config.scratch.temp_root, PathBuf::from("/tmp/test"));
        assert_eq!(config.limits.max_concurrent_processes, 8);
        assert_eq!(config.limits.max_queue_depth, 2);
    }

    #[test]
    fn test_config_serialization() {
        let config = ConverterConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ConverterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.limits.max_concurrent_processes,
            config.limits.max_concurrent_processes
        );
        assert_eq!(parsed.sticker.quality, 80);
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let parsed: ConverterConfig =
            serde_json::from_str(r#"{"engine": {"timeout_secs": 5}}"#).unwrap();
        assert_eq!(parsed.engine.timeout_secs, 5);
        assert_eq!(parsed.engine.ffmpeg_log_level, "warning");
        assert_eq!(parsed.limits.max_queue_depth, 32);
    }
}
