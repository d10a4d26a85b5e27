//! Encoder capability detection.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

use super::config::EngineConfig;
use super::types::Intent;

/// Encoders the conversion pipelines depend on, as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCapabilities {
    /// H.264 video (audio-to-video, container-preserving flips)
    pub libx264: bool,
    /// AAC audio track for generated video
    pub aac: bool,
    /// MP3 output
    pub libmp3lame: bool,
    /// WebP stickers, still and animated
    pub libwebp: bool,
    /// JPEG stills
    pub mjpeg: bool,
    /// PNG stills
    pub png: bool,
}

impl EngineCapabilities {
    /// Detects available encoders by asking the engine to list them.
    ///
    /// An engine that is missing or fails to answer reports nothing.
    pub async fn detect(config: &EngineConfig) -> Self {
        let output = Command::new(&config.ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => Self::parse(&String::from_utf8_lossy(&o.stdout)),
            Ok(o) => {
                tracing::warn!(status = %o.status, "Encoder listing failed");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not run engine to list encoders");
                Self::default()
            }
        }
    }

    /// Parses `-encoders` output. Each encoder line is a flag column
    /// followed by the encoder name.
    pub fn parse(listing: &str) -> Self {
        let mut caps = Self::default();
        for line in listing.lines() {
            let mut fields = line.split_whitespace();
            let (Some(flags), Some(name)) = (fields.next(), fields.next()) else {
                continue;
            };
            if flags.len() != 6 || name == "=" {
                continue;
            }
            match name {
                "libx264" => caps.libx264 = true,
                "aac" => caps.aac = true,
                "libmp3lame" => caps.libmp3lame = true,
                "libwebp" => caps.libwebp = true,
                "mjpeg" => caps.mjpeg = true,
                "png" => caps.png = true,
                _ => {}
            }
        }
        caps
    }

    /// Encoders an intent needs, by name.
    pub fn required_for(intent: Intent) -> &'static [&'static str] {
        match intent {
            Intent::AudioToVideo => &["libx264", "aac"],
            Intent::NormalizeAudio => &["libmp3lame"],
            Intent::ImageToSticker | Intent::VideoToSticker | Intent::DispatchSticker => {
                &["libwebp"]
            }
            Intent::ImageToJpeg => &["mjpeg"],
            // Output codec follows the input container.
            Intent::FlipOrRotate => &[],
        }
    }

    fn has(&self, encoder: &str) -> bool {
        match encoder {
            "libx264" => self.libx264,
            "aac" => self.aac,
            "libmp3lame" => self.libmp3lame,
            "libwebp" => self.libwebp,
            "mjpeg" => self.mjpeg,
            "png" => self.png,
            _ => false,
        }
    }

    /// Encoders `intent` needs that the engine lacks.
    pub fn missing_for(&self, intent: Intent) -> Vec<&'static str> {
        Self::required_for(intent)
            .iter()
            .copied()
            .filter(|encoder| !self.has(encoder))
            .collect()
    }

    pub fn supports(&self, intent: Intent) -> bool {
        self.missing_for(intent).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D mjpeg                MJPEG (Motion JPEG)
 V....D png                  PNG (Portable Network Graphics) image
 A....D aac                  AAC (Advanced Audio Coding)
 A....D libfdk_aac           Fraunhofer FDK AAC (codec aac)
";

    #[test]
    fn test_default_capabilities() {
        let caps = EngineCapabilities::default();
        assert!(!caps.libwebp);
        assert!(!caps.supports(Intent::ImageToSticker));
        assert!(caps.supports(Intent::FlipOrRotate));
    }

    #[test]
    fn test_parse_listing() {
        let caps = EngineCapabilities::parse(LISTING);
        assert!(caps.libx264);
        assert!(caps.aac);
        assert!(caps.mjpeg);
        assert!(caps.png);
        assert!(!caps.libmp3lame);
        assert!(!caps.libwebp);
    }

    #[test]
    fn test_missing_for_intent() {
        let caps = EngineCapabilities::parse(LISTING);
        assert!(caps.supports(Intent::AudioToVideo));
        assert_eq!(caps.missing_for(Intent::NormalizeAudio), vec!["libmp3lame"]);
        assert_eq!(caps.missing_for(Intent::DispatchSticker), vec!["libwebp"]);
    }

    #[test]
    fn test_legend_lines_ignored() {
        let caps = EngineCapabilities::parse(" V..... = Video\n A..... = aac\n");
        assert_eq!(caps, EngineCapabilities::default());
    }

    #[tokio::test]
    async fn test_detect_missing_engine_reports_nothing() {
        let config = EngineConfig::with_path("/nonexistent/ffmpeg-binary".into());
        let caps = EngineCapabilities::detect(&config).await;
        assert_eq!(caps, EngineCapabilities::default());
    }
}
