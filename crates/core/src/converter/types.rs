//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::ConvertError;

/// Coarse media classification derived from content signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    Image,
    Video,
    Audio,
}

impl MediaCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected kind of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaKind {
    pub category: MediaCategory,
    /// Canonical file extension, without the dot.
    pub extension: &'static str,
    pub mime_type: &'static str,
}

/// A byte buffer whose kind has been established by signature inspection.
///
/// Only [`FormatDetector`](super::FormatDetector) creates these, so the kind
/// always matches the bytes.
#[derive(Debug, Clone)]
pub struct MediaBuffer {
    bytes: Vec<u8>,
    kind: MediaKind,
}

impl MediaBuffer {
    pub(crate) fn new(bytes: Vec<u8>, kind: MediaKind) -> Self {
        Self { bytes, kind }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn category(&self) -> MediaCategory {
        self.kind.category
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Orientation change applied by `flipOrRotate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// 90° counter-clockwise.
    Left,
    /// 90° clockwise.
    Right,
    /// Mirror across the horizontal axis (upside down).
    Vertical,
    /// Mirror across the vertical axis.
    Horizontal,
}

impl Direction {
    /// Returns the ffmpeg video filter for this direction.
    pub fn ffmpeg_filter(&self) -> &'static str {
        match self {
            Self::Left => "transpose=2",
            Self::Right => "transpose=1",
            Self::Vertical => "vflip",
            Self::Horizontal => "hflip",
        }
    }
}

impl FromStr for Direction {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "vertical" => Ok(Self::Vertical),
            "horizontal" => Ok(Self::Horizontal),
            other => Err(ConvertError::invalid_argument(format!(
                "invalid direction '{}', use: left, right, vertical, or horizontal",
                other
            ))),
        }
    }
}

/// A supported conversion intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Intent {
    AudioToVideo,
    FlipOrRotate,
    NormalizeAudio,
    ImageToSticker,
    VideoToSticker,
    DispatchSticker,
    ImageToJpeg,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Self::AudioToVideo,
        Self::FlipOrRotate,
        Self::NormalizeAudio,
        Self::ImageToSticker,
        Self::VideoToSticker,
        Self::DispatchSticker,
        Self::ImageToJpeg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AudioToVideo => "audioToVideo",
            Self::FlipOrRotate => "flipOrRotate",
            Self::NormalizeAudio => "normalizeAudio",
            Self::ImageToSticker => "imageToSticker",
            Self::VideoToSticker => "videoToSticker",
            Self::DispatchSticker => "dispatchSticker",
            Self::ImageToJpeg => "imageToJpeg",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str().to_ascii_lowercase() == wanted)
            .ok_or_else(|| ConvertError::invalid_argument(format!("unknown intent '{}'", s)))
    }
}

/// Per-request options. Which fields matter depends on the intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Sticker pack name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack: Option<String>,
    /// Sticker author / publisher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Normalized option keys understood by [`ConversionOptions::from_map`].
const OPTION_KEYS: [&str; 7] = [
    "width",
    "height",
    "fps",
    "backgroundcolor",
    "direction",
    "pack",
    "author",
];

impl ConversionOptions {
    /// Builds options from a loosely typed string map, such as query parameters.
    ///
    /// Keys are matched case-insensitively, with `_` and `-` ignored. Unknown
    /// keys are skipped. Values that fail to parse are rejected, as are two
    /// keys naming the same option (`color` is an alias of `backgroundColor`).
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConvertError> {
        let mut options = Self::default();
        let mut seen: HashMap<String, &str> = HashMap::new();
        for (key, value) in map {
            let mut normalized: String = key
                .chars()
                .filter(|c| *c != '_' && *c != '-')
                .collect::<String>()
                .to_ascii_lowercase();
            if normalized == "color" {
                normalized = "backgroundcolor".to_string();
            }
            if !OPTION_KEYS.contains(&normalized.as_str()) {
                tracing::debug!(key = %key, "Ignoring unknown conversion option");
                continue;
            }
            if let Some(previous) = seen.insert(normalized.clone(), key) {
                return Err(ConvertError::invalid_argument(format!(
                    "options '{}' and '{}' set the same value",
                    previous, key
                )));
            }
            match normalized.as_str() {
                "width" => options.width = Some(parse_positive(key, value)?),
                "height" => options.height = Some(parse_positive(key, value)?),
                "fps" => options.fps = Some(parse_positive(key, value)?),
                "backgroundcolor" => options.background_color = Some(value.clone()),
                "direction" => options.direction = Some(value.parse()?),
                "pack" => options.pack = Some(value.clone()),
                "author" => options.author = Some(value.clone()),
                _ => {}
            }
        }
        Ok(options)
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_sticker_metadata(
        mut self,
        pack: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        self.pack = Some(pack.into());
        self.author = Some(author.into());
        self
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u32, ConvertError> {
    value.trim().parse::<u32>().map_err(|_| {
        ConvertError::invalid_argument(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))
    })
}

/// One conversion call: inputs, intent and options.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub id: Uuid,
    pub intent: Intent,
    pub inputs: Vec<Vec<u8>>,
    pub options: ConversionOptions,
}

impl ConversionRequest {
    /// Creates a single-input request with default options.
    pub fn new(intent: Intent, input: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            intent,
            inputs: vec![input],
            options: ConversionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<Vec<u8>>) -> Self {
        self.inputs = inputs;
        self
    }
}

/// Output of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub request_id: Uuid,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub extension: &'static str,
    /// Engine warnings, if any were printed.
    pub diagnostics: Option<String>,
    pub duration_ms: u64,
}

/// What the runner reports back after a successful engine run.
#[derive(Debug, Clone, Default)]
pub struct EngineReport {
    pub diagnostics: Option<String>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse() {
        assert_eq!("LEFT".parse::<Direction>().unwrap(), Direction::Left);
        assert_eq!(" horizontal ".parse::<Direction>().unwrap(), Direction::Horizontal);
        let err = "diagonal".parse::<Direction>().unwrap_err();
        assert!(matches!(err, ConvertError::InvalidArgument { .. }));
    }

    #[test]
    fn test_direction_filters() {
        assert_eq!(Direction::Left.ffmpeg_filter(), "transpose=2");
        assert_eq!(Direction::Right.ffmpeg_filter(), "transpose=1");
        assert_eq!(Direction::Vertical.ffmpeg_filter(), "vflip");
        assert_eq!(Direction::Horizontal.ffmpeg_filter(), "hflip");
    }

    #[test]
    fn test_intent_parse_variants() {
        assert_eq!("audioToVideo".parse::<Intent>().unwrap(), Intent::AudioToVideo);
        assert_eq!("image_to_sticker".parse::<Intent>().unwrap(), Intent::ImageToSticker);
        assert_eq!("dispatch-sticker".parse::<Intent>().unwrap(), Intent::DispatchSticker);
        assert!("toGif".parse::<Intent>().is_err());
        for intent in Intent::ALL {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
        }
    }

    #[test]
    fn test_options_from_map() {
        let map: HashMap<String, String> = [
            ("width", "640"),
            ("height", "480"),
            ("backgroundColor", "red"),
            ("direction", "right"),
            ("url", "https://example.com/a.mp3"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let options = ConversionOptions::from_map(&map).unwrap();
        assert_eq!(options.width, Some(640));
        assert_eq!(options.height, Some(480));
        assert_eq!(options.background_color.as_deref(), Some("red"));
        assert_eq!(options.direction, Some(Direction::Right));
        assert_eq!(options.fps, None);
    }

    #[test]
    fn test_options_from_map_rejects_garbage() {
        let map: HashMap<String, String> =
            [("fps".to_string(), "-3".to_string())].into_iter().collect();
        assert!(matches!(
            ConversionOptions::from_map(&map),
            Err(ConvertError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_options_from_map_rejects_colour_alias_clash() {
        let map: HashMap<String, String> = [("backgroundColor", "red"), ("color", "blue")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(matches!(
            ConversionOptions::from_map(&map),
            Err(ConvertError::InvalidArgument { .. })
        ));

        let map: HashMap<String, String> =
            [("color".to_string(), "blue".to_string())].into_iter().collect();
        let options = ConversionOptions::from_map(&map).unwrap();
        assert_eq!(options.background_color.as_deref(), Some("blue"));
    }

    #[test]
    fn test_intent_serde_name() {
        let json = serde_json::to_string(&Intent::NormalizeAudio).unwrap();
        assert_eq!(json, "\"normalizeAudio\"");
    }
}
