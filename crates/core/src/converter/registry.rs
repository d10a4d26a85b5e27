//! Intent to engine invocation mapping.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::config::StickerConfig;
use super::error::ConvertError;
use super::types::{ConversionOptions, Direction, Intent, MediaCategory, MediaKind};
use crate::sticker::StickerMetadata;

/// Largest accepted width or height for synthetic video.
pub const MAX_DIMENSION: u32 = 8192;
/// Largest accepted frame rate for synthetic video.
pub const MAX_FPS: u32 = 120;
/// Longest accepted sticker pack or author label.
pub const MAX_LABEL_CHARS: usize = 128;

const DEFAULT_WIDTH: u32 = 1920;
const DEFAULT_HEIGHT: u32 = 1080;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_BACKGROUND: &str = "black";

/// Colour names or hex values only. Anything else could smuggle filter-graph
/// syntax (`:`, `,`, `;`) into the lavfi source.
static COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:#|0x)?[0-9a-fA-F]{6}(?:[0-9a-fA-F]{2})?|[A-Za-z]{3,32})$").unwrap()
});

/// One engine input, in argument order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineInput {
    /// Fed from the request buffer at `index`, written to a scratch file.
    Buffer { index: usize, args: Vec<String> },
    /// A source the engine generates itself (e.g. a lavfi colour source).
    Synthetic { args: Vec<String>, source: String },
}

/// Concrete engine invocation for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub intent: Intent,
    pub inputs: Vec<EngineInput>,
    /// Output options and filter graph, placed before the output path.
    pub output_args: Vec<String>,
    pub output_extension: &'static str,
    pub mime_type: &'static str,
    /// Metadata embedded into the output after the engine finishes.
    pub sticker_metadata: Option<StickerMetadata>,
}

impl PipelineSpec {
    /// Number of request buffers this pipeline consumes.
    pub fn required_inputs(&self) -> usize {
        self.inputs
            .iter()
            .filter(|input| matches!(input, EngineInput::Buffer { .. }))
            .count()
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn buffer_input(index: usize) -> EngineInput {
    EngineInput::Buffer {
        index,
        args: Vec::new(),
    }
}

/// Resolves intents into [`PipelineSpec`]s.
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    sticker: StickerConfig,
}

impl PipelineRegistry {
    pub fn new(sticker: StickerConfig) -> Self {
        Self { sticker }
    }

    /// Number of buffers a request for `intent` must carry.
    pub fn input_count(&self, _intent: Intent) -> usize {
        1
    }

    /// Checks options for `intent` without looking at any input.
    ///
    /// Runs before detection, file I/O or process spawn.
    pub fn validate_options(
        &self,
        intent: Intent,
        options: &ConversionOptions,
    ) -> Result<(), ConvertError> {
        match intent {
            Intent::AudioToVideo => {
                let (width, height, fps, _) = video_canvas(options)?;
                check_range("width", width, MAX_DIMENSION)?;
                check_range("height", height, MAX_DIMENSION)?;
                check_range("fps", fps, MAX_FPS)?;
                if width % 2 != 0 || height % 2 != 0 {
                    return Err(ConvertError::invalid_argument(format!(
                        "width and height must be even, got {}x{}",
                        width, height
                    )));
                }
                Ok(())
            }
            Intent::ImageToSticker | Intent::VideoToSticker | Intent::DispatchSticker => {
                check_label("pack", options.pack.as_deref())?;
                check_label("author", options.author.as_deref())
            }
            Intent::FlipOrRotate | Intent::NormalizeAudio | Intent::ImageToJpeg => Ok(()),
        }
    }

    /// Resolves `intent` for inputs of the given kinds.
    pub fn resolve(
        &self,
        intent: Intent,
        inputs: &[MediaKind],
        options: &ConversionOptions,
    ) -> Result<PipelineSpec, ConvertError> {
        self.validate_options(intent, options)?;

        let expected = self.input_count(intent);
        if inputs.len() != expected {
            return Err(ConvertError::invalid_argument(format!(
                "{} takes {} input(s), got {}",
                intent,
                expected,
                inputs.len()
            )));
        }
        let source = inputs[0];

        let spec = match intent {
            Intent::AudioToVideo => {
                require(intent, source, &[MediaCategory::Audio])?;
                self.audio_to_video(options)?
            }
            Intent::FlipOrRotate => {
                require(intent, source, &[MediaCategory::Image, MediaCategory::Video])?;
                self.flip_or_rotate(source, options.direction.unwrap_or(Direction::Horizontal))
            }
            Intent::NormalizeAudio => {
                require(intent, source, &[MediaCategory::Audio, MediaCategory::Video])?;
                self.normalize_audio()
            }
            Intent::ImageToSticker => {
                require(intent, source, &[MediaCategory::Image])?;
                self.image_to_sticker(options)
            }
            Intent::VideoToSticker => {
                require(intent, source, &[MediaCategory::Video])?;
                self.video_to_sticker(options)
            }
            Intent::DispatchSticker => match source.category {
                MediaCategory::Image => self.image_to_sticker(options),
                MediaCategory::Video => self.video_to_sticker(options),
                MediaCategory::Audio => {
                    return Err(ConvertError::unsupported_media_type(
                        intent.as_str(),
                        source.category.as_str(),
                    ))
                }
            },
            Intent::ImageToJpeg => {
                require(intent, source, &[MediaCategory::Image])?;
                self.image_to_jpeg()
            }
        };

        tracing::debug!(
            intent = %intent,
            resolved = %spec.intent,
            output = spec.output_extension,
            "Resolved pipeline"
        );
        Ok(spec)
    }

    fn audio_to_video(&self, options: &ConversionOptions) -> Result<PipelineSpec, ConvertError> {
        let (width, height, fps, color) = video_canvas(options)?;
        Ok(PipelineSpec {
            intent: Intent::AudioToVideo,
            inputs: vec![
                EngineInput::Synthetic {
                    args: args(&["-f", "lavfi"]),
                    source: format!("color=c={}:s={}x{}:r={}", color, width, height, fps),
                },
                buffer_input(0),
            ],
            output_args: args(&[
                "-map", "0:v", "-map", "1:a",
                "-c:v", "libx264", "-preset", "ultrafast", "-crf", "23", "-pix_fmt", "yuv420p",
                "-c:a", "aac", "-b:a", "128k",
                "-shortest", "-movflags", "+faststart",
            ]),
            output_extension: "mp4",
            mime_type: "video/mp4",
            sticker_metadata: None,
        })
    }

    fn flip_or_rotate(&self, source: MediaKind, direction: Direction) -> PipelineSpec {
        let filter = direction.ffmpeg_filter();
        let output_args = match source.category {
            // GIF is classified as an image but may be animated; keep every frame.
            MediaCategory::Image if source.extension != "gif" => {
                args(&["-vf", filter, "-frames:v", "1", "-update", "1", "-q:v", "2"])
            }
            _ => args(&["-vf", filter, "-c:a", "copy"]),
        };
        PipelineSpec {
            intent: Intent::FlipOrRotate,
            inputs: vec![buffer_input(0)],
            output_args,
            output_extension: source.extension,
            mime_type: source.mime_type,
            sticker_metadata: None,
        }
    }

    fn normalize_audio(&self) -> PipelineSpec {
        PipelineSpec {
            intent: Intent::NormalizeAudio,
            inputs: vec![buffer_input(0)],
            output_args: args(&[
                "-vn", "-c:a", "libmp3lame", "-ac", "2", "-ar", "44100", "-b:a", "192k", "-f", "mp3",
            ]),
            output_extension: "mp3",
            mime_type: "audio/mpeg",
            sticker_metadata: None,
        }
    }

    /// Scale into the square canvas keeping aspect ratio, pad with transparency.
    fn sticker_canvas_filter(&self) -> String {
        let size = self.sticker.size;
        format!(
            "scale={s}:{s}:force_original_aspect_ratio=decrease,format=rgba,\
             pad={s}:{s}:(ow-iw)/2:(oh-ih)/2:color=black@0",
            s = size
        )
    }

    fn image_to_sticker(&self, options: &ConversionOptions) -> PipelineSpec {
        let quality = self.sticker.quality.min(100).to_string();
        let mut output_args = vec!["-vf".to_string(), self.sticker_canvas_filter()];
        output_args.extend(args(&["-frames:v", "1", "-c:v", "libwebp", "-lossless", "0"]));
        output_args.extend(["-quality".to_string(), quality]);
        output_args.extend(args(&["-f", "webp"]));

        PipelineSpec {
            intent: Intent::ImageToSticker,
            inputs: vec![buffer_input(0)],
            output_args,
            output_extension: "webp",
            mime_type: "image/webp",
            sticker_metadata: Some(StickerMetadata::new(
                options.pack.clone().unwrap_or_default(),
                options.author.clone().unwrap_or_default(),
            )),
        }
    }

    fn video_to_sticker(&self, options: &ConversionOptions) -> PipelineSpec {
        let filter = format!("fps={},{}", self.sticker.fps, self.sticker_canvas_filter());
        let mut output_args = vec![
            "-t".to_string(),
            self.sticker.max_duration_secs.to_string(),
            "-vf".to_string(),
            filter,
        ];
        output_args.extend(args(&[
            "-an", "-c:v", "libwebp", "-loop", "0", "-pix_fmt", "yuva420p", "-f", "webp",
        ]));

        let sticker_metadata = match (&options.pack, &options.author) {
            (None, None) => None,
            (pack, author) => Some(StickerMetadata::new(
                pack.clone().unwrap_or_default(),
                author.clone().unwrap_or_default(),
            )),
        };

        PipelineSpec {
            intent: Intent::VideoToSticker,
            inputs: vec![buffer_input(0)],
            output_args,
            output_extension: "webp",
            mime_type: "image/webp",
            sticker_metadata,
        }
    }

    fn image_to_jpeg(&self) -> PipelineSpec {
        PipelineSpec {
            intent: Intent::ImageToJpeg,
            inputs: vec![buffer_input(0)],
            output_args: args(&["-frames:v", "1", "-update", "1", "-c:v", "mjpeg", "-q:v", "2"]),
            output_extension: "jpg",
            mime_type: "image/jpeg",
            sticker_metadata: None,
        }
    }
}

fn require(
    intent: Intent,
    source: MediaKind,
    accepted: &[MediaCategory],
) -> Result<(), ConvertError> {
    if accepted.contains(&source.category) {
        Ok(())
    } else {
        Err(ConvertError::unsupported_media_type(
            intent.as_str(),
            source.category.as_str(),
        ))
    }
}

fn video_canvas(options: &ConversionOptions) -> Result<(u32, u32, u32, String), ConvertError> {
    let color = options
        .background_color
        .as_deref()
        .unwrap_or(DEFAULT_BACKGROUND)
        .trim();
    if !COLOR_RE.is_match(color) {
        return Err(ConvertError::invalid_argument(format!(
            "backgroundColor must be a colour name or hex value, got '{}'",
            color
        )));
    }
    Ok((
        options.width.unwrap_or(DEFAULT_WIDTH),
        options.height.unwrap_or(DEFAULT_HEIGHT),
        options.fps.unwrap_or(DEFAULT_FPS),
        color.to_string(),
    ))
}

fn check_range(name: &str, value: u32, max: u32) -> Result<(), ConvertError> {
    if value == 0 || value > max {
        return Err(ConvertError::invalid_argument(format!(
            "{} must be between 1 and {}, got {}",
            name, max, value
        )));
    }
    Ok(())
}

fn check_label(name: &str, value: Option<&str>) -> Result<(), ConvertError> {
    match value {
        Some(v) if v.chars().count() > MAX_LABEL_CHARS => Err(ConvertError::invalid_argument(
            format!("{} is longer than {} characters", name, MAX_LABEL_CHARS),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(category: MediaCategory, extension: &'static str, mime: &'static str) -> MediaKind {
        MediaKind {
            category,
            extension,
            mime_type: mime,
        }
    }

    fn png() -> MediaKind {
        kind(MediaCategory::Image, "png", "image/png")
    }

    fn mp4() -> MediaKind {
        kind(MediaCategory::Video, "mp4", "video/mp4")
    }

    fn mp3() -> MediaKind {
        kind(MediaCategory::Audio, "mp3", "audio/mpeg")
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_audio_to_video_defaults() {
        let registry = PipelineRegistry::default();
        let spec = registry
            .resolve(Intent::AudioToVideo, &[mp3()], &ConversionOptions::default())
            .unwrap();

        assert_eq!(spec.required_inputs(), 1);
        assert_eq!(
            spec.inputs[0],
            EngineInput::Synthetic {
                args: vec!["-f".to_string(), "lavfi".to_string()],
                source: "color=c=black:s=1920x1080:r=30".to_string(),
            }
        );
        assert!(spec.output_args.contains(&"-shortest".to_string()));
        assert!(has_pair(&spec.output_args, "-map", "1:a"));
        assert_eq!(spec.mime_type, "video/mp4");
    }

    #[test]
    fn test_audio_to_video_custom_canvas() {
        let options = ConversionOptions {
            width: Some(640),
            height: Some(480),
            fps: Some(24),
            background_color: Some("#112233".to_string()),
            ..Default::default()
        };
        let spec = PipelineRegistry::default()
            .resolve(Intent::AudioToVideo, &[mp3()], &options)
            .unwrap();
        match &spec.inputs[0] {
            EngineInput::Synthetic { source, .. } => {
                assert_eq!(source, "color=c=#112233:s=640x480:r=24")
            }
            other => panic!("unexpected input {:?}", other),
        }
    }

    #[test]
    fn test_audio_to_video_rejects_bad_options() {
        let registry = PipelineRegistry::default();
        let cases = [
            ConversionOptions { width: Some(0), ..Default::default() },
            ConversionOptions { height: Some(MAX_DIMENSION + 2), ..Default::default() },
            ConversionOptions { fps: Some(500), ..Default::default() },
            ConversionOptions { width: Some(641), ..Default::default() },
            ConversionOptions {
                background_color: Some("red:s=2x2,nullsink".to_string()),
                ..Default::default()
            },
        ];
        for options in cases {
            let err = registry
                .resolve(Intent::AudioToVideo, &[mp3()], &options)
                .unwrap_err();
            assert!(
                matches!(err, ConvertError::InvalidArgument { .. }),
                "{:?} -> {:?}",
                options,
                err
            );
        }
    }

    #[test]
    fn test_audio_to_video_needs_audio() {
        let err = PipelineRegistry::default()
            .resolve(Intent::AudioToVideo, &[png()], &ConversionOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_flip_or_rotate_filters() {
        let registry = PipelineRegistry::default();
        for (direction, filter) in [
            (Direction::Left, "transpose=2"),
            (Direction::Right, "transpose=1"),
            (Direction::Vertical, "vflip"),
            (Direction::Horizontal, "hflip"),
        ] {
            let options = ConversionOptions::default().with_direction(direction);
            let spec = registry
                .resolve(Intent::FlipOrRotate, &[png()], &options)
                .unwrap();
            assert!(has_pair(&spec.output_args, "-vf", filter));
            assert_eq!(spec.output_extension, "png");
            assert_eq!(spec.mime_type, "image/png");
        }
    }

    #[test]
    fn test_flip_or_rotate_video_keeps_audio() {
        let spec = PipelineRegistry::default()
            .resolve(
                Intent::FlipOrRotate,
                &[mp4()],
                &ConversionOptions::default().with_direction(Direction::Right),
            )
            .unwrap();
        assert!(has_pair(&spec.output_args, "-c:a", "copy"));
        assert!(!spec.output_args.contains(&"-frames:v".to_string()));
        assert_eq!(spec.output_extension, "mp4");
    }

    #[test]
    fn test_flip_or_rotate_rejects_audio() {
        let err = PipelineRegistry::default()
            .resolve(Intent::FlipOrRotate, &[mp3()], &ConversionOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_normalize_audio_args() {
        let registry = PipelineRegistry::default();
        let spec = registry
            .resolve(Intent::NormalizeAudio, &[mp4()], &ConversionOptions::default())
            .unwrap();
        assert!(has_pair(&spec.output_args, "-ac", "2"));
        assert!(has_pair(&spec.output_args, "-ar", "44100"));
        assert!(has_pair(&spec.output_args, "-b:a", "192k"));
        assert_eq!(spec.output_extension, "mp3");

        assert!(registry
            .resolve(Intent::NormalizeAudio, &[png()], &ConversionOptions::default())
            .is_err());
    }

    #[test]
    fn test_image_sticker_spec() {
        let options = ConversionOptions::default().with_sticker_metadata("pack", "me");
        let spec = PipelineRegistry::default()
            .resolve(Intent::ImageToSticker, &[png()], &options)
            .unwrap();
        let filter = spec.output_args[1].as_str();
        assert!(filter.starts_with("scale=512:512:force_original_aspect_ratio=decrease"));
        assert!(filter.ends_with("pad=512:512:(ow-iw)/2:(oh-ih)/2:color=black@0"));
        assert!(has_pair(&spec.output_args, "-quality", "80"));
        let meta = spec.sticker_metadata.unwrap();
        assert_eq!(meta.pack, "pack");
        assert_eq!(meta.author, "me");
    }

    #[test]
    fn test_video_sticker_spec() {
        let spec = PipelineRegistry::default()
            .resolve(Intent::VideoToSticker, &[mp4()], &ConversionOptions::default())
            .unwrap();
        assert!(has_pair(&spec.output_args, "-t", "8"));
        assert!(has_pair(&spec.output_args, "-loop", "0"));
        assert!(has_pair(&spec.output_args, "-pix_fmt", "yuva420p"));
        assert!(spec.output_args[3].starts_with("fps=15,scale=512:512"));
        assert!(spec.sticker_metadata.is_none());
    }

    #[test]
    fn test_dispatch_sticker_routes_by_category() {
        let registry = PipelineRegistry::default();
        let options = ConversionOptions::default().with_sticker_metadata("p", "a");

        let image = registry
            .resolve(Intent::DispatchSticker, &[png()], &options)
            .unwrap();
        assert_eq!(image.intent, Intent::ImageToSticker);

        let video = registry
            .resolve(Intent::DispatchSticker, &[mp4()], &options)
            .unwrap();
        assert_eq!(video.intent, Intent::VideoToSticker);
        assert!(video.sticker_metadata.is_some());

        let err = registry
            .resolve(Intent::DispatchSticker, &[mp3()], &options)
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::UnsupportedMediaType { ref intent, .. } if intent == "dispatchSticker"
        ));
    }

    #[test]
    fn test_sticker_label_limit() {
        let options = ConversionOptions {
            pack: Some("x".repeat(MAX_LABEL_CHARS + 1)),
            ..Default::default()
        };
        let err = PipelineRegistry::default()
            .resolve(Intent::ImageToSticker, &[png()], &options)
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidArgument { .. }));
    }

    #[test]
    fn test_custom_sticker_config() {
        let registry = PipelineRegistry::new(StickerConfig {
            size: 256,
            quality: 60,
            max_duration_secs: 5,
            fps: 10,
        });
        let spec = registry
            .resolve(Intent::VideoToSticker, &[mp4()], &ConversionOptions::default())
            .unwrap();
        assert!(has_pair(&spec.output_args, "-t", "5"));
        assert!(spec.output_args[3].starts_with("fps=10,scale=256:256"));
    }

    #[test]
    fn test_wrong_input_count() {
        let err = PipelineRegistry::default()
            .resolve(Intent::NormalizeAudio, &[mp3(), mp3()], &ConversionOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidArgument { .. }));
    }

    #[test]
    fn test_image_to_jpeg() {
        let webp = kind(MediaCategory::Image, "webp", "image/webp");
        let spec = PipelineRegistry::default()
            .resolve(Intent::ImageToJpeg, &[webp], &ConversionOptions::default())
            .unwrap();
        assert_eq!(spec.output_extension, "jpg");
        assert_eq!(spec.mime_type, "image/jpeg");
    }
}
