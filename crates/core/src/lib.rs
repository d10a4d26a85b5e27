pub mod config;
pub mod converter;
pub mod metrics;
pub mod scratch;
pub mod sticker;
pub mod testing;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, LoggingConfig,
};
pub use converter::{
    ConversionOptions, ConversionRequest, ConversionResult, ConvertError, ConverterConfig,
    Direction, EngineCapabilities, EngineRunner, FfmpegRunner, Intent, MediaCategory,
    MediaConverter, MediaKind,
};
pub use sticker::StickerMetadata;
