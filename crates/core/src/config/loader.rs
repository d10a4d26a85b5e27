use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment prefix for overrides. Nested keys use a double underscore,
/// e.g. `MEDIACONV_LIMITS__MAX_CONCURRENT_PROCESSES=8`.
pub const ENV_PREFIX: &str = "MEDIACONV_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from environment variables alone, on top of defaults
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[engine]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
timeout_secs = 30

[limits]
max_concurrent_processes = 2
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(
            config.converter.engine.ffmpeg_path,
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
        assert_eq!(config.converter.engine.timeout_secs, 30);
        assert_eq!(config.converter.limits.max_concurrent_processes, 2);
        assert_eq!(config.converter.limits.max_queue_depth, 32);
        assert_eq!(config.converter.sticker.size, 512);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.converter.engine.timeout_secs, 60);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[limits]
max_concurrent_processes = "many"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[scratch]
temp_root = "/var/tmp/mediaconv-test"

[sticker]
quality = 60

[logging]
filter = "mediaconv_core=debug"
json = true
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(
            config.converter.scratch.temp_root,
            PathBuf::from("/var/tmp/mediaconv-test")
        );
        assert_eq!(config.converter.sticker.quality, 60);
        assert_eq!(config.logging.filter, "mediaconv_core=debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "mediaconv.toml",
                r#"
[engine]
timeout_secs = 30
"#,
            )?;
            jail.set_env("MEDIACONV_ENGINE__TIMEOUT_SECS", "5");
            jail.set_env("MEDIACONV_LIMITS__MAX_QUEUE_DEPTH", "3");

            let config = load_config(Path::new("mediaconv.toml")).unwrap();
            assert_eq!(config.converter.engine.timeout_secs, 5);
            assert_eq!(config.converter.limits.max_queue_depth, 3);
            Ok(())
        });
    }
}
