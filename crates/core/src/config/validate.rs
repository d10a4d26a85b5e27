use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Engine path is set and the timeout is positive
/// - At least one engine process may run
/// - Input size limit is positive
/// - Sticker canvas, quality, duration and frame rate are in range
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let converter = &config.converter;

    if converter.engine.ffmpeg_path.as_os_str().is_empty() {
        return Err(invalid("engine.ffmpeg_path cannot be empty"));
    }
    if converter.engine.timeout_secs == 0 {
        return Err(invalid("engine.timeout_secs cannot be 0"));
    }

    if converter.limits.max_concurrent_processes == 0 {
        return Err(invalid("limits.max_concurrent_processes cannot be 0"));
    }
    if converter.limits.max_input_bytes == 0 {
        return Err(invalid("limits.max_input_bytes cannot be 0"));
    }

    let sticker = &converter.sticker;
    if sticker.size == 0 || sticker.size > 2048 {
        return Err(invalid("sticker.size must be between 1 and 2048"));
    }
    if sticker.quality > 100 {
        return Err(invalid("sticker.quality must be between 0 and 100"));
    }
    if sticker.max_duration_secs == 0 {
        return Err(invalid("sticker.max_duration_secs cannot be 0"));
    }
    if sticker.fps == 0 || sticker.fps > 60 {
        return Err(invalid("sticker.fps must be between 1 and 60"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = Config::default();
        config.converter.limits.max_concurrent_processes = 0;
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let mut config = Config::default();
        config.converter.engine.timeout_secs = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_sticker_ranges() {
        let mut config = Config::default();
        config.converter.sticker.quality = 101;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.converter.sticker.size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.converter.sticker.fps = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_queue_is_allowed() {
        let mut config = Config::default();
        config.converter.limits.max_queue_depth = 0;
        assert!(validate_config(&config).is_ok());
    }
}
