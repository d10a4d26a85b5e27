use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediaconv_core::{
    load_config, load_config_from_env, metrics, validate_config, Config, ConversionOptions,
    ConversionRequest, EngineCapabilities, EngineRunner, Intent, LoggingConfig, MediaConverter,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming the config file when `--config` is absent.
const CONFIG_ENV: &str = "MEDIACONV_CONFIG";

#[derive(Debug, Parser)]
#[command(name = "mediaconv", version, about = "Convert media buffers with ffmpeg")]
struct Cli {
    /// TOML config file. Falls back to $MEDIACONV_CONFIG, then to defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr before exiting.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert one file.
    Convert {
        /// audioToVideo, flipOrRotate, normalizeAudio, imageToSticker,
        /// videoToSticker, dispatchSticker or imageToJpeg
        intent: String,
        input: PathBuf,
        /// Output path. Defaults to the input name with the output extension.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Conversion option as key=value (width, height, fps, color,
        /// direction, pack, author). Repeatable.
        #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
        options: Vec<String>,
    },
    /// Print what a file was detected as.
    Detect { input: PathBuf },
    /// Check the engine binary and which intents it can serve.
    Check,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;
    init_logging(&config.logging);
    info!(version = VERSION, "mediaconv starting");

    let result = match cli.command {
        Command::Convert {
            intent,
            input,
            output,
            options,
        } => convert(config, &intent, &input, output, &options).await,
        Command::Detect { input } => detect(config, &input).await,
        Command::Check => check(config).await,
    };

    if cli.metrics {
        eprint!("{}", metrics::render());
    }
    result
}

fn resolve_config(flag: Option<&Path>) -> Result<Config> {
    let path = flag
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    let config = match &path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => load_config_from_env().context("Failed to load config from environment")?,
    };
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Splits repeated `key=value` arguments into a map.
fn parse_options(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => bail!("option '{}' is not in key=value form", pair),
        })
        .collect()
}

fn default_output(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}.converted.{}", stem, extension))
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling conversion");
            token.cancel();
        }
    });
}

async fn convert(
    config: Config,
    intent: &str,
    input: &Path,
    output: Option<PathBuf>,
    options: &[String],
) -> Result<()> {
    let intent: Intent = intent.parse()?;
    let options = ConversionOptions::from_map(&parse_options(options)?)?;
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {:?}", input))?;

    let converter = MediaConverter::from_config(config.converter);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let request = ConversionRequest::new(intent, bytes).with_options(options);
    let result = converter.convert_with_cancel(request, cancel).await;
    converter.shutdown().await;
    let result = result.with_context(|| format!("{} failed for {:?}", intent, input))?;

    let output = output.unwrap_or_else(|| default_output(input, result.extension));
    tokio::fs::write(&output, &result.bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", output))?;

    if let Some(diagnostics) = &result.diagnostics {
        warn!(%diagnostics, "Engine reported warnings");
    }
    println!(
        "{}",
        json!({
            "request_id": result.request_id.to_string(),
            "intent": intent,
            "output": output.display().to_string(),
            "mime_type": result.mime_type,
            "bytes": result.bytes.len(),
            "duration_ms": result.duration_ms,
        })
    );
    Ok(())
}

async fn detect(config: Config, input: &Path) -> Result<()> {
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {:?}", input))?;
    let converter = MediaConverter::from_config(config.converter);
    let kind = converter.detect(&bytes)?;
    println!("{}", serde_json::to_string(&kind)?);
    Ok(())
}

async fn check(config: Config) -> Result<()> {
    let converter = MediaConverter::from_config(config.converter);
    let engine = &converter.config().engine;
    converter
        .runner()
        .validate()
        .await
        .with_context(|| format!("Engine {:?} is not usable", engine.ffmpeg_path))?;

    let caps = EngineCapabilities::detect(engine).await;
    let intents: serde_json::Map<String, serde_json::Value> = Intent::ALL
        .into_iter()
        .map(|intent| (intent.to_string(), json!(caps.missing_for(intent))))
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "engine": engine.ffmpeg_path.display().to_string(),
            "encoders": &caps,
            "missing_by_intent": intents,
        }))?
    );

    let unsupported = Intent::ALL
        .into_iter()
        .filter(|intent| !caps.supports(*intent))
        .count();
    if unsupported > 0 {
        warn!(unsupported, "Some intents lack the encoders they need");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convert_command() {
        let cli = Cli::try_parse_from([
            "mediaconv",
            "convert",
            "flip-or-rotate",
            "in.jpg",
            "-o",
            "out.jpg",
            "--set",
            "direction=left",
        ])
        .unwrap();
        match cli.command {
            Command::Convert {
                intent,
                input,
                output,
                options,
            } => {
                assert_eq!(intent.parse::<Intent>().unwrap(), Intent::FlipOrRotate);
                assert_eq!(input, PathBuf::from("in.jpg"));
                assert_eq!(output, Some(PathBuf::from("out.jpg")));
                assert_eq!(options, vec!["direction=left".to_string()]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["mediaconv", "check", "--config", "/etc/mediaconv.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/mediaconv.toml")));
        assert!(matches!(cli.command, Command::Check));
    }

    #[test]
    fn test_parse_options() {
        let map = parse_options(&["width=640".to_string(), "pack=a=b".to_string()]).unwrap();
        assert_eq!(map["width"], "640");
        assert_eq!(map["pack"], "a=b");
        assert!(parse_options(&["novalue".to_string()]).is_err());
        assert!(parse_options(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output(Path::new("/tmp/clip.mp4"), "webp"),
            PathBuf::from("/tmp/clip.converted.webp")
        );
    }

    #[test]
    fn test_resolve_config_missing_file() {
        let err = resolve_config(Some(Path::new("/nonexistent/mediaconv.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("not found"));
    }

    #[test]
    fn test_resolve_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mediaconv.toml");
        std::fs::write(&path, "[limits]\nmax_concurrent_processes = 2\n").unwrap();
        let config = resolve_config(Some(&path)).unwrap();
        assert_eq!(config.converter.limits.max_concurrent_processes, 2);
    }
}
