//! favik command-line entry point.
//!
//! Resolves the favicon for one website and prints the result.
//! Logging goes to stderr so stdout stays clean for the resolved value
//! (or raw image bytes).

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use favik_client::{OutputMode, Resolved, Resolver};
use favik_core::AppConfig;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "favik", version, about = "Resolve the favicon for a website, with local caching")]
struct Cli {
    /// Website URL to resolve.
    url: String,

    /// Output shape.
    #[arg(long, value_enum, default_value_t = Mode::Url)]
    mode: Mode,

    /// Value printed when no favicon can be resolved.
    #[arg(long)]
    default: Option<String>,

    /// Directory cache entries are written to.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Cache entry lifetime in seconds (0 disables caching).
    #[arg(long)]
    cache_timeout: Option<u64>,

    /// HTTP request timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// User-Agent header for HTTP requests.
    #[arg(long)]
    user_agent: Option<String>,

    /// Write image bytes to this file instead of stdout (mode=image).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit a JSON envelope instead of the bare value.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Absolute favicon URL.
    Url,
    /// Raw image bytes.
    Image,
    /// On-disk cache path for this URL.
    CachePath,
}

impl From<Mode> for OutputMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Url => OutputMode::Url,
            Mode::Image => OutputMode::RawImage,
            Mode::CachePath => OutputMode::CachedFilePath,
        }
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(default) = &cli.default {
        config.default_value = default.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(timeout) = cli.cache_timeout {
        config.cache_timeout_secs = timeout;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(user_agent) = &cli.user_agent {
        config.user_agent = user_agent.clone();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let resolver = Resolver::new(config)?;
    let resolved = resolver.get(Some(&cli.url), cli.mode.into()).await?;

    match resolved {
        Resolved::Url(url) => {
            if cli.json {
                println!("{}", serde_json::json!({ "url": cli.url, "favicon": url }));
            } else {
                println!("{url}");
            }
        }
        Resolved::Image(bytes) => match &cli.output {
            Some(path) => {
                std::fs::write(path, &bytes)?;
                tracing::info!("wrote {} bytes to {}", bytes.len(), path.display());
            }
            None => std::io::stdout().write_all(&bytes)?,
        },
        Resolved::CachedFilePath(path) => {
            if cli.json {
                println!("{}", serde_json::json!({ "url": cli.url, "cache_path": path }));
            } else {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}
