//! keytrack-upload - submit media files for keyword analysis
//!
//! Uploads the given files in one batch, prints each file's result as soon
//! as the service reports it, and finally prints the music search link
//! built from all keywords.

use anyhow::{Context, Result};
use clap::Parser;
use keytrack_client::render::render_events;
use keytrack_client::{
    DriverConfig, HttpTransport, LogNavigator, Navigator, StreamDriver, UploadFile,
};
use keytrack_common::config::{load_toml_config, CliOverrides, ClientConfig};
use keytrack_common::events::EventBus;
use keytrack_common::UploadState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "keytrack-upload", version, about = "Upload media files for keyword analysis")]
struct Cli {
    /// Media files to analyse
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Analysis API base URL
    #[arg(long = "api-url")]
    api_url: Option<String>,

    /// Bearer token for the analysis API
    #[arg(long)]
    token: Option<String>,

    /// Site the search link is printed against
    #[arg(long = "site-url")]
    site_url: Option<String>,

    /// Config file (default: <config dir>/keytrack/config.toml)
    #[arg(long, env = "KEYTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Give up when no data arrives for this many seconds
    #[arg(long = "chunk-timeout-secs")]
    chunk_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            api_base_url: self.api_url.clone(),
            token: self.token.clone(),
            site_base_url: self.site_url.clone(),
            chunk_timeout_secs: self.chunk_timeout_secs,
            log_level: self.log_level.clone(),
        }
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml_config = load_toml_config(cli.config.as_deref())?;
    let config = ClientConfig::resolve(&cli.overrides(), &toml_config)?;

    init_tracing(&config.log_level);
    info!(
        "Starting keytrack-upload v{} against {}",
        env!("CARGO_PKG_VERSION"),
        config.api_base_url
    );

    let files = cli
        .files
        .iter()
        .map(|path| UploadFile::from_path(path))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid upload file")?;

    let event_bus = EventBus::new(256);
    let transport = Arc::new(HttpTransport::new()?);
    let navigator = LogNavigator::new(config.site_base_url.clone());
    let driver = StreamDriver::new(transport, DriverConfig::from(&config), event_bus.clone());

    // Subscribe before the upload starts so no update is missed
    let renderer = tokio::spawn(render_events(event_bus.subscribe(), std::io::stdout()));

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling upload");
            ctrl_c_cancel.cancel();
        }
    });

    let Some(outcome) = driver.upload(files, cancel).await? else {
        renderer.abort();
        return Ok(());
    };

    match renderer.await {
        Ok(Err(e)) => warn!("Progress output failed: {}", e),
        Err(e) => warn!("Progress renderer stopped: {}", e),
        Ok(Ok(_)) => {}
    }

    // Navigate only once the renderer is done so the link is the last line
    match (outcome.state, &outcome.failure) {
        (UploadState::Completed, _) => {
            if let Some(target) = &outcome.redirect {
                navigator.navigate(target);
            }
            Ok(())
        }
        (state, Some(failure)) => {
            anyhow::bail!("upload {}: {}", state.as_str().to_lowercase(), failure)
        }
        (state, None) => anyhow::bail!("upload ended in state {}", state),
    }
}
