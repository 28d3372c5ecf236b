//! LumaDB Data Server
//!
//! Binary entry point for the REST data service.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use data_common::config::DataConfig;
use lumadb_data::DataService;

#[derive(Parser, Debug)]
#[command(name = "lumadb-data")]
#[command(about = "LumaDB REST data service", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "data.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Database URL, overrides the configured connection settings
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Compact,
    /// JSON lines
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Compact => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    info!("LumaDB Data Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = if args.config.exists() {
        let content = std::fs::read_to_string(&args.config)?;
        toml::from_str(&content)?
    } else {
        info!("Using default configuration");
        DataConfig::default()
    };

    if let Some(url) = args.database_url {
        config.database.url = Some(url);
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let service = DataService::new(config).await?;

    let server = service.start()?;
    tokio::pin!(server);

    tokio::select! {
        biased;
        result = &mut server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Received shutdown signal");
            // the server loop only advances while polled
            let (stopped, served) = tokio::join!(service.shutdown(), &mut server);
            stopped?;
            served?;
        }
    }

    Ok(())
}
