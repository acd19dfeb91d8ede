//! camstream receiver - entry point.
//!
//! ```text
//! camstream-receiver                    Listen with defaults
//! camstream-receiver --config <path>    Use custom config TOML
//! camstream-receiver --port 12345       Override the listening port
//! camstream-receiver --gen-config       Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camstream_receiver::config::{ConfigError, ReceiverConfig};
use camstream_receiver::server::ReceiverServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "camstream-receiver", about = "Receive a camstream video feed")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "camstream-receiver.toml")]
    config: PathBuf,

    /// Port to listen on (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Output directory (overrides config).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, load_error) = ReceiverConfig::load_or_default(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(dir) = cli.output {
        config.output.dir = dir;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match load_error {
        Some(e @ ConfigError::Missing(_)) => info!("{e}; using defaults"),
        Some(e) => warn!("{e}; using defaults"),
        None => {}
    }

    info!("camstream-receiver v{}", env!("CARGO_PKG_VERSION"));

    let server = ReceiverServer::new(config);
    let stop = server.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    server.run().await?;

    Ok(())
}
