//! camstream sender - entry point.
//!
//! ```text
//! camstream-sender                       Run with camstream-sender.toml
//! camstream-sender --config <path>       Load a custom config TOML
//! camstream-sender --host H --port P     Override the receiver address
//! camstream-sender --connect             Connect immediately on start
//! camstream-sender --gen-config          Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camstream_sender::config::{ConfigError, SenderConfig};
use camstream_sender::service::SenderService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "camstream-sender", about = "Stream camera frames to a receiver over TCP")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "camstream-sender.toml")]
    config: PathBuf,

    /// Receiver host (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Receiver port (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Connect as soon as the sender starts.
    #[arg(long)]
    connect: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply CLI overrides.
    let (mut config, load_error) = SenderConfig::load_or_default(&cli.config);
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if cli.connect {
        config.network.connect_on_start = true;
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

    info!("camstream-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("receiver: {}:{}", config.network.host, config.network.port);
    info!(
        "camera: {}x{} @ {} fps",
        config.camera.width, config.camera.height, config.camera.fps
    );
    info!(
        "quality: stream {}, capture {}",
        config.encoding.stream_quality.get(),
        config.encoding.capture_quality.get()
    );

    let service = SenderService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
