use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info, warn};

use telepwn::config::{self as cfg, ConfigStore};
use telepwn::executor::http::ReqwestClient;
use telepwn::executor::process::SystemRunner;
use telepwn::lifecycle::{InstanceSlot, launch};
use telepwn::sources;

/// TelePwn CLI
#[derive(Debug, Parser)]
#[command(
    name = telepwn::PKG_NAME,
    version = telepwn::PKG_VERSION,
    about = "Remote control of an unattended device from a single chat"
)]
struct Args {
    /// Path to the device configuration (TOML); settings live in [main.plugins.telepwn]
    #[arg(short = 'c', long = "config", default_value = "/etc/pwnagotchi/config.toml")]
    config: PathBuf,

    /// Enable dry-run mode (log host commands instead of running them)
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the JSON Schema for the settings table and exit
    #[arg(long = "print-schema")]
    print_schema: bool,

    /// Read commands from stdin and print replies instead of using the bot API
    #[arg(long = "stdin")]
    stdin: bool,
}

/// Load settings and (re)install the engine.
async fn start_engine(slot: &InstanceSlot, args: &Args) -> Result<u64> {
    let settings = Arc::new(cfg::load_from_path_async(&args.config).await?);
    debug!(
        target: "telepwn",
        webhooks = %settings.webhook_file.display(),
        schedules = %settings.schedule_file.display(),
        "Settings loaded successfully"
    );
    let config = ConfigStore::new(&args.config);
    let transport = sources::build_transport(&settings, args.stdin);
    let runner = Arc::new(SystemRunner::new(args.dry_run));
    let web = Arc::new(ReqwestClient::new(Duration::from_secs(settings.http_timeout_secs))?);
    slot.install(move |instance| {
        info!(target: "telepwn", instance, transport = transport.name(), "Launching engine");
        launch(settings, config, transport, runner, web)
    })
    .await
}

#[cfg(unix)]
async fn hangup() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::hangup()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            warn!(target: "telepwn", error = %e, "SIGHUP handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn hangup() {
    std::future::pending::<()>().await;
}

fn print_schema() -> Result<()> {
    let schema = cfg::generate_schema();
    let json = serde_json::to_string_pretty(&schema)?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telepwn::init_tracing(args.log_level.as_deref());

    if args.print_schema {
        return print_schema();
    }

    info!(
        version = telepwn::PKG_VERSION,
        config = %args.config.display(),
        dry_run = args.dry_run,
        "Starting TelePwn"
    );

    let slot = InstanceSlot::new();
    start_engine(&slot, &args).await?;

    // Main loop: reload on SIGHUP, stop on Ctrl+C.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            _ = hangup() => {
                info!("Received SIGHUP, restarting engine");
                if let Err(e) = start_engine(&slot, &args).await {
                    error!(error = %format!("{e:#}"), "Restart failed; engine stopped");
                }
            }
        }
    }

    if let Some(instance) = slot.current().await {
        slot.release(instance).await;
    }
    info!("TelePwn exited");
    Ok(())
}
