//! Storefront perimeter
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                  PERIMETER                   │
//!     Client Request      │  ┌──────────┐   ┌─────────────┐   ┌────────┐ │
//!     ────────────────────┼─▶│ listener │──▶│ edge filter │──▶│  API   │ │
//!                         │  │ TCP/TLS  │   │ block / bot │   │ routes │ │
//!                         │  └──────────┘   │ traversal   │   └───┬────┘ │
//!                         │                 └──────┬──────┘       │      │
//!                         │                        ▼              ▼      │
//!                         │                 ┌─────────────┐  ┌─────────┐ │
//!                         │                 │  upstream   │  │  gate   │ │
//!                         │                 │ pass-through│  │ scanner │ │
//!                         │                 └─────────────┘  └─────────┘ │
//!                         │  ┌────────────────────────────────────────┐  │
//!                         │  │ stores: rate windows, tracker, OTP     │  │
//!                         │  │ sweeper, audit, metrics, admin API     │  │
//!                         │  └────────────────────────────────────────┘  │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use storefront_perimeter::config::{self, watcher::ConfigWatcher};
use storefront_perimeter::http::HttpServer;
use storefront_perimeter::lifecycle::{signals::shutdown_signal, Shutdown};
use storefront_perimeter::net::tls::load_tls_config;
use storefront_perimeter::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "storefront-perimeter", version)]
#[command(about = "Request perimeter for the storefront", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "PERIMETER_CONFIG", default_value = "perimeter.toml")]
    config: PathBuf,

    /// Do not watch the configuration file for changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = config::load_or_default(&args.config)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "storefront-perimeter starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        amnesty = ?config.intrusion.amnesty,
        upstream = config.upstream.enabled,
        admin = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher must outlive the server.
    let (config_updates, _watcher) = if args.no_watch || !args.config.exists() {
        let (_, rx) = mpsc::unbounded_channel();
        (rx, None)
    } else {
        let (watcher, rx) = ConfigWatcher::watch(&args.config)?;
        (rx, Some(watcher))
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    let mut server_task = tokio::spawn(async move {
        match tls {
            Some(tls) => {
                let addr: SocketAddr = bind_address.parse()?;
                let rustls = load_tls_config(&tls).await?;
                server
                    .run_tls(addr, rustls, config_updates, server_shutdown)
                    .await?;
            }
            None => {
                let listener = TcpListener::bind(&bind_address).await?;
                server.run(listener, config_updates, server_shutdown).await?;
            }
        }
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    });

    tokio::select! {
        _ = shutdown_signal() => {
            shutdown.trigger();
            server_task.await?.map_err(|e| e as Box<dyn std::error::Error>)?;
        }
        res = &mut server_task => {
            res?.map_err(|e| e as Box<dyn std::error::Error>)?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
