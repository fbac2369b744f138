//! Dockhand - Entry Point
//!
//! A self-hosted deployment server: runs containerized workloads from
//! images, git repositories, and compose stacks, and publishes them on
//! public hostnames through a Cloudflare tunnel.

use std::collections::HashMap;
use std::env;

use dockhand::app::options::{AppOptions, ServerOptions, StorageOptions};
use dockhand::app::run::run;
use dockhand::logs::{init_logging, LogLevel};
use dockhand::storage::layout::StorageLayout;
use dockhand::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version).unwrap());
        return;
    }

    // Initialize logging
    let log_level = cli_args
        .get("log-level")
        .and_then(|v| v.parse::<LogLevel>().ok())
        .unwrap_or_default();
    if let Err(e) = init_logging(log_level) {
        println!("Failed to initialize logging: {e}");
    }

    let mut options = AppOptions::default();

    if let Some(dir) = cli_args.get("data-dir") {
        options.storage = StorageOptions {
            layout: StorageLayout::new(dir),
        };
    }
    options.server = ServerOptions {
        host: cli_args
            .get("host")
            .cloned()
            .unwrap_or_else(|| ServerOptions::default().host),
        port: cli_args
            .get("port")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| ServerOptions::default().port),
    };
    if cli_args.get("no-startup-import").is_some() {
        options.enable_startup_import = false;
    }

    info!("Running dockhand {} with options: {:?}", version.version, options);
    let result = run(options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the server: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
