//! vfs-router entry point
//!
//! Loads a mount configuration, constructs the router (which eagerly
//! connects and validates every mount target), and reports the resulting
//! mount table. A non-zero exit means the configuration would not come up.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use vfs_router::config::{self, Configuration};
use vfs_router::router::Router;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: vfs-router <config.yaml>");
    eprintln!();
    eprintln!("vfs-router - A virtual filesystem router with pluggable backends");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml    Path to a flat key/value mount configuration");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  vfs-router /etc/vfs-router/mounts.yaml");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let cfg = match Configuration::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let level = cfg.get(config::LOGGING_LEVEL).unwrap_or("info").to_string();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vfs-router starting");
    info!("Loaded configuration from {:?}", config_path);

    let router_uri = match cfg.get(config::ROUTER_URI) {
        Some(uri) => uri.to_string(),
        None => {
            eprintln!("Configuration is missing the '{}' key", config::ROUTER_URI);
            std::process::exit(1);
        }
    };

    let router = match Router::new(&router_uri, cfg).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Router failed to come up: {e}");
            std::process::exit(1);
        }
    };

    println!("Router {} is valid", router_uri);
    for entry in router.mount_table().entries() {
        println!("  {} -> {}", entry.prefix, entry.target);
    }
    if let Some(fallback) = router.mount_table().fallback() {
        println!("  (fallback) -> {}", fallback.target);
    }
    println!(
        "  {} live backend connection(s)",
        router.child_connections().len()
    );

    router.close().await?;
    Ok(())
}
