use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use drizlink_server::handlers::{heartbeat, serve};
use drizlink_server::{discovery, Server, ServerConfig};
use log::warn;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "drizlink-server")]
#[command(about = "DrizLink relay server", long_about = None)]
#[command(version)]
struct Cli {
    /// Port to run the server on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to an alternative Config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let mut config = match ServerConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    let address = config.get_addr();
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("❌ Error: could not bind {address}: {e}");
            eprintln!("Please choose a different port or stop the other server.");
            std::process::exit(1);
        }
    };
    println!("🚀 Server listening on {address}");

    let server = Server::new();

    match discovery::bind_responder(common::discovery::DISCOVERY_PORT).await {
        Ok(socket) => {
            tokio::spawn(discovery::run_responder(socket, config.port));
        }
        Err(e) => {
            warn!("discovery responder unavailable: {e}");
        }
    }
    tokio::spawn(heartbeat::run(
        server.clone(),
        Duration::from_secs(config.heartbeat_secs),
    ));

    serve(listener, server).await;
}
