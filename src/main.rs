use clap::Parser;
use log::{error, info};
use std::sync::Arc;

use dpot::configuration::config::{Cli, Config};
use dpot::detection::detector::ExploitDetector;
use dpot::event_log::remote::RemoteTarget;
use dpot::event_log::sink::EventSink;
use dpot::network::listener_pool::ListenerPool;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
██████╗ ██████╗  ██████╗ ████████╗
██╔══██╗██╔══██╗██╔═══██╗╚══██╔══╝
██║  ██║██████╔╝██║   ██║   ██║
██║  ██║██╔═══╝ ██║   ██║   ██║
██████╔╝██║     ╚██████╔╝   ██║
╚═════╝ ╚═╝      ╚═════╝    ╚═╝
===================================
 A decoy endpoint for `${{...}}` probes
===================================
"
    );

    let config = match Config::from_cli(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let detector = match ExploitDetector::new() {
        Ok(detector) => Arc::new(detector),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let remote = RemoteTarget::from_config(config.remote.as_ref());
    if remote.is_mirrored() {
        info!("Remote log mirroring enabled");
    }

    let sink = match EventSink::open(&config.log_path, remote).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    sink.log_start().await;

    let mut pool = ListenerPool::new(Arc::clone(&sink), detector, config.read_timeout);
    if let Err(e) = pool.start(&config.listeners).await {
        error!("{}", e);
        sink.close().await;
        std::process::exit(1);
    }

    info!(
        "Serving on {} port(s); press Ctrl-C to stop",
        pool.local_addrs().len()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for shutdown signal: {}", e);
    }

    info!("Shutting down");
    pool.stop().await;
    sink.close().await;
}
