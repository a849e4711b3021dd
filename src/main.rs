use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use matchgate::config::Config;
use matchgate::engine::MatchEngine;
use matchgate::gateway::Gateway;
use matchgate::server;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(config.log_level))
        .init();

    info!(port = config.port, capacity = config.capacity, "starting matchgate");

    let engine = MatchEngine::new(config.capacity);
    let mut gateway = Gateway::new(engine, config.log_dir.clone());

    if config.replay_mode {
        match gateway.replay() {
            Ok(records) => info!(records, "event log replayed"),
            Err(err) => {
                error!(%err, "event log replay failed");
                return ExitCode::FAILURE;
            }
        }
    }

    let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(port = config.port, %err, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(port = config.port, "accepting connections");

    if let Err(err) = server::run(listener, gateway).await {
        error!(%err, "server error");
        return ExitCode::FAILURE;
    }

    info!("shutdown complete");
    ExitCode::SUCCESS
}
