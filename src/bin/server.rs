use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};

use team_agenda::config::ServerConfig;
use team_agenda::handlers::{routes, AppState};
use team_agenda::storage::{MySqlStorage, StorageProvider};

#[tokio::main]
async fn main() {
    // Load .env first so RUST_LOG from it reaches the logger
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);
    if config.development_mode {
        warn!("Development mode is enabled");
    }

    let storage = match MySqlStorage::connect(&config.database).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to connect to the database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = storage.initialize().await {
        error!("Failed to initialize the database schema: {}", e);
        std::process::exit(1);
    }

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(config, Arc::new(storage)).shared();

    info!("Starting Team Agenda server on {}", addr);
    warp::serve(routes(state)).run(addr).await;
}
