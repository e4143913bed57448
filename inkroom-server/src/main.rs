//! Inkroom drawing server.
//!
//! Configuration comes from `INKROOM_*` environment variables, log level
//! from `RUST_LOG`.

use inkroom_collab::{ServerConfig, SyncServer};
use log::{error, info};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    // No listener without a working store.
    let server = match SyncServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to open event store: {e}");
            std::process::exit(1);
        }
    };

    info!("Starting inkroom on {}", server.config().listen_addr());
    if let Err(e) = server.run().await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
