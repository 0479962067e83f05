//! ramftp - Entry Point
//!
//! Binds the control and passive-data listeners and drives the engine once
//! per tick until interrupted. Transfer outcomes are logged together with
//! the current mount so an operator can watch uploads arrive.

use std::time::Duration;

use log::{error, info, warn};

use ramftp::{FtpServer, ServerConfig, SystemClock, TcpSocketProvider, TransferEvent};

#[tokio::main]
async fn main() {
    // env_logger picks up the RUST_LOG environment variable.
    env_logger::init();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Could not load config.toml ({}), using built-in defaults", e);
            ServerConfig::default()
        }
    };

    let provider = match TcpSocketProvider::bind(&config) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Server startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let buffer = vec![0u8; config.file_buffer_capacity].into_boxed_slice();
    let mut server = FtpServer::new(provider, SystemClock::new(), config, buffer);

    let mut ticker = tokio::time::interval(Duration::from_millis(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match server.poll() {
                    TransferEvent::Idle => {}
                    event => {
                        let file = server.file();
                        info!(
                            "Transfer event {:?}: name={:?} size={}",
                            event,
                            file.name(),
                            file.size()
                        );
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }
}
