//! Relay entry point.
//!
//! Loads configuration, sets up logging and runs the relay until a
//! termination signal arrives. If the backend stays unreachable past the
//! configured threshold the process exits non-zero so a supervisor can
//! restart it.

mod cli;
mod config;
mod signals;

use cli::CliArgs;
use config::{AppConfig, LoggingSettings};
use proxy_server::{RelayError, RelayServer, ServerContext};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging system
fn setup_logging(config: &LoggingSettings) {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_target(false),
            )
            .init();
    }

    info!("Logging initialized with level: {}", log_level);
}

pub struct Application {
    config: AppConfig,
    server: Arc<RelayServer>,
}

impl Application {
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Configuration comes first so its logging section can be honoured.
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.relay.bind_address = bind_address;
        }
        if let Some(backend) = args.backend_address {
            config.set_backend(&backend)?;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {}", e).into());
        }

        setup_logging(&config.logging);

        let relay_config = config.to_relay_config()?;
        let server = Arc::new(RelayServer::new(ServerContext::new(relay_config)));

        info!(
            "Starship v{} | config: {}",
            env!("CARGO_PKG_VERSION"),
            args.config_path.display()
        );

        Ok(Self { config, server })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Configuration summary:");
        info!("  Bind address: {}", self.config.relay.bind_address);
        info!(
            "  Backend: {}:{}",
            self.config.backend.address, self.config.backend.port
        );
        info!(
            "  Max failed connections: {}",
            self.config.backend.max_failed_connections
        );
        info!("  Player data: {}", self.config.players.directory);

        let signal_watch = {
            let server = self.server.clone();
            tokio::spawn(async move {
                match signals::shutdown_requested().await {
                    Ok(name) => {
                        info!("Received {}, shutting down", name);
                        server.shutdown();
                    }
                    Err(e) => warn!("Signal handling unavailable: {}", e),
                }
            })
        };

        let outcome = self.server.start().await;
        signal_watch.abort();

        match outcome {
            Ok(()) => {
                info!("Starship shutdown complete");
                Ok(())
            }
            Err(RelayError::Crashed(failures)) => {
                error!(
                    "Backend unreachable after {} attempts; exiting for restart",
                    failures
                );
                Err(RelayError::Crashed(failures).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("Relay stopped: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Failed to start relay: {}", e);
            std::process::exit(1);
        }
    }
}
