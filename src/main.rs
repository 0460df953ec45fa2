use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use telebridge::{config, BridgeService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    let env_file_path = match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(_) => None,
    };

    // Initialize the tracing subscriber for structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level if RUST_LOG is not set
            if cfg!(debug_assertions) {
                "telebridge=debug,tower_http=debug,warn".into()
            } else {
                "telebridge=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    info!(version = telebridge::VERSION, "Telemetry bridge starting");

    // Log environment loading after logger is initialized
    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    // Load configuration
    let config = config::load_config().await?;
    info!(
        device = %config.device.addr(),
        dashboard = %config.dashboard.addr(),
        "Configured endpoints"
    );

    let service = BridgeService::new(config);

    // Run until a listener fails or a shutdown signal arrives
    tokio::select! {
        result = service.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping bridge");
        }
    }

    info!("Bridge shutdown complete");
    Ok(())
}
