use tracing::{error, info};

use dedupvault::{AppState, Config, Database, WebServer};

/// Configuration file read at startup.
const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    // Load configuration
    let mut config = match Config::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();

    // Initialize logging
    if let Err(e) = dedupvault::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        dedupvault::logging::init_console_only(&config.logging.level);
    }

    info!("dedupvault - Deduplicated file storage");

    if let Err(e) = run(config).await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> dedupvault::Result<()> {
    config.validate()?;

    let db = Database::open(&config.database.path, config.database.max_connections).await?;
    let app_state = AppState::from_config(db, &config)?;

    let server = WebServer::new(&config.server, app_state)?;
    info!(
        "Server configured on {}:{}",
        config.server.host, config.server.port
    );

    server.run().await?;
    Ok(())
}
