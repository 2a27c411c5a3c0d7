//! HTTP server for dedupvault.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::config::ServerConfig;
use crate::{Result, VaultError};

use super::handlers::AppState;
use super::router::{create_health_router, create_router, create_swagger_router};

/// Interval between storage maintenance runs (1 hour).
const MAINTENANCE_INTERVAL_SECS: u64 = 3600;

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// CORS allowed origins.
    cors_origins: Vec<String>,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &ServerConfig, app_state: AppState) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| {
                VaultError::Config(format!(
                    "invalid server address {}:{}: {e}",
                    config.host, config.port
                ))
            })?;

        Ok(Self {
            addr,
            app_state: Arc::new(app_state),
            cors_origins: config.cors_origins.clone(),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Build the full application router.
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.app_state), &self.cors_origins)
            .merge(create_health_router())
            .merge(create_swagger_router())
            .layer(CompressionLayer::new())
    }

    /// Start the storage maintenance background task.
    ///
    /// This task runs every hour and:
    /// - Compares the maintained counters with figures derived from the rows
    /// - Checks each stored file's blob is present with the recorded size
    /// - Removes empty blob shard directories
    fn start_maintenance_task(app_state: Arc<AppState>) {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));

            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;
                run_maintenance(&app_state).await;
            }
        });
    }

    /// Run the web server.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let router = self.router();

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        Self::start_maintenance_task(Arc::clone(&self.app_state));
        tracing::info!("Storage maintenance task started (runs every hour)");

        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(listener, router).await
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::result::Result<SocketAddr, std::io::Error> {
        let router = self.router();

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        Self::start_maintenance_task(Arc::clone(&self.app_state));

        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

/// One maintenance pass; failures are logged and retried next interval.
async fn run_maintenance(app_state: &AppState) {
    let accounting = &app_state.accounting;
    match (
        accounting.get_metadata().await,
        accounting.recompute_metadata().await,
    ) {
        (Ok(maintained), Ok(derived)) if maintained != derived => {
            tracing::warn!(
                ?maintained,
                ?derived,
                "Storage metadata drifted from stored rows; reconciling"
            );
            if let Err(e) = accounting.reconcile_metadata().await {
                tracing::warn!(error = %e, "Failed to reconcile storage metadata");
            }
        }
        (Ok(_), Ok(_)) => tracing::debug!("Storage metadata is consistent"),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Failed to audit storage metadata");
        }
    }

    match app_state.files.verify_blobs().await {
        Ok(damaged) if !damaged.is_empty() => {
            tracing::warn!(damaged_count = damaged.len(), "Stored files with damaged blobs");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to verify blobs"),
    }

    match app_state.files.cleanup_storage().await {
        Ok(count) if count > 0 => {
            tracing::info!(removed_count = count, "Removed empty blob directories");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to clean up blob storage"),
    }
}
