//! HTTP API module for dedupvault.
//!
//! This module exposes uploads, listings, downloads, deletes and storage
//! statistics over a REST API with an OpenAPI description.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::create_router;
pub use server::WebServer;
