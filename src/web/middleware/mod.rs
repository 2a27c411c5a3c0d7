//! Middleware for the HTTP API.

mod cors;

pub use cors::create_cors_layer;
