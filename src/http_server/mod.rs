//! # HTTP Server Module
//!
//! axum server for the URLs disk services sign.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /metrics` - Counters of every mirror service
//! - `GET /storage/:service/blobs/:token` - Signed blob read
//! - `PUT /storage/:service/direct_uploads/:token` - Signed direct upload

pub mod config;
pub mod observability_routes;
pub mod server;
pub mod storage_routes;

pub use config::HttpServerConfig;
pub use server::HttpServer;
pub use storage_routes::ErrorResponse;
