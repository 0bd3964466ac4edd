//! HTTP binding of the Stratum authorization core
//!
//! Mounts every control-plane route on an axum router. Each route runs its
//! authorization pipeline before its handler; rejections map to status codes
//! that never reveal whether a resource exists.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod seed;
pub mod server;
pub mod state;

pub use config::{Args, ServerConfig};
pub use error::{ApiError, Result};
pub use seed::Seed;
pub use server::{Server, ServerBuilder};
pub use state::AppState;

/// Health check response
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
}
