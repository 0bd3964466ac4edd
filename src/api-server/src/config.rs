//! Command-line and environment configuration
//!
//! Every flag has a `STRATUM_*` environment fallback so the server can be
//! configured entirely from its container environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use stratum_authz::{EngineConfig, InheritanceMode, PolicyCacheConfig};

/// Stratum control-plane API server
#[derive(Parser, Debug, Clone)]
#[command(
    name = "stratum-server",
    version,
    about = "Authorization-enforcing API server for the Stratum control plane",
    long_about = None
)]
pub struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "STRATUM_HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(short = 'p', long, default_value = "8080", env = "STRATUM_PORT")]
    pub port: u16,

    /// How long a cached policy may be served, in seconds (0 disables the cache)
    #[arg(long, default_value = "30", env = "STRATUM_POLICY_CACHE_TTL_SECS")]
    pub policy_cache_ttl: u64,

    /// Per-request deadline in seconds (0 disables the deadline)
    #[arg(long, default_value = "30", env = "STRATUM_REQUEST_TIMEOUT_SECS")]
    pub request_timeout: u64,

    /// Policy inheritance mode (scope_exact or descendant_grants)
    #[arg(long, default_value = "scope_exact", env = "STRATUM_INHERITANCE")]
    pub inheritance: InheritanceMode,

    /// Enforce usage limits on metered routes
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "STRATUM_USAGE_TRACKING"
    )]
    pub usage_tracking: bool,

    /// Where browsers are sent when authentication fails on redirecting routes
    #[arg(long, default_value = "/login", env = "STRATUM_LOGIN_PATH")]
    pub login_path: String,

    /// JSON seed file for the in-memory stores
    #[arg(long, env = "STRATUM_SEED")]
    pub seed: Option<PathBuf>,

    /// Enable JSON logging format
    #[arg(long, env = "STRATUM_JSON_LOGS")]
    pub json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,
}

impl Args {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            login_path: self.login_path.clone(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        let policy_cache = match self.policy_cache_ttl {
            0 => PolicyCacheConfig::uncached(),
            secs => PolicyCacheConfig::ttl(Duration::from_secs(secs)),
        };
        let request_deadline = match self.request_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        EngineConfig {
            policy_cache,
            inheritance: self.inheritance,
            request_deadline,
            usage_tracking_enabled: self.usage_tracking,
        }
    }
}

/// Listener and HTTP-boundary settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Redirect target for unauthenticated browser routes
    pub login_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            login_path: "/login".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
