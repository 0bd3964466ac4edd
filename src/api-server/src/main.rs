//! Stratum API server
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings (0.0.0.0:8080, demo seed)
//! cargo run --bin stratum-server
//!
//! # Load entities and policies from a seed file, revoke instantly
//! cargo run --bin stratum-server -- --seed seed.json --policy-cache-ttl 0
//!
//! # Enable debug logging
//! RUST_LOG=debug cargo run --bin stratum-server
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (trace, debug, info, warn, error)
//! - `STRATUM_HOST`, `STRATUM_PORT`: listener address
//! - `STRATUM_POLICY_CACHE_TTL_SECS`: policy staleness bound (0 = uncached)
//! - `STRATUM_REQUEST_TIMEOUT_SECS`: per-request deadline (0 = none)
//! - `STRATUM_INHERITANCE`: `scope_exact` or `descendant_grants`
//! - `STRATUM_USAGE_TRACKING`: enforce usage limits on metered routes
//! - `STRATUM_LOGIN_PATH`: redirect target for browser routes
//! - `STRATUM_SEED`: JSON seed file
//! - `STRATUM_JSON_LOGS`: JSON log output

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use stratum_api_server::{AppState, Args, Seed, ServerBuilder};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args);

    info!("Starting Stratum API server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let engine = args.engine_config();
    info!(
        inheritance = %engine.inheritance,
        policy_cache = ?engine.policy_cache.consistency,
        request_deadline = ?engine.request_deadline,
        usage_tracking = engine.usage_tracking_enabled,
        "Engine configuration"
    );

    let state = AppState::new(args.server_config(), engine)?;

    let seed = match &args.seed {
        Some(path) => {
            info!("Loading seed from {}", path.display());
            Seed::from_file(path)?
        }
        None => {
            info!("No seed file given, loading demo tenant");
            Seed::demo()
        }
    };
    seed.apply(&state).await;

    let server = ServerBuilder::new()
        .config(args.server_config())
        .state(Arc::new(state))
        .build()?;

    info!("Press Ctrl+C to shutdown gracefully");

    if let Err(e) = server.run().await {
        error!("Server error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize tracing/logging subsystem
fn init_tracing(args: &Args) {
    let log_level = args.log_level.parse::<tracing::Level>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        tracing::Level::INFO
    });
    let dependency_level = if log_level >= tracing::Level::DEBUG {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "stratum_api_server={0},stratum_authz={0},audit={0},tower_http={1},axum={1}",
            log_level, dependency_level
        )
        .into()
    });

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}
