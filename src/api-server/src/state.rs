use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use stratum_authz::scope::ScopeTree;
use stratum_authz::{
    AuditTrail, EngineConfig, InMemoryEntityStore, InMemoryPolicyLoader, InMemoryUsageMeter,
    PipelineBuilder, ResolverRegistry, StaticTokenAuthenticator,
};

use crate::config::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    /// Validated scope hierarchy
    pub tree: Arc<ScopeTree>,

    /// Builds one pipeline per mounted route
    pub builder: PipelineBuilder,

    pub store: Arc<InMemoryEntityStore>,
    pub loader: Arc<InMemoryPolicyLoader>,
    pub authn: Arc<StaticTokenAuthenticator>,
    pub audit: Arc<AuditTrail>,
    pub meter: Arc<InMemoryUsageMeter>,

    pub config: ServerConfig,

    /// Server start time for uptime calculation
    pub start_time: Instant,

    /// Wall-clock start time reported by the health endpoint
    pub started_at: DateTime<Utc>,

    /// Application version
    pub version: String,
}

impl AppState {
    /// Wire the in-memory collaborators into a pipeline builder
    pub fn new(config: ServerConfig, engine: EngineConfig) -> Result<Self> {
        let tree = Arc::new(ScopeTree::new().context("Invalid scope hierarchy")?);

        let store = Arc::new(InMemoryEntityStore::new());
        let loader = Arc::new(InMemoryPolicyLoader::new());
        let authn = Arc::new(StaticTokenAuthenticator::new());
        let audit = Arc::new(AuditTrail::default());
        let meter = Arc::new(InMemoryUsageMeter::new());

        let policy_engine = Arc::new(engine.policy_engine(loader.clone()));
        let builder = PipelineBuilder::new(
            tree.clone(),
            authn.clone(),
            policy_engine,
            ResolverRegistry::for_store(store.clone()),
            audit.clone(),
        )
        .usage_meter(meter.clone())
        .config(engine);

        Ok(Self {
            tree,
            builder,
            store,
            loader,
            authn,
            audit,
            meter,
            config,
            start_time: Instant::now(),
            started_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
