//! Pipeline builder and executor
//!
//! # Architecture
//!
//! ```text
//! Authenticate → PolicyPrefetch → ResolveScope(root) → … → ResolveScope(leaf)
//!              → AuditLog → StreamingUpgrade → UsageMeter → handler
//! ```
//!
//! A pipeline is built once per route at startup. Each request runs the
//! stages in order on its own task; the first failing stage rejects the
//! request and nothing after it runs. Usage is recorded last so a request
//! rejected by any other stage never counts against the tenant's quota.
//! The audit record prepared by `AuditLog` is written only once the whole
//! pipeline has passed.

mod authn;
mod stage;
mod state;

pub use authn::{Authenticator, StaticTokenAuthenticator};
pub use stage::{
    AuditLogStage, AuthenticateStage, PolicyPrefetchStage, ResolveScopeStage, Stage, StageKind,
    StreamingUpgradeStage, UsageMeterStage,
};
pub use state::{
    AuthorizedRequest, Dispatched, RejectReason, Rejection, RequestInput, RequestPhase,
    RequestState, RouteHandler,
};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEntry, AuditOutcome, AuditSink};
use crate::error::{AuthzError, Result};
use crate::policy::{InheritanceMode, PolicyCacheConfig, PolicyDocumentLoader, PolicyEngine};
use crate::resolver::ResolverRegistry;
use crate::scope::{Route, RouteTable, ScopeTree, ScopeType};
use crate::usage::UsageMeter;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Policy cache and its staleness bound
    pub policy_cache: PolicyCacheConfig,

    /// Whether statements may grant descendant scopes
    pub inheritance: InheritanceMode,

    /// Upper bound on a request's time in the pipeline
    pub request_deadline: Option<Duration>,

    /// Run the usage meter stage on metered routes
    pub usage_tracking_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy_cache: PolicyCacheConfig::default(),
            inheritance: InheritanceMode::ScopeExact,
            request_deadline: Some(Duration::from_secs(30)),
            usage_tracking_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Policy engine wired to this configuration
    pub fn policy_engine(&self, loader: Arc<dyn PolicyDocumentLoader>) -> PolicyEngine {
        PolicyEngine::new(loader, self.policy_cache.clone(), self.inheritance)
    }
}

/// Builds one [`Pipeline`] per route from shared collaborators
#[derive(Clone)]
pub struct PipelineBuilder {
    tree: Arc<ScopeTree>,
    authenticator: Arc<dyn Authenticator>,
    engine: Arc<PolicyEngine>,
    resolvers: ResolverRegistry,
    audit: Arc<dyn AuditSink>,
    usage: Option<Arc<dyn UsageMeter>>,
    config: EngineConfig,
}

impl PipelineBuilder {
    pub fn new(
        tree: Arc<ScopeTree>,
        authenticator: Arc<dyn Authenticator>,
        engine: Arc<PolicyEngine>,
        resolvers: ResolverRegistry,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            tree,
            authenticator,
            engine,
            resolvers,
            audit,
            usage: None,
            config: EngineConfig::default(),
        }
    }

    pub fn usage_meter(mut self, meter: Arc<dyn UsageMeter>) -> Self {
        self.usage = Some(meter);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Ordered stage list for a route
    ///
    /// # Errors
    ///
    /// `InvalidRoute` if the chain is not a root-to-leaf path or a persisted
    /// scope has no registered resolver.
    pub fn build(&self, route: Arc<Route>) -> Result<Pipeline> {
        route.validate(&self.tree)?;

        let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(route.chain.len() + 5);
        stages.push(Box::new(AuthenticateStage::new(self.authenticator.clone())));

        if route.chain.contains(&ScopeType::Project) {
            stages.push(Box::new(PolicyPrefetchStage::new(self.engine.clone())));
        }

        for scope in &route.chain {
            let resolver = self.resolvers.get(*scope);
            if resolver.is_none() && scope.is_persisted() {
                return Err(AuthzError::InvalidRoute {
                    route: route.name(),
                    reason: format!("no resolver registered for scope {}", scope),
                });
            }

            stages.push(Box::new(ResolveScopeStage::new(
                *scope,
                route.verb,
                self.engine.clone(),
                resolver,
            )));
        }

        if !route.flags.quiet {
            stages.push(Box::new(AuditLogStage));
        }

        if route.flags.streaming {
            stages.push(Box::new(StreamingUpgradeStage));
        }

        if route.flags.usage_metered && self.config.usage_tracking_enabled {
            if let (Some(meter), Some(metric)) = (&self.usage, &route.usage_metric) {
                stages.push(Box::new(UsageMeterStage::new(meter.clone(), metric.clone())));
            }
        }

        debug!(
            route = %route.name(),
            stages = stages.len(),
            "Pipeline built"
        );

        Ok(Pipeline {
            route,
            stages,
            audit: self.audit.clone(),
            deadline: self.config.request_deadline,
        })
    }

    /// Build every route of the table, failing on the first bad one
    pub fn build_all(&self, table: &RouteTable) -> Result<Vec<Pipeline>> {
        let pipelines = table
            .iter()
            .map(|route| self.build(route.clone()))
            .collect::<Result<Vec<_>>>()?;

        info!("Built {} route pipelines", pipelines.len());
        Ok(pipelines)
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }
}

/// Immutable stage list of one route
pub struct Pipeline {
    route: Arc<Route>,
    stages: Vec<Box<dyn Stage>>,
    audit: Arc<dyn AuditSink>,
    deadline: Option<Duration>,
}

impl Pipeline {
    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// Run every stage; the request is authorized iff all of them pass
    pub async fn execute(
        &self,
        input: RequestInput,
        cancel: CancellationToken,
    ) -> std::result::Result<AuthorizedRequest, Rejection> {
        let deadline = self.deadline.map(|d| Instant::now() + d);
        let mut state = RequestState::new(self.route.clone(), input);

        for stage in &self.stages {
            let kind = stage.kind();
            if let StageKind::ResolveScope(scope) = kind {
                let index = self
                    .route
                    .chain
                    .iter()
                    .position(|s| *s == scope)
                    .unwrap_or_default();
                state.transition(RequestPhase::ScopeResolving(index));
            }

            debug!(
                request_id = %state.input.request_id,
                route = %self.route.name(),
                stage = %kind,
                phase = %state.phase(),
                "Running stage"
            );

            let result = guarded(stage.run(&mut state), &cancel, deadline).await;
            if let Err(error) = result {
                return Err(self.reject(state, error).await);
            }

            if kind == StageKind::Authenticate {
                state.transition(RequestPhase::Authenticated);
            }
        }

        if let Some(entry) = state.pending_audit.take() {
            if let Err(error) = self.audit.record(entry).await {
                return Err(self.reject(state, error).await);
            }
        }

        state.transition(RequestPhase::Authorized);

        let principal = match state.principal.take() {
            Some(principal) => principal,
            None => {
                let error = AuthzError::Internal("pipeline finished without a principal".into());
                return Err(self.reject(state, error).await);
            }
        };

        Ok(AuthorizedRequest {
            request_id: state.input.request_id.clone(),
            route: self.route.clone(),
            principal,
            tenant: state.tenant,
            actions: state.actions.clone(),
            phases: state.history().to_vec(),
            context: state.context,
        })
    }

    /// Execute, then hand the authorized request to `handler`
    pub async fn dispatch(
        &self,
        input: RequestInput,
        cancel: CancellationToken,
        handler: &dyn RouteHandler,
    ) -> std::result::Result<Dispatched, Rejection> {
        let deadline = self.deadline.map(|d| Instant::now() + d);
        let mut request = self.execute(input, cancel.clone()).await?;

        match guarded(handler.handle(&request), &cancel, deadline).await {
            Ok(body) => {
                request.phases.push(RequestPhase::Dispatched);
                Ok(Dispatched { request, body })
            }
            Err(error) => {
                let reason = RejectReason::from(&error);
                log_rejection(&request.request_id, &self.route.name(), &error);

                let mut phases = request.phases;
                phases.push(RequestPhase::Rejected(reason));

                Err(Rejection {
                    request_id: request.request_id,
                    route: self.route.name(),
                    redirect: false,
                    error,
                    phase: RequestPhase::Authorized,
                    phases,
                })
            }
        }
    }

    async fn reject(&self, mut state: RequestState, error: AuthzError) -> Rejection {
        let phase = state.phase();
        let reason = RejectReason::from(&error);
        let route = self.route.name();
        state.pending_audit = None;
        state.transition(RequestPhase::Rejected(reason));

        log_rejection(&state.input.request_id, &route, &error);

        if !self.route.flags.quiet {
            let mut entry = AuditEntry::new(
                state.input.request_id.clone(),
                route.clone(),
                AuditOutcome::Rejected {
                    reason: format!("{:?}", reason),
                    status: error.outcome().status_code(),
                },
            );
            entry.user_id = state.principal.as_ref().map(|p| p.user_id);
            entry.tenant = state.tenant;
            entry.actions = state.actions.clone();

            if let Err(e) = self.audit.record(entry).await {
                warn!(request_id = %state.input.request_id, error = %e, "Failed to audit rejection");
            }
        }

        Rejection {
            request_id: state.input.request_id.clone(),
            redirect: matches!(error, AuthzError::Unauthenticated(_))
                && self.route.flags.redirect_on_auth_failure,
            route,
            error,
            phase,
            phases: state.history().to_vec(),
        }
    }
}

fn log_rejection(request_id: &str, route: &str, error: &AuthzError) {
    match error {
        AuthzError::Internal(_) | AuthzError::Context(_) | AuthzError::InvalidRoute { .. } => {
            error!(request_id, route, error = %error, "Request failed")
        }
        _ => warn!(request_id, route, error = %error, "Request rejected"),
    }
}

/// Race a stage against the cancellation token and the request deadline
async fn guarded<T, F>(
    work: F,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let expired = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthzError::Cancelled),
        _ = expired => Err(AuthzError::Cancelled),
        result = work => result,
    }
}
