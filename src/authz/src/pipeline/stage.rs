//! Pipeline stages
//!
//! Each stage is an object built once per route. The pipeline runs them in
//! order and stops at the first error.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::authn::Authenticator;
use super::state::RequestState;
use crate::audit::{AuditEntry, AuditOutcome};
use crate::error::{AuthzError, Result};
use crate::model::{ResolvedEntity, StructuralScope, User};
use crate::policy::PolicyEngine;
use crate::resolver::EntityResolver;
use crate::scope::ScopeType;
use crate::types::{RequestAction, TenantId, Verb};
use crate::usage::UsageMeter;

/// Stage identity, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Authenticate,
    PolicyPrefetch,
    ResolveScope(ScopeType),
    AuditLog,
    UsageMeter,
    StreamingUpgrade,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Authenticate => write!(f, "authenticate"),
            StageKind::PolicyPrefetch => write!(f, "policy_prefetch"),
            StageKind::ResolveScope(scope) => write!(f, "resolve_scope({})", scope),
            StageKind::AuditLog => write!(f, "audit_log"),
            StageKind::UsageMeter => write!(f, "usage_meter"),
            StageKind::StreamingUpgrade => write!(f, "streaming_upgrade"),
        }
    }
}

/// One step of a route's pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, state: &mut RequestState) -> Result<()>;
}

/// Establish the principal
pub struct AuthenticateStage {
    authenticator: Arc<dyn Authenticator>,
}

impl AuthenticateStage {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }
}

#[async_trait]
impl Stage for AuthenticateStage {
    fn kind(&self) -> StageKind {
        StageKind::Authenticate
    }

    async fn run(&self, state: &mut RequestState) -> Result<()> {
        let principal = self
            .authenticator
            .authenticate(&state.input.credentials)
            .await?;

        debug!(
            request_id = %state.input.request_id,
            user_id = principal.user_id,
            "Principal authenticated"
        );
        state.principal = Some(principal);
        Ok(())
    }
}

/// Load the tenant's policy once, before any scope is resolved
pub struct PolicyPrefetchStage {
    engine: Arc<PolicyEngine>,
}

impl PolicyPrefetchStage {
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Stage for PolicyPrefetchStage {
    fn kind(&self) -> StageKind {
        StageKind::PolicyPrefetch
    }

    async fn run(&self, state: &mut RequestState) -> Result<()> {
        let raw = state.raw_identifier(ScopeType::Project)?;
        let tenant = match ScopeType::Project.parse_identifier(raw)?.as_u64() {
            Some(id) => TenantId(id),
            None => return Err(AuthzError::malformed(ScopeType::Project, raw, "expected a numeric id")),
        };

        let policy = self.engine.load(tenant).await?;

        state.tenant = Some(tenant);
        state.policy = Some(policy);
        Ok(())
    }
}

/// Authorize, resolve and publish one chain element
///
/// Policy is checked before storage is touched, so a denied principal
/// learns nothing from lookup latency. After the lookup the entity's stored
/// parent is compared with the parent resolved for this request.
pub struct ResolveScopeStage {
    scope: ScopeType,
    verb: Verb,
    engine: Arc<PolicyEngine>,
    resolver: Option<Arc<dyn EntityResolver>>,
}

impl ResolveScopeStage {
    pub fn new(
        scope: ScopeType,
        verb: Verb,
        engine: Arc<PolicyEngine>,
        resolver: Option<Arc<dyn EntityResolver>>,
    ) -> Self {
        Self {
            scope,
            verb,
            engine,
            resolver,
        }
    }

    fn authorize(&self, state: &RequestState) -> Result<()> {
        let principal = state.principal()?;
        let policy = state
            .policy
            .as_ref()
            .ok_or_else(|| AuthzError::Internal("tenant policy not loaded".to_string()))?;

        let index = state.actions.len() - 1;
        let decision = self
            .engine
            .evaluator()
            .evaluate(principal, policy, &state.actions, index);

        if decision.allowed {
            debug!(
                request_id = %state.input.request_id,
                scope = %self.scope,
                reason = %decision.reason,
                "Scope authorized"
            );
            Ok(())
        } else {
            Err(AuthzError::PolicyDenied {
                scope: decision.scope,
                verb: decision.verb,
                id: decision.resource.to_string(),
            })
        }
    }
}

#[async_trait]
impl Stage for ResolveScopeStage {
    fn kind(&self) -> StageKind {
        StageKind::ResolveScope(self.scope)
    }

    async fn run(&self, state: &mut RequestState) -> Result<()> {
        // The user scope is authentication only
        if self.scope == ScopeType::User {
            let principal = state.principal()?;
            let user = ResolvedEntity::User(User {
                id: principal.user_id,
                email: principal.email.clone(),
            });
            state.context.publish(user)?;
            return Ok(());
        }

        let raw = state.raw_identifier(self.scope)?;
        let id = self.scope.parse_identifier(raw)?;

        state
            .actions
            .push(RequestAction::new(self.scope, id.clone(), self.verb));
        self.authorize(state)?;

        let entity = match &self.resolver {
            Some(resolver) => resolver.resolve(&state.context, &id).await?,
            None if !self.scope.is_persisted() => ResolvedEntity::Structural(StructuralScope {
                scope: self.scope,
                id: id.clone(),
            }),
            None => {
                return Err(AuthzError::Internal(format!(
                    "no resolver registered for {}",
                    self.scope
                )))
            }
        };

        let not_found = || AuthzError::NotFound {
            scope: self.scope,
            id: id.to_string(),
        };

        if entity.scope() != self.scope || entity.key() != id {
            return Err(not_found());
        }
        if let Some(parent) = state.context.parent_of(self.scope) {
            if !entity.is_contained_in(parent) {
                debug!(
                    request_id = %state.input.request_id,
                    scope = %self.scope,
                    id = %id,
                    "Entity is not contained in the resolved parent"
                );
                return Err(not_found());
            }
        }

        state.context.publish(entity)?;
        Ok(())
    }
}

/// Prepare the audit record of an authorized request
///
/// The entry is written by the pipeline after the last stage passes, so a
/// request rejected by a later stage leaves only its rejection behind.
pub struct AuditLogStage;

#[async_trait]
impl Stage for AuditLogStage {
    fn kind(&self) -> StageKind {
        StageKind::AuditLog
    }

    async fn run(&self, state: &mut RequestState) -> Result<()> {
        let mut entry = AuditEntry::new(
            state.input.request_id.clone(),
            state.route.name(),
            AuditOutcome::Authorized,
        );
        entry.user_id = state.principal.as_ref().map(|p| p.user_id);
        entry.tenant = state.tenant;
        entry.actions = state.actions.clone();

        state.pending_audit = Some(entry);
        Ok(())
    }
}

/// Count the request against the tenant's usage limit
pub struct UsageMeterStage {
    meter: Arc<dyn UsageMeter>,
    metric: String,
}

impl UsageMeterStage {
    pub fn new(meter: Arc<dyn UsageMeter>, metric: impl Into<String>) -> Self {
        Self {
            meter,
            metric: metric.into(),
        }
    }
}

#[async_trait]
impl Stage for UsageMeterStage {
    fn kind(&self) -> StageKind {
        StageKind::UsageMeter
    }

    async fn run(&self, state: &mut RequestState) -> Result<()> {
        let tenant = state
            .tenant
            .ok_or_else(|| AuthzError::Internal("metered route has no tenant".to_string()))?;

        self.meter.check_and_record(tenant, &self.metric).await
    }
}

/// Require an upgrade intent on long-lived connections
pub struct StreamingUpgradeStage;

#[async_trait]
impl Stage for StreamingUpgradeStage {
    fn kind(&self) -> StageKind {
        StageKind::StreamingUpgrade
    }

    async fn run(&self, state: &mut RequestState) -> Result<()> {
        if state.input.upgrade {
            return Ok(());
        }

        let scope = state.route.leaf().unwrap_or(ScopeType::User);
        Err(AuthzError::malformed(
            scope,
            "",
            "streaming route requires a connection upgrade",
        ))
    }
}
