//! Per-request pipeline state

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::context::{ResolvedScopeContext, ScopedEntity};
use crate::error::{AuthzError, ContextError, Outcome, Result};
use crate::model::ResolvedEntity;
use crate::policy::TenantPolicy;
use crate::scope::{Route, ScopeType};
use crate::types::{Credentials, Principal, RequestAction, TenantId};

/// Why a request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Unauthenticated,
    Malformed,
    NotFound,
    PolicyDenied,
    UsageLimitExceeded,
    Cancelled,
    Internal,
}

impl From<&AuthzError> for RejectReason {
    fn from(error: &AuthzError) -> Self {
        match error {
            AuthzError::Unauthenticated(_) => RejectReason::Unauthenticated,
            AuthzError::Malformed { .. } => RejectReason::Malformed,
            AuthzError::NotFound { .. } => RejectReason::NotFound,
            AuthzError::PolicyDenied { .. } => RejectReason::PolicyDenied,
            AuthzError::UsageLimitExceeded { .. } => RejectReason::UsageLimitExceeded,
            AuthzError::Cancelled => RejectReason::Cancelled,
            AuthzError::Internal(_) | AuthzError::InvalidRoute { .. } | AuthzError::Context(_) => {
                RejectReason::Internal
            }
        }
    }
}

/// Request state machine
///
/// `Unauthenticated -> Authenticated -> ScopeResolving(0..n) -> Authorized
/// -> Dispatched`, with any state able to move to the terminal `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    Unauthenticated,
    Authenticated,
    ScopeResolving(usize),
    Authorized,
    Dispatched,
    Rejected(RejectReason),
}

impl RequestPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestPhase::Dispatched | RequestPhase::Rejected(_))
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestPhase::Unauthenticated => write!(f, "unauthenticated"),
            RequestPhase::Authenticated => write!(f, "authenticated"),
            RequestPhase::ScopeResolving(i) => write!(f, "scope_resolving({})", i),
            RequestPhase::Authorized => write!(f, "authorized"),
            RequestPhase::Dispatched => write!(f, "dispatched"),
            RequestPhase::Rejected(reason) => write!(f, "rejected({:?})", reason),
        }
    }
}

/// What the transport hands the pipeline
#[derive(Debug, Clone)]
pub struct RequestInput {
    pub request_id: String,
    pub credentials: Credentials,
    /// Path parameters by name
    pub params: HashMap<String, String>,
    /// Client asked for a long-lived connection upgrade
    pub upgrade: bool,
}

impl Default for RequestInput {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            credentials: Credentials::None,
            params: HashMap::new(),
            upgrade: false,
        }
    }
}

impl RequestInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.credentials = Credentials::Bearer(token.into());
        self
    }

    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.credentials = Credentials::Session(session.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn upgrade(mut self) -> Self {
        self.upgrade = true;
        self
    }
}

/// Mutable state threaded through the stages of one request
pub struct RequestState {
    pub input: RequestInput,
    pub route: Arc<Route>,
    pub principal: Option<Principal>,
    pub tenant: Option<TenantId>,
    pub policy: Option<Arc<TenantPolicy>>,
    /// Authorized actions so far, root first
    pub actions: Vec<RequestAction>,
    pub context: ResolvedScopeContext,
    /// Written once every stage has passed, dropped on rejection
    pub pending_audit: Option<AuditEntry>,
    phase: RequestPhase,
    history: Vec<RequestPhase>,
}

impl RequestState {
    pub fn new(route: Arc<Route>, input: RequestInput) -> Self {
        let context = ResolvedScopeContext::new(&route.chain);

        Self {
            input,
            route,
            principal: None,
            tenant: None,
            policy: None,
            actions: Vec::new(),
            context,
            pending_audit: None,
            phase: RequestPhase::Unauthenticated,
            history: vec![RequestPhase::Unauthenticated],
        }
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    pub fn history(&self) -> &[RequestPhase] {
        &self.history
    }

    pub(crate) fn transition(&mut self, next: RequestPhase) {
        if self.phase != next {
            self.phase = next;
            self.history.push(next);
        }
    }

    /// Authenticated principal, required by every stage after authentication
    pub fn principal(&self) -> Result<&Principal> {
        self.principal
            .as_ref()
            .ok_or_else(|| AuthzError::Internal("principal not established".to_string()))
    }

    /// Raw path parameter of a scope
    pub fn raw_identifier(&self, scope: ScopeType) -> Result<&str> {
        let param = scope
            .path_param()
            .ok_or_else(|| AuthzError::malformed(scope, "", "scope carries no identifier"))?;

        self.input
            .params
            .get(param)
            .map(String::as_str)
            .ok_or_else(|| AuthzError::malformed(scope, "", format!("missing path parameter {}", param)))
    }
}

/// A request that passed every stage
#[derive(Debug, Clone)]
pub struct AuthorizedRequest {
    pub request_id: String,
    pub route: Arc<Route>,
    pub principal: Principal,
    pub tenant: Option<TenantId>,
    pub actions: Vec<RequestAction>,
    pub context: ResolvedScopeContext,
    pub phases: Vec<RequestPhase>,
}

impl AuthorizedRequest {
    /// Typed accessor for a resolved scope
    pub fn get<T: ScopedEntity>(&self) -> std::result::Result<&T, ContextError> {
        self.context.get::<T>()
    }

    pub fn get_resolved(&self, scope: ScopeType) -> std::result::Result<&ResolvedEntity, ContextError> {
        self.context.get_resolved(scope)
    }
}

/// A request stopped by a stage
#[derive(Debug)]
pub struct Rejection {
    pub request_id: String,
    pub route: String,
    pub error: AuthzError,
    /// Phase the request was in when it failed
    pub phase: RequestPhase,
    /// Send the client to the login page instead of answering 401
    pub redirect: bool,
    pub phases: Vec<RequestPhase>,
}

impl Rejection {
    pub fn outcome(&self) -> Outcome {
        self.error.outcome()
    }

    pub fn reason(&self) -> RejectReason {
        RejectReason::from(&self.error)
    }

    pub fn status_code(&self) -> u16 {
        self.outcome().status_code()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rejected at {}: {}", self.route, self.phase, self.error)
    }
}

/// Business logic behind a route; runs only after full authorization
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: &AuthorizedRequest) -> Result<serde_json::Value>;
}

/// A request that reached its handler
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub request: AuthorizedRequest,
    pub body: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Method;

    #[test]
    fn test_transitions_recorded_once() {
        let route = Arc::new(Route::new(Method::Get, "/projects/{project_id}", [ScopeType::Project]));
        let mut state = RequestState::new(route, RequestInput::new());

        state.transition(RequestPhase::Authenticated);
        state.transition(RequestPhase::Authenticated);
        state.transition(RequestPhase::ScopeResolving(0));

        assert_eq!(
            state.history(),
            &[
                RequestPhase::Unauthenticated,
                RequestPhase::Authenticated,
                RequestPhase::ScopeResolving(0),
            ]
        );
    }

    #[test]
    fn test_missing_param_is_malformed() {
        let route = Arc::new(Route::new(Method::Get, "/projects/{project_id}", [ScopeType::Project]));
        let state = RequestState::new(route, RequestInput::new().param("cluster_id", "1"));

        assert!(matches!(
            state.raw_identifier(ScopeType::Project),
            Err(AuthzError::Malformed { scope: ScopeType::Project, .. })
        ));
        assert!(state.principal().is_err());
    }

    #[test]
    fn test_reject_reason_mapping() {
        assert_eq!(
            RejectReason::from(&AuthzError::Cancelled),
            RejectReason::Cancelled
        );
        assert_eq!(
            RejectReason::from(&AuthzError::from(ContextError::Unresolved(ScopeType::Cluster))),
            RejectReason::Internal
        );
        assert!(RequestPhase::Rejected(RejectReason::Malformed).is_terminal());
        assert!(!RequestPhase::Authorized.is_terminal());
    }
}
