//! # Stratum Authorization Core
//!
//! Decides, for every API request of a multi-tenant control plane, whether
//! the authenticated principal may act on a nested resource such as
//! "release R in namespace N in cluster C in project P", and hands the
//! validated resource chain to the handler.
//!
//! ## Features
//!
//! - **Scope model** with startup validation of every route's chain
//! - **Parent-scoped resolvers**: an id that exists under another parent is
//!   never found
//! - **Default-deny, grant-only policies** evaluated per scope of the chain
//! - **Policy cache** with an explicit staleness bound and invalidation
//! - **Typed resolved-scope context** that fails fast on misuse
//! - **Cancellation** of every stage through a token and a request deadline
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stratum_authz::{
//!     AuditTrail, EngineConfig, InMemoryEntityStore, InMemoryPolicyLoader, PipelineBuilder,
//!     RequestInput, ResolverRegistry, StaticTokenAuthenticator,
//! };
//! use stratum_authz::scope::{Method, Route, ScopeTree, ScopeType};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let engine = Arc::new(config.policy_engine(Arc::new(InMemoryPolicyLoader::new())));
//!
//!     let builder = PipelineBuilder::new(
//!         Arc::new(ScopeTree::new()?),
//!         Arc::new(StaticTokenAuthenticator::new()),
//!         engine,
//!         ResolverRegistry::for_store(Arc::new(InMemoryEntityStore::new())),
//!         Arc::new(AuditTrail::default()),
//!     );
//!
//!     let route = Route::new(Method::Get, "/projects/{project_id}", [ScopeType::Project]);
//!     let pipeline = builder.build(Arc::new(route))?;
//!
//!     let input = RequestInput::new().param("project_id", "1");
//!     let rejection = pipeline.execute(input, CancellationToken::new()).await.unwrap_err();
//!     assert_eq!(rejection.status_code(), 401);
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod context;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod policy;
pub mod resolver;
pub mod scope;
pub mod types;
pub mod usage;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditOutcome, AuditSink, AuditTrail};
pub use context::{ResolvedScopeContext, ScopedEntity};
pub use error::{AuthzError, ContextError, Outcome, Result};
pub use model::ResolvedEntity;
pub use pipeline::{
    Authenticator, AuthorizedRequest, Dispatched, EngineConfig, Pipeline, PipelineBuilder,
    Rejection, RequestInput, RequestPhase, RouteHandler, StaticTokenAuthenticator,
};
pub use policy::{
    Consistency, Decision, InMemoryPolicyLoader, InheritanceMode, PolicyCacheConfig,
    PolicyDocument, PolicyDocumentLoader, PolicyEngine, PolicyEvaluator, Statement, TenantPolicy,
};
pub use resolver::{EntityResolver, EntityStore, InMemoryEntityStore, ResolverRegistry};
pub use types::{
    Credentials, PolicyId, Principal, RequestAction, ResourceId, RoleBinding, TenantId, UserId,
    Verb, VerbGrant,
};
pub use usage::{InMemoryUsageMeter, UsageMeter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
