//! Entity resolvers
//!
//! One resolver per persisted scope turns a parsed identifier into an
//! entity, looked up under the parent already resolved for the request.

mod memory;
mod store;

pub use memory::InMemoryEntityStore;
pub use store::{EntityStore, StoreError, StoreResolver, StoreResult};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::ResolvedScopeContext;
use crate::error::Result;
use crate::model::ResolvedEntity;
use crate::scope::ScopeType;
use crate::types::ResourceId;

/// Loads and validates the entity of one scope
#[async_trait]
pub trait EntityResolver: Send + Sync {
    fn scope(&self) -> ScopeType;

    /// Look up `id` under the parent entities in `ctx`
    ///
    /// # Errors
    ///
    /// `NotFound` if no such entity exists under that parent, `Internal` on
    /// storage failure, `Context` if the parent has not been resolved.
    async fn resolve(&self, ctx: &ResolvedScopeContext, id: &ResourceId)
        -> Result<ResolvedEntity>;

    /// Parse a raw path segment, then resolve it
    async fn resolve_raw(&self, ctx: &ResolvedScopeContext, raw: &str) -> Result<ResolvedEntity> {
        let id = self.scope().parse_identifier(raw)?;
        self.resolve(ctx, &id).await
    }
}

/// Resolvers keyed by the scope they serve
#[derive(Default, Clone)]
pub struct ResolverRegistry {
    resolvers: HashMap<ScopeType, Arc<dyn EntityResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`StoreResolver`] for every persisted scope except `User`
    pub fn for_store(store: Arc<dyn EntityStore>) -> Self {
        let mut registry = Self::new();

        for scope in ScopeType::ALL {
            if scope.is_persisted() {
                registry.register(Arc::new(StoreResolver::new(scope, store.clone())));
            }
        }

        registry
    }

    /// Register a resolver, replacing any previous one for its scope
    pub fn register(&mut self, resolver: Arc<dyn EntityResolver>) {
        let scope = resolver.scope();
        debug!(scope = %scope, "Registering entity resolver");
        self.resolvers.insert(scope, resolver);
    }

    pub fn with(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.register(resolver);
        self
    }

    pub fn get(&self, scope: ScopeType) -> Option<Arc<dyn EntityResolver>> {
        self.resolvers.get(&scope).cloned()
    }

    pub fn contains(&self, scope: ScopeType) -> bool {
        self.resolvers.contains_key(&scope)
    }
}
