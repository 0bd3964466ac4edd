//! Persistence boundary consumed by the resolvers

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::error;

use super::EntityResolver;
use crate::context::ResolvedScopeContext;
use crate::error::{AuthzError, Result};
use crate::model::{
    Cluster, GitInstallation, HelmRepo, Infra, Invite, Namespace, Operation, Project, Registry,
    Release, ResolvedEntity,
};
use crate::scope::ScopeType;
use crate::types::ResourceId;

/// Storage failure unrelated to whether an entity exists
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Narrow lookups, each keyed by the immediate parent
///
/// `Ok(None)` means the entity does not exist under that parent; it is
/// never looked up globally.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn project(&self, id: u64) -> StoreResult<Option<Project>>;

    async fn cluster(&self, project_id: u64, id: u64) -> StoreResult<Option<Cluster>>;

    async fn namespace(&self, cluster_id: u64, name: &str) -> StoreResult<Option<Namespace>>;

    async fn release(
        &self,
        cluster_id: u64,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<Release>>;

    async fn registry(&self, project_id: u64, id: u64) -> StoreResult<Option<Registry>>;

    async fn infra(&self, project_id: u64, id: u64) -> StoreResult<Option<Infra>>;

    async fn invite(&self, project_id: u64, id: u64) -> StoreResult<Option<Invite>>;

    async fn git_installation(
        &self,
        project_id: u64,
        id: u64,
    ) -> StoreResult<Option<GitInstallation>>;

    async fn helm_repo(&self, project_id: u64, id: u64) -> StoreResult<Option<HelmRepo>>;

    async fn operation(&self, infra_id: u64, uid: &str) -> StoreResult<Option<Operation>>;
}

/// Resolver for one persisted scope backed by an [`EntityStore`]
pub struct StoreResolver {
    scope: ScopeType,
    store: Arc<dyn EntityStore>,
}

impl StoreResolver {
    pub fn new(scope: ScopeType, store: Arc<dyn EntityStore>) -> Self {
        Self { scope, store }
    }

    fn numeric(&self, id: &ResourceId) -> Result<u64> {
        id.as_u64().ok_or_else(|| {
            AuthzError::malformed(self.scope, &id.to_string(), "expected a numeric id")
        })
    }

    fn name<'a>(&self, id: &'a ResourceId) -> Result<&'a str> {
        id.as_name().ok_or_else(|| {
            AuthzError::malformed(self.scope, &id.to_string(), "expected a name")
        })
    }

    async fn lookup(
        &self,
        ctx: &ResolvedScopeContext,
        id: &ResourceId,
    ) -> StoreLookup {
        let store = &self.store;

        let found = match self.scope {
            ScopeType::Project => {
                let id = self.numeric(id)?;
                store.project(id).await.map(|e| e.map(ResolvedEntity::Project))
            }
            ScopeType::Cluster => {
                let project = ctx.get::<Project>()?.id;
                let id = self.numeric(id)?;
                store.cluster(project, id).await.map(|e| e.map(ResolvedEntity::Cluster))
            }
            ScopeType::Namespace => {
                let cluster = ctx.get::<Cluster>()?.id;
                let name = self.name(id)?;
                store.namespace(cluster, name).await.map(|e| e.map(ResolvedEntity::Namespace))
            }
            ScopeType::Release => {
                let namespace = ctx.get::<Namespace>()?;
                let name = self.name(id)?;
                store
                    .release(namespace.cluster_id, &namespace.name, name)
                    .await
                    .map(|e| e.map(ResolvedEntity::Release))
            }
            ScopeType::Registry => {
                let project = ctx.get::<Project>()?.id;
                let id = self.numeric(id)?;
                store.registry(project, id).await.map(|e| e.map(ResolvedEntity::Registry))
            }
            ScopeType::Infra => {
                let project = ctx.get::<Project>()?.id;
                let id = self.numeric(id)?;
                store.infra(project, id).await.map(|e| e.map(ResolvedEntity::Infra))
            }
            ScopeType::Invite => {
                let project = ctx.get::<Project>()?.id;
                let id = self.numeric(id)?;
                store.invite(project, id).await.map(|e| e.map(ResolvedEntity::Invite))
            }
            ScopeType::GitInstallation => {
                let project = ctx.get::<Project>()?.id;
                let id = self.numeric(id)?;
                store
                    .git_installation(project, id)
                    .await
                    .map(|e| e.map(ResolvedEntity::GitInstallation))
            }
            ScopeType::HelmRepo => {
                let project = ctx.get::<Project>()?.id;
                let id = self.numeric(id)?;
                store.helm_repo(project, id).await.map(|e| e.map(ResolvedEntity::HelmRepo))
            }
            ScopeType::Operation => {
                let infra = ctx.get::<Infra>()?.id;
                let uid = self.name(id)?;
                store.operation(infra, uid).await.map(|e| e.map(ResolvedEntity::Operation))
            }
            scope => {
                return Err(AuthzError::Internal(format!(
                    "scope {} is not backed by storage",
                    scope
                )))
            }
        };

        Ok(found)
    }
}

type StoreLookup = Result<StoreResult<Option<ResolvedEntity>>>;

#[async_trait]
impl EntityResolver for StoreResolver {
    fn scope(&self) -> ScopeType {
        self.scope
    }

    async fn resolve(
        &self,
        ctx: &ResolvedScopeContext,
        id: &ResourceId,
    ) -> Result<ResolvedEntity> {
        match self.lookup(ctx, id).await? {
            Ok(Some(entity)) => Ok(entity),
            Ok(None) => Err(AuthzError::NotFound {
                scope: self.scope,
                id: id.to_string(),
            }),
            Err(e) => {
                error!(scope = %self.scope, id = %id, error = %e, "Entity lookup failed");
                Err(AuthzError::Internal(format!("{} lookup failed: {}", self.scope, e)))
            }
        }
    }
}
