//! In-memory entity store

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{EntityStore, StoreError, StoreResult};
use crate::model::{
    Cluster, GitInstallation, HelmRepo, Infra, Invite, Namespace, Operation, Project, Registry,
    Release,
};

#[derive(Default)]
struct Tables {
    projects: HashMap<u64, Project>,
    clusters: HashMap<u64, Cluster>,
    namespaces: HashMap<(u64, String), Namespace>,
    releases: HashMap<(u64, String, String), Release>,
    registries: HashMap<u64, Registry>,
    infras: HashMap<u64, Infra>,
    invites: HashMap<u64, Invite>,
    git_installations: HashMap<u64, GitInstallation>,
    helm_repos: HashMap<u64, HelmRepo>,
    operations: HashMap<String, Operation>,
}

/// Entity store held in memory
///
/// Every lookup filters by the parent key, the way a
/// `WHERE parent_id = ? AND id = ?` query would. Supports fault injection
/// and artificial latency for tests.
#[derive(Default)]
pub struct InMemoryEntityStore {
    tables: RwLock<Tables>,
    failing: AtomicBool,
    latency_ms: AtomicU64,
    lookups: AtomicUsize,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_project(&self, project: Project) {
        self.tables.write().await.projects.insert(project.id, project);
    }

    pub async fn insert_cluster(&self, cluster: Cluster) {
        self.tables.write().await.clusters.insert(cluster.id, cluster);
    }

    pub async fn insert_namespace(&self, namespace: Namespace) {
        let key = (namespace.cluster_id, namespace.name.clone());
        self.tables.write().await.namespaces.insert(key, namespace);
    }

    pub async fn insert_release(&self, release: Release) {
        let key = (
            release.cluster_id,
            release.namespace.clone(),
            release.name.clone(),
        );
        self.tables.write().await.releases.insert(key, release);
    }

    pub async fn insert_registry(&self, registry: Registry) {
        self.tables.write().await.registries.insert(registry.id, registry);
    }

    pub async fn insert_infra(&self, infra: Infra) {
        self.tables.write().await.infras.insert(infra.id, infra);
    }

    pub async fn insert_invite(&self, invite: Invite) {
        self.tables.write().await.invites.insert(invite.id, invite);
    }

    pub async fn insert_git_installation(&self, installation: GitInstallation) {
        self.tables
            .write()
            .await
            .git_installations
            .insert(installation.id, installation);
    }

    pub async fn insert_helm_repo(&self, repo: HelmRepo) {
        self.tables.write().await.helm_repos.insert(repo.id, repo);
    }

    pub async fn insert_operation(&self, operation: Operation) {
        self.tables
            .write()
            .await
            .operations
            .insert(operation.uid.clone(), operation);
    }

    /// Make every subsequent lookup fail with a storage error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every lookup by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn begin(&self) -> StoreResult<()> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected fault".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn project(&self, id: u64) -> StoreResult<Option<Project>> {
        self.begin().await?;
        Ok(self.tables.read().await.projects.get(&id).cloned())
    }

    async fn cluster(&self, project_id: u64, id: u64) -> StoreResult<Option<Cluster>> {
        self.begin().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .clusters
            .get(&id)
            .filter(|c| c.project_id == project_id)
            .cloned())
    }

    async fn namespace(&self, cluster_id: u64, name: &str) -> StoreResult<Option<Namespace>> {
        self.begin().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .namespaces
            .get(&(cluster_id, name.to_string()))
            .cloned())
    }

    async fn release(
        &self,
        cluster_id: u64,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<Release>> {
        self.begin().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .releases
            .get(&(cluster_id, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn registry(&self, project_id: u64, id: u64) -> StoreResult<Option<Registry>> {
        self.begin().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .registries
            .get(&id)
            .filter(|r| r.project_id == project_id)
            .cloned())
    }

    async fn infra(&self, project_id: u64, id: u64) -> StoreResult<Option<Infra>> {
        self.begin().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .infras
            .get(&id)
            .filter(|i| i.project_id == project_id)
            .cloned())
    }

    async fn invite(&self, project_id: u64, id: u64) -> StoreResult<Option<Invite>> {
        self.begin().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .invites
            .get(&id)
            .filter(|i| i.project_id == project_id)
            .cloned())
    }

    async fn git_installation(
        &self,
        project_id: u64,
        id: u64,
    ) -> StoreResult<Option<GitInstallation>> {
        self.begin().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .git_installations
            .get(&id)
            .filter(|g| g.project_id == project_id)
            .cloned())
    }

    async fn helm_repo(&self, project_id: u64, id: u64) -> StoreResult<Option<HelmRepo>> {
        self.begin().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .helm_repos
            .get(&id)
            .filter(|h| h.project_id == project_id)
            .cloned())
    }

    async fn operation(&self, infra_id: u64, uid: &str) -> StoreResult<Option<Operation>> {
        self.begin().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .operations
            .get(uid)
            .filter(|o| o.infra_id == infra_id)
            .cloned())
    }
}
