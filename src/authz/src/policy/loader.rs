//! Policy document loading

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PolicyDocument, TenantPolicy};
use crate::error::{AuthzError, Result};
use crate::types::{PolicyId, TenantId};

/// Source of a tenant's policy documents
#[async_trait]
pub trait PolicyDocumentLoader: Send + Sync {
    /// Load every document of the tenant
    ///
    /// A tenant with no documents yields an empty policy, which denies
    /// everything. Storage failures are `Internal`.
    async fn load(&self, tenant: TenantId) -> Result<TenantPolicy>;
}

/// In-memory policy document loader
#[derive(Default)]
pub struct InMemoryPolicyLoader {
    documents: RwLock<HashMap<TenantId, BTreeMap<PolicyId, PolicyDocument>>>,
    failing: AtomicBool,
    latency_ms: AtomicU64,
    loads: AtomicUsize,
}

impl InMemoryPolicyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace a document
    pub async fn put_document(&self, document: PolicyDocument) {
        let mut documents = self.documents.write().await;
        documents
            .entry(document.tenant)
            .or_default()
            .insert(document.id.clone(), document);
    }

    /// Remove a document, returning it if present
    pub async fn remove_document(&self, tenant: TenantId, id: &str) -> Option<PolicyDocument> {
        let mut documents = self.documents.write().await;
        documents.get_mut(&tenant).and_then(|docs| docs.remove(id))
    }

    pub async fn document(&self, tenant: TenantId, id: &str) -> Option<PolicyDocument> {
        let documents = self.documents.read().await;
        documents.get(&tenant).and_then(|docs| docs.get(id)).cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of loads served so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyDocumentLoader for InMemoryPolicyLoader {
    async fn load(&self, tenant: TenantId) -> Result<TenantPolicy> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthzError::Internal(format!(
                "policy storage unavailable for tenant {}",
                tenant
            )));
        }

        let documents = self.documents.read().await;
        Ok(TenantPolicy {
            tenant,
            documents: documents.get(&tenant).cloned().unwrap_or_default(),
        })
    }
}
