//! Tenant policy cache with an explicit staleness contract

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::loader::PolicyDocumentLoader;
use super::TenantPolicy;
use crate::error::Result;
use crate::types::TenantId;

/// How long a revoked grant may keep taking effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Load on every request; revocation is immediate
    Uncached,
    /// Serve cached documents for at most this long
    Ttl(Duration),
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct PolicyCacheConfig {
    pub consistency: Consistency,

    /// Maximum number of tenants held
    pub capacity: usize,
}

impl Default for PolicyCacheConfig {
    fn default() -> Self {
        Self {
            consistency: Consistency::Ttl(Duration::from_secs(30)),
            capacity: 10_000,
        }
    }
}

impl PolicyCacheConfig {
    pub fn uncached() -> Self {
        Self {
            consistency: Consistency::Uncached,
            ..Default::default()
        }
    }

    pub fn ttl(ttl: Duration) -> Self {
        Self {
            consistency: Consistency::Ttl(ttl),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
struct CachedPolicy {
    policy: Arc<TenantPolicy>,
    loaded_at: Instant,
}

impl CachedPolicy {
    fn new(policy: Arc<TenantPolicy>) -> Self {
        Self {
            policy,
            loaded_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() >= ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub invalidations: usize,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Concurrent tenant → policy cache
///
/// Readers never block each other. Invalidation bumps an epoch so a load
/// that started before the invalidation is not cached afterwards.
pub struct PolicyCache {
    entries: DashMap<TenantId, CachedPolicy>,
    config: PolicyCacheConfig,
    epoch: AtomicU64,
    stats: DashMap<String, usize>,
}

impl PolicyCache {
    pub fn new(config: PolicyCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            epoch: AtomicU64::new(0),
            stats: DashMap::new(),
        }
    }

    pub fn consistency(&self) -> Consistency {
        self.config.consistency
    }

    /// Fresh cached policy for the tenant, if any
    pub fn get(&self, tenant: TenantId) -> Option<Arc<TenantPolicy>> {
        let Consistency::Ttl(ttl) = self.config.consistency else {
            self.increment_stat("misses");
            return None;
        };

        if let Some(entry) = self.entries.get(&tenant) {
            if !entry.is_expired(ttl) {
                self.increment_stat("hits");
                return Some(entry.policy.clone());
            }
        } else {
            self.increment_stat("misses");
            return None;
        }

        if self.remove_expired(tenant, ttl) {
            self.increment_stat("expirations");
        }
        self.increment_stat("misses");
        None
    }

    /// Remove the tenant's entry only if it is still expired under the
    /// shard lock; a refill that raced in is kept
    fn remove_expired(&self, tenant: TenantId, ttl: Duration) -> bool {
        self.entries
            .remove_if(&tenant, |_, entry| entry.is_expired(ttl))
            .is_some()
    }

    /// Current invalidation epoch, to pair with [`PolicyCache::put_if_current`]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Cache a policy loaded at `epoch`, unless an invalidation happened since
    pub fn put_if_current(&self, tenant: TenantId, policy: Arc<TenantPolicy>, epoch: u64) {
        if self.config.consistency == Consistency::Uncached {
            return;
        }
        if self.epoch() != epoch {
            debug!(tenant = %tenant, "Discarding policy loaded before invalidation");
            return;
        }

        if self.entries.len() >= self.config.capacity && !self.entries.contains_key(&tenant) {
            self.evict_oldest();
        }

        self.entries.insert(tenant, CachedPolicy::new(policy));
    }

    /// Drop one tenant's cached documents
    pub fn invalidate(&self, tenant: TenantId) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(&tenant);
        self.increment_stat("invalidations");
        debug!(tenant = %tenant, "Policy cache invalidated");
    }

    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        self.increment_stat("invalidations");
        debug!("Policy cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            invalidations: self.get_stat("invalidations"),
            entries: self.entries.len(),
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.loaded_at)
            .map(|entry| *entry.key());

        if let Some(tenant) = oldest {
            self.entries.remove(&tenant);
        }
    }

    fn increment_stat(&self, key: &str) {
        self.stats
            .entry(key.to_string())
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

/// Loader plus cache: the `LoadPolicy` operation
pub struct PolicyStore {
    loader: Arc<dyn PolicyDocumentLoader>,
    cache: PolicyCache,
}

impl PolicyStore {
    pub fn new(loader: Arc<dyn PolicyDocumentLoader>, config: PolicyCacheConfig) -> Self {
        Self {
            loader,
            cache: PolicyCache::new(config),
        }
    }

    /// Tenant policy, from cache when fresh
    pub async fn load(&self, tenant: TenantId) -> Result<Arc<TenantPolicy>> {
        if let Some(policy) = self.cache.get(tenant) {
            return Ok(policy);
        }

        let epoch = self.cache.epoch();
        let policy = Arc::new(self.loader.load(tenant).await?);
        debug!(
            tenant = %tenant,
            documents = policy.documents.len(),
            "Loaded tenant policy"
        );

        self.cache.put_if_current(tenant, policy.clone(), epoch);
        Ok(policy)
    }

    /// Call after a role binding or document of the tenant changes
    pub fn invalidate(&self, tenant: TenantId) {
        self.cache.invalidate(tenant);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn cache(&self) -> &PolicyCache {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
