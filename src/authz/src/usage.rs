//! Usage metering for metered routes

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::types::TenantId;

/// Per-tenant usage accounting
#[async_trait]
pub trait UsageMeter: Send + Sync {
    /// Count one use of `metric`, failing if the tenant is at its limit
    async fn check_and_record(&self, tenant: TenantId, metric: &str) -> Result<()>;
}

/// Usage counters and limits held in memory
///
/// Metrics without a configured limit are unlimited.
#[derive(Default)]
pub struct InMemoryUsageMeter {
    limits: DashMap<(TenantId, String), u64>,
    usage: DashMap<(TenantId, String), u64>,
}

impl InMemoryUsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_limit(&self, tenant: TenantId, metric: impl Into<String>, limit: u64) {
        self.limits.insert((tenant, metric.into()), limit);
    }

    pub fn usage(&self, tenant: TenantId, metric: &str) -> u64 {
        self.usage
            .get(&(tenant, metric.to_string()))
            .map(|v| *v)
            .unwrap_or(0)
    }
}

#[async_trait]
impl UsageMeter for InMemoryUsageMeter {
    async fn check_and_record(&self, tenant: TenantId, metric: &str) -> Result<()> {
        let key = (tenant, metric.to_string());
        let limit = self.limits.get(&key).map(|v| *v);

        // The entry guard serializes concurrent increments for this key
        let mut used = self.usage.entry(key).or_insert(0);
        if let Some(limit) = limit {
            if *used >= limit {
                debug!(tenant = %tenant, metric, limit, "Usage limit reached");
                return Err(AuthzError::UsageLimitExceeded {
                    metric: metric.to_string(),
                });
            }
        }
        *used += 1;

        Ok(())
    }
}
