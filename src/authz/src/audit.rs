//! Audit trail of authorization outcomes

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{RequestAction, TenantId, UserId};

/// Final verdict recorded for a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AuditOutcome {
    Authorized,
    Rejected { reason: String, status: u16 },
}

/// One audited request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub route: String,
    pub user_id: Option<UserId>,
    pub tenant: Option<TenantId>,
    pub actions: Vec<RequestAction>,
    pub outcome: AuditOutcome,
}

impl AuditEntry {
    pub fn new(request_id: impl Into<String>, route: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request_id: request_id.into(),
            route: route.into(),
            user_id: None,
            tenant: None,
            actions: Vec::new(),
            outcome,
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.outcome == AuditOutcome::Authorized
    }
}

/// Destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;
}

/// Bounded in-memory audit trail that also emits each entry as a log record
pub struct AuditTrail {
    entries: RwLock<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditTrail {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Most recent entries, oldest first
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn for_user(&self, user_id: UserId) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.user_id == Some(user_id))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl AuditSink for AuditTrail {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        match &entry.outcome {
            AuditOutcome::Authorized => info!(
                target: "audit",
                request_id = %entry.request_id,
                route = %entry.route,
                user_id = ?entry.user_id,
                tenant = ?entry.tenant,
                "authorized"
            ),
            AuditOutcome::Rejected { reason, status } => info!(
                target: "audit",
                request_id = %entry.request_id,
                route = %entry.route,
                user_id = ?entry.user_id,
                tenant = ?entry.tenant,
                reason = %reason,
                status,
                "rejected"
            ),
        }

        if self.capacity == 0 {
            return Ok(());
        }

        let mut entries = self.entries.write().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user_id: UserId) -> AuditEntry {
        let mut entry = AuditEntry::new("req-1", "GET /projects/{project_id}", AuditOutcome::Authorized);
        entry.user_id = Some(user_id);
        entry
    }

    #[tokio::test]
    async fn test_record_and_filter() {
        let trail = AuditTrail::new(10);
        trail.record(entry(1)).await.unwrap();
        trail.record(entry(2)).await.unwrap();

        assert_eq!(trail.len().await, 2);
        assert_eq!(trail.for_user(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_bounded() {
        let trail = AuditTrail::new(2);
        for user in 1..=3 {
            trail.record(entry(user)).await.unwrap();
        }

        let users: Vec<_> = trail.entries().await.iter().map(|e| e.user_id).collect();
        assert_eq!(users, vec![Some(2), Some(3)]);
    }

    #[test]
    fn test_outcome_json() {
        let outcome = AuditOutcome::Rejected {
            reason: "forbidden".into(),
            status: 403,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "rejected");
        assert_eq!(json["status"], 403);
    }
}
