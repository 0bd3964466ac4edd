//! Policy evaluation
//!
//! Default-deny. An action is allowed iff at least one statement bound to
//! the principal in the tenant covers its scope, permits its verb and
//! matches its resource. A multi-scope route is allowed only if every
//! action in the chain is allowed on its own.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cache::{PolicyCacheConfig, PolicyStore};
use super::loader::PolicyDocumentLoader;
use super::{Statement, TenantPolicy};
use crate::error::Result;
use crate::scope::ScopeType;
use crate::types::{PolicyId, Principal, RequestAction, ResourceId, TenantId, Verb};

/// Whether statements may grant scopes below the ones they name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceMode {
    /// A statement grants only the scopes it lists
    #[default]
    ScopeExact,
    /// Statements marked `applies_to_descendants` also grant every scope
    /// below a matching ancestor in the request chain
    DescendantGrants,
}

impl FromStr for InheritanceMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scope_exact" | "scope-exact" | "exact" => Ok(InheritanceMode::ScopeExact),
            "descendant_grants" | "descendant-grants" | "descendants" => {
                Ok(InheritanceMode::DescendantGrants)
            }
            other => Err(format!("unknown inheritance mode '{}'", other)),
        }
    }
}

impl fmt::Display for InheritanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InheritanceMode::ScopeExact => write!(f, "scope_exact"),
            InheritanceMode::DescendantGrants => write!(f, "descendant_grants"),
        }
    }
}

/// Statement that granted an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRef {
    pub policy: PolicyId,
    pub index: usize,
    /// Granted through an ancestor scope
    pub inherited: bool,
}

/// Outcome of evaluating one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub scope: ScopeType,
    pub verb: Verb,
    pub resource: ResourceId,
    pub matched: Option<StatementRef>,
    pub reason: String,
}

impl Decision {
    fn allow(action: &RequestAction, matched: StatementRef) -> Self {
        Self {
            allowed: true,
            scope: action.scope,
            verb: action.verb,
            resource: action.resource.clone(),
            reason: format!("granted by {}[{}]", matched.policy, matched.index),
            matched: Some(matched),
        }
    }

    fn deny(action: &RequestAction) -> Self {
        Self {
            allowed: false,
            scope: action.scope,
            verb: action.verb,
            resource: action.resource.clone(),
            matched: None,
            reason: format!(
                "no statement grants {} on {} '{}'",
                action.verb, action.scope, action.resource
            ),
        }
    }
}

/// Pure decision procedure over a loaded tenant policy
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEvaluator {
    inheritance: InheritanceMode,
}

impl PolicyEvaluator {
    pub fn new(inheritance: InheritanceMode) -> Self {
        Self { inheritance }
    }

    pub fn inheritance(&self) -> InheritanceMode {
        self.inheritance
    }

    /// Evaluate `chain[index]`; earlier elements are its ancestors
    ///
    /// Returns a denial when `index` is out of range.
    pub fn evaluate(
        &self,
        principal: &Principal,
        policy: &TenantPolicy,
        chain: &[RequestAction],
        index: usize,
    ) -> Decision {
        let Some(action) = chain.get(index) else {
            return Decision {
                allowed: false,
                scope: ScopeType::Project,
                verb: Verb::Read,
                resource: ResourceId::Numeric(0),
                matched: None,
                reason: format!("no action at chain position {}", index),
            };
        };
        let ancestors = &chain[..index];

        for document in policy.documents_for(principal) {
            for (i, statement) in document.statements.iter().enumerate() {
                let matched = |inherited| StatementRef {
                    policy: document.id.clone(),
                    index: i,
                    inherited,
                };

                if statement.grants(action) {
                    return Decision::allow(action, matched(false));
                }
                if self.grants_through_ancestor(statement, action, ancestors) {
                    return Decision::allow(action, matched(true));
                }
            }
        }

        Decision::deny(action)
    }

    /// Single action with no ancestors
    pub fn evaluate_action(
        &self,
        principal: &Principal,
        policy: &TenantPolicy,
        action: &RequestAction,
    ) -> Decision {
        self.evaluate(principal, policy, std::slice::from_ref(action), 0)
    }

    /// Conjunction over the chain: the first denial, or the leaf's grant
    ///
    /// An empty chain is denied.
    pub fn evaluate_chain(
        &self,
        principal: &Principal,
        policy: &TenantPolicy,
        chain: &[RequestAction],
    ) -> Decision {
        let mut decision = self.evaluate(principal, policy, chain, 0);

        for index in 1..chain.len() {
            if !decision.allowed {
                break;
            }
            decision = self.evaluate(principal, policy, chain, index);
        }

        decision
    }

    fn grants_through_ancestor(
        &self,
        statement: &Statement,
        action: &RequestAction,
        ancestors: &[RequestAction],
    ) -> bool {
        if self.inheritance != InheritanceMode::DescendantGrants
            || !statement.applies_to_descendants
            || !statement.permits(action.verb)
        {
            return false;
        }

        ancestors.iter().any(|ancestor| {
            statement.covers(ancestor.scope) && statement.resources.matches(&ancestor.resource)
        })
    }
}

/// Policy store plus evaluator: the `Evaluate` operation
pub struct PolicyEngine {
    store: PolicyStore,
    evaluator: PolicyEvaluator,
}

impl PolicyEngine {
    pub fn new(
        loader: Arc<dyn PolicyDocumentLoader>,
        cache: PolicyCacheConfig,
        inheritance: InheritanceMode,
    ) -> Self {
        Self {
            store: PolicyStore::new(loader, cache),
            evaluator: PolicyEvaluator::new(inheritance),
        }
    }

    /// Load the tenant's policy (the prefetch stage)
    pub async fn load(&self, tenant: TenantId) -> Result<Arc<TenantPolicy>> {
        self.store.load(tenant).await
    }

    /// Decide one action in the tenant
    pub async fn evaluate(
        &self,
        principal: &Principal,
        tenant: TenantId,
        action: &RequestAction,
    ) -> Result<Decision> {
        let policy = self.store.load(tenant).await?;
        let decision = self.evaluator.evaluate_action(principal, &policy, action);

        debug!(
            user_id = principal.user_id,
            tenant = %tenant,
            allowed = decision.allowed,
            reason = %decision.reason,
            "Policy evaluated"
        );

        Ok(decision)
    }

    /// Decide a whole chain in the tenant
    pub async fn evaluate_chain(
        &self,
        principal: &Principal,
        tenant: TenantId,
        chain: &[RequestAction],
    ) -> Result<Decision> {
        let policy = self.store.load(tenant).await?;
        Ok(self.evaluator.evaluate_chain(principal, &policy, chain))
    }

    pub fn evaluator(&self) -> &PolicyEvaluator {
        &self.evaluator
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }
}
