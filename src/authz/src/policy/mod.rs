//! Tenant policy documents
//!
//! A document belongs to one tenant and holds grant-only statements. There
//! is no deny statement: a request is denied when nothing grants it.

mod cache;
mod evaluator;
mod loader;

pub use cache::{CacheStats, Consistency, PolicyCache, PolicyCacheConfig, PolicyStore};
pub use evaluator::{Decision, InheritanceMode, PolicyEngine, PolicyEvaluator, StatementRef};
pub use loader::{InMemoryPolicyLoader, PolicyDocumentLoader};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::scope::ScopeType;
use crate::types::{PolicyId, Principal, RequestAction, ResourceId, TenantId, Verb, VerbGrant};

/// Which resources of a scope a statement covers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFilter {
    #[default]
    All,
    Ids(BTreeSet<ResourceId>),
}

impl ResourceFilter {
    pub fn matches(&self, id: &ResourceId) -> bool {
        match self {
            ResourceFilter::All => true,
            ResourceFilter::Ids(ids) => ids.contains(id),
        }
    }
}

/// One grant: scopes, verbs and a resource filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub scopes: BTreeSet<ScopeType>,

    pub verbs: BTreeSet<VerbGrant>,

    #[serde(default)]
    pub resources: ResourceFilter,

    /// Also grant descendant scopes, honoured only when inheritance is
    /// enabled for the deployment
    #[serde(default)]
    pub applies_to_descendants: bool,
}

impl Statement {
    pub fn new(
        scopes: impl IntoIterator<Item = ScopeType>,
        verbs: impl IntoIterator<Item = VerbGrant>,
    ) -> Self {
        Self {
            scopes: scopes.into_iter().collect(),
            verbs: verbs.into_iter().collect(),
            resources: ResourceFilter::All,
            applies_to_descendants: false,
        }
    }

    /// Restrict the statement to explicit identifiers
    pub fn on_resources(mut self, ids: impl IntoIterator<Item = ResourceId>) -> Self {
        self.resources = ResourceFilter::Ids(ids.into_iter().collect());
        self
    }

    pub fn with_descendants(mut self) -> Self {
        self.applies_to_descendants = true;
        self
    }

    pub fn covers(&self, scope: ScopeType) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn permits(&self, verb: Verb) -> bool {
        self.verbs.iter().any(|grant| grant.permits(verb))
    }

    /// Scope-exact match against one action
    pub fn grants(&self, action: &RequestAction) -> bool {
        self.covers(action.scope)
            && self.permits(action.verb)
            && self.resources.matches(&action.resource)
    }
}

/// Named set of statements owned by one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub id: PolicyId,

    pub tenant: TenantId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(id: impl Into<PolicyId>, tenant: TenantId) -> Self {
        Self {
            id: id.into(),
            tenant,
            name: String::new(),
            statements: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }
}

/// All policy documents of one tenant
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TenantPolicy {
    pub tenant: TenantId,

    pub documents: BTreeMap<PolicyId, PolicyDocument>,
}

impl TenantPolicy {
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            documents: BTreeMap::new(),
        }
    }

    /// Add a document; documents of other tenants are ignored
    pub fn insert(&mut self, document: PolicyDocument) -> bool {
        if document.tenant != self.tenant {
            return false;
        }
        self.documents.insert(document.id.clone(), document);
        true
    }

    /// Documents bound to the principal in this tenant
    pub fn documents_for<'a>(
        &'a self,
        principal: &'a Principal,
    ) -> impl Iterator<Item = &'a PolicyDocument> + 'a {
        principal
            .policies_for(self.tenant)
            .filter_map(move |id| self.documents.get(id))
    }

    pub fn statement_count(&self) -> usize {
        self.documents.values().map(|d| d.statements.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoleBinding;

    #[test]
    fn test_statement_grants_scope_exact() {
        let statement = Statement::new([ScopeType::Project], [Verb::Read.into()]);

        assert!(statement.grants(&RequestAction::new(ScopeType::Project, 1u64, Verb::Read)));
        assert!(!statement.grants(&RequestAction::new(ScopeType::Project, 1u64, Verb::Write)));
        assert!(!statement.grants(&RequestAction::new(ScopeType::Cluster, 1u64, Verb::Read)));
    }

    #[test]
    fn test_resource_filter() {
        let statement = Statement::new([ScopeType::Cluster], [VerbGrant::Any])
            .on_resources([ResourceId::Numeric(7)]);

        assert!(statement.grants(&RequestAction::new(ScopeType::Cluster, 7u64, Verb::Write)));
        assert!(!statement.grants(&RequestAction::new(ScopeType::Cluster, 8u64, Verb::Read)));
    }

    #[test]
    fn test_statement_json() {
        let json = r#"{
            "scopes": ["project", "cluster"],
            "verbs": ["read", "*"],
            "resources": {"ids": [1, 2]}
        }"#;
        let statement: Statement = serde_json::from_str(json).unwrap();

        assert!(statement.covers(ScopeType::Cluster));
        assert!(statement.permits(Verb::Write));
        assert!(!statement.applies_to_descendants);
        assert_eq!(
            statement.resources,
            ResourceFilter::Ids([ResourceId::Numeric(1), ResourceId::Numeric(2)].into())
        );

        let all: Statement =
            serde_json::from_str(r#"{"scopes": ["project"], "verbs": ["read"]}"#).unwrap();
        assert_eq!(all.resources, ResourceFilter::All);
    }

    #[test]
    fn test_documents_for_principal() {
        let mut policy = TenantPolicy::new(TenantId(1));
        policy.insert(PolicyDocument::new("viewer", TenantId(1)));
        policy.insert(PolicyDocument::new("admin", TenantId(1)));
        assert!(!policy.insert(PolicyDocument::new("foreign", TenantId(2))));

        let principal = Principal::new(5, "bob@example.com").with_binding(RoleBinding::new(
            TenantId(1),
            "viewer",
            vec!["viewer".into(), "missing".into()],
        ));

        let ids: Vec<_> = policy.documents_for(&principal).map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["viewer"]);
    }
}
