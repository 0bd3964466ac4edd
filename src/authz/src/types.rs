//! Core authorization types

use crate::scope::ScopeType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique policy document identifier
pub type PolicyId = String;

/// Unique user identifier
pub type UserId = u64;

/// Tenant (project) identifier
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a resource within its scope
///
/// Most scopes are keyed by a numeric id; namespaces, releases and
/// operations are keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Numeric(u64),
    Name(String),
}

impl ResourceId {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ResourceId::Numeric(id) => Some(*id),
            ResourceId::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            ResourceId::Numeric(_) => None,
            ResourceId::Name(name) => Some(name),
        }
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        ResourceId::Numeric(id)
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        ResourceId::Name(name.to_string())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Numeric(id) => write!(f, "{}", id),
            ResourceId::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Permission verb required by a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Read,
    Write,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Read => write!(f, "read"),
            Verb::Write => write!(f, "write"),
        }
    }
}

/// Verb granted by a policy statement; `*` grants every verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VerbGrant {
    Verb(Verb),
    Any,
}

impl VerbGrant {
    pub fn permits(&self, verb: Verb) -> bool {
        match self {
            VerbGrant::Any => true,
            VerbGrant::Verb(granted) => *granted == verb,
        }
    }
}

impl From<Verb> for VerbGrant {
    fn from(verb: Verb) -> Self {
        VerbGrant::Verb(verb)
    }
}

impl TryFrom<String> for VerbGrant {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "*" => Ok(VerbGrant::Any),
            "read" => Ok(VerbGrant::Verb(Verb::Read)),
            "write" => Ok(VerbGrant::Verb(Verb::Write)),
            other => Err(format!("unknown verb '{}'", other)),
        }
    }
}

impl From<VerbGrant> for String {
    fn from(grant: VerbGrant) -> Self {
        match grant {
            VerbGrant::Any => "*".to_string(),
            VerbGrant::Verb(verb) => verb.to_string(),
        }
    }
}

/// Binds a principal to policy documents within one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    /// Tenant the binding applies to
    pub tenant: TenantId,

    /// Role name (informational; documents carry the grants)
    pub role: String,

    /// Policy documents granted through this role
    pub policies: Vec<PolicyId>,
}

impl RoleBinding {
    pub fn new(tenant: TenantId, role: impl Into<String>, policies: Vec<PolicyId>) -> Self {
        Self {
            tenant,
            role: role.into(),
            policies,
        }
    }
}

/// Authenticated user making a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,

    pub email: String,

    #[serde(default)]
    pub bindings: Vec<RoleBinding>,
}

impl Principal {
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            bindings: Vec::new(),
        }
    }

    /// Add a role binding to the principal
    pub fn with_binding(mut self, binding: RoleBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Policy documents bound to the principal in the given tenant
    pub fn policies_for(&self, tenant: TenantId) -> impl Iterator<Item = &PolicyId> {
        self.bindings
            .iter()
            .filter(move |b| b.tenant == tenant)
            .flat_map(|b| b.policies.iter())
    }
}

/// Credentials presented with a request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    None,
    Bearer(String),
    Session(String),
}

/// Runtime instance of one chain element for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAction {
    pub scope: ScopeType,
    pub resource: ResourceId,
    pub verb: Verb,
}

impl RequestAction {
    pub fn new(scope: ScopeType, resource: impl Into<ResourceId>, verb: Verb) -> Self {
        Self {
            scope,
            resource: resource.into(),
            verb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_grant_serde() {
        let grants: Vec<VerbGrant> = serde_json::from_str(r#"["read", "*"]"#).unwrap();
        assert_eq!(grants, vec![VerbGrant::Verb(Verb::Read), VerbGrant::Any]);

        assert!(serde_json::from_str::<VerbGrant>(r#""delete""#).is_err());
        assert_eq!(serde_json::to_string(&VerbGrant::Any).unwrap(), r#""*""#);
    }

    #[test]
    fn test_verb_grant_permits() {
        assert!(VerbGrant::Any.permits(Verb::Write));
        assert!(VerbGrant::Verb(Verb::Read).permits(Verb::Read));
        assert!(!VerbGrant::Verb(Verb::Read).permits(Verb::Write));
    }

    #[test]
    fn test_policies_for_tenant() {
        let principal = Principal::new(1, "alice@example.com")
            .with_binding(RoleBinding::new(TenantId(1), "viewer", vec!["p1-viewer".into()]))
            .with_binding(RoleBinding::new(TenantId(2), "admin", vec!["p2-admin".into()]));

        let p1: Vec<_> = principal.policies_for(TenantId(1)).collect();
        assert_eq!(p1, vec!["p1-viewer"]);
        assert_eq!(principal.policies_for(TenantId(3)).count(), 0);
    }

    #[test]
    fn test_resource_id_untagged() {
        let ids: Vec<ResourceId> = serde_json::from_str(r#"[4, "default"]"#).unwrap();
        assert_eq!(ids, vec![ResourceId::Numeric(4), ResourceId::Name("default".into())]);
    }
}
