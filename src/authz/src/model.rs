//! Entities resolved for each scope
//!
//! These are the narrow records the core needs to enforce containment; the
//! resource-management layer owns the full models.

use serde::{Deserialize, Serialize};

use crate::scope::ScopeType;
use crate::types::{ResourceId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
    #[serde(default)]
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub cluster_id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub cluster_id: u64,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infra {
    pub id: u64,
    pub project_id: u64,
    pub kind: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: u64,
    pub project_id: u64,
    pub email: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInstallation {
    pub id: u64,
    pub project_id: u64,
    pub installation_id: u64,
    #[serde(default)]
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmRepo {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub uid: String,
    pub infra_id: u64,
    pub kind: String,
    #[serde(default)]
    pub status: String,
}

/// Scope with no stored entity; only its identifier travels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralScope {
    pub scope: ScopeType,
    pub id: ResourceId,
}

/// Entity published into the resolved-scope context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "entity", rename_all = "snake_case")]
pub enum ResolvedEntity {
    User(User),
    Project(Project),
    Cluster(Cluster),
    Namespace(Namespace),
    Release(Release),
    Registry(Registry),
    Infra(Infra),
    Invite(Invite),
    GitInstallation(GitInstallation),
    HelmRepo(HelmRepo),
    Operation(Operation),
    Structural(StructuralScope),
}

impl ResolvedEntity {
    pub fn scope(&self) -> ScopeType {
        match self {
            ResolvedEntity::User(_) => ScopeType::User,
            ResolvedEntity::Project(_) => ScopeType::Project,
            ResolvedEntity::Cluster(_) => ScopeType::Cluster,
            ResolvedEntity::Namespace(_) => ScopeType::Namespace,
            ResolvedEntity::Release(_) => ScopeType::Release,
            ResolvedEntity::Registry(_) => ScopeType::Registry,
            ResolvedEntity::Infra(_) => ScopeType::Infra,
            ResolvedEntity::Invite(_) => ScopeType::Invite,
            ResolvedEntity::GitInstallation(_) => ScopeType::GitInstallation,
            ResolvedEntity::HelmRepo(_) => ScopeType::HelmRepo,
            ResolvedEntity::Operation(_) => ScopeType::Operation,
            ResolvedEntity::Structural(s) => s.scope,
        }
    }

    /// Identifier the entity is addressed by within its parent
    pub fn key(&self) -> ResourceId {
        match self {
            ResolvedEntity::User(u) => ResourceId::Numeric(u.id),
            ResolvedEntity::Project(p) => ResourceId::Numeric(p.id),
            ResolvedEntity::Cluster(c) => ResourceId::Numeric(c.id),
            ResolvedEntity::Namespace(n) => ResourceId::Name(n.name.clone()),
            ResolvedEntity::Release(r) => ResourceId::Name(r.name.clone()),
            ResolvedEntity::Registry(r) => ResourceId::Numeric(r.id),
            ResolvedEntity::Infra(i) => ResourceId::Numeric(i.id),
            ResolvedEntity::Invite(i) => ResourceId::Numeric(i.id),
            ResolvedEntity::GitInstallation(g) => ResourceId::Numeric(g.id),
            ResolvedEntity::HelmRepo(h) => ResourceId::Numeric(h.id),
            ResolvedEntity::Operation(o) => ResourceId::Name(o.uid.clone()),
            ResolvedEntity::Structural(s) => s.id.clone(),
        }
    }

    /// Whether the entity's stored parent is exactly `parent`
    ///
    /// Structural scopes store no parent and are contained by construction.
    pub fn is_contained_in(&self, parent: &ResolvedEntity) -> bool {
        use ResolvedEntity as E;

        match (self, parent) {
            (E::Structural(_), _) => true,
            (E::Cluster(c), E::Project(p)) => c.project_id == p.id,
            (E::Registry(r), E::Project(p)) => r.project_id == p.id,
            (E::Infra(i), E::Project(p)) => i.project_id == p.id,
            (E::Invite(i), E::Project(p)) => i.project_id == p.id,
            (E::GitInstallation(g), E::Project(p)) => g.project_id == p.id,
            (E::HelmRepo(h), E::Project(p)) => h.project_id == p.id,
            (E::Namespace(n), E::Cluster(c)) => n.cluster_id == c.id,
            (E::Release(r), E::Namespace(n)) => {
                r.cluster_id == n.cluster_id && r.namespace == n.name
            }
            (E::Operation(o), E::Infra(i)) => o.infra_id == i.id,
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ResolvedEntity::Structural(_) => "structural",
            other => other.scope().as_str(),
        }
    }
}
