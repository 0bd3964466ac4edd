//! Seed data for the in-memory collaborators
//!
//! The server keeps its entities, policies and credentials in memory. A seed
//! file (JSON) fills them at startup; without one a small demo tenant is
//! loaded.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stratum_authz::model::{
    Cluster, GitInstallation, HelmRepo, Infra, Invite, Namespace, Operation, Project, Registry,
    Release,
};
use stratum_authz::scope::ScopeType;
use stratum_authz::{
    PolicyDocument, Principal, RoleBinding, Statement, TenantId, UserId, Verb, VerbGrant,
};
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedUser {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub bindings: Vec<RoleBinding>,
    /// Bearer tokens accepted for this user
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Session cookie values accepted for this user
    #[serde(default)]
    pub sessions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimit {
    pub tenant: TenantId,
    pub metric: String,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub users: Vec<SeedUser>,
    pub projects: Vec<Project>,
    pub clusters: Vec<Cluster>,
    pub namespaces: Vec<Namespace>,
    pub releases: Vec<Release>,
    pub registries: Vec<Registry>,
    pub infras: Vec<Infra>,
    pub invites: Vec<Invite>,
    pub git_installations: Vec<GitInstallation>,
    pub helm_repos: Vec<HelmRepo>,
    pub operations: Vec<Operation>,
    pub policies: Vec<PolicyDocument>,
    pub usage_limits: Vec<UsageLimit>,
}

impl Seed {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;

        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))
    }

    /// One tenant with an admin and a read-only viewer
    pub fn demo() -> Self {
        let tenant = TenantId(1);
        let all_scopes = || {
            ScopeType::ALL
                .iter()
                .copied()
                .filter(|scope| *scope != ScopeType::User)
        };

        Self {
            users: vec![
                SeedUser {
                    id: 1,
                    email: "admin@stratum.dev".to_string(),
                    bindings: vec![RoleBinding::new(tenant, "admin", vec!["admin".to_string()])],
                    tokens: vec!["admin-token".to_string()],
                    sessions: vec![],
                },
                SeedUser {
                    id: 2,
                    email: "viewer@stratum.dev".to_string(),
                    bindings: vec![RoleBinding::new(tenant, "viewer", vec!["viewer".to_string()])],
                    tokens: vec!["viewer-token".to_string()],
                    sessions: vec!["viewer-session".to_string()],
                },
            ],
            projects: vec![Project {
                id: 1,
                name: "demo".to_string(),
            }],
            clusters: vec![Cluster {
                id: 1,
                project_id: 1,
                name: "demo-cluster".to_string(),
                server: "https://demo.k8s.local".to_string(),
            }],
            namespaces: vec![Namespace {
                cluster_id: 1,
                name: "default".to_string(),
            }],
            releases: vec![Release {
                cluster_id: 1,
                namespace: "default".to_string(),
                name: "web".to_string(),
                chart: "nginx".to_string(),
                revision: 1,
            }],
            policies: vec![
                PolicyDocument::new("admin", tenant)
                    .named("Project admin")
                    .with_statement(Statement::new(all_scopes(), [VerbGrant::Any])),
                PolicyDocument::new("viewer", tenant)
                    .named("Project viewer")
                    .with_statement(Statement::new(all_scopes(), [Verb::Read.into()])),
            ],
            usage_limits: vec![UsageLimit {
                tenant,
                metric: "clusters".to_string(),
                limit: 5,
            }],
            ..Default::default()
        }
    }

    /// Load every record into the state's collaborators
    pub async fn apply(&self, state: &AppState) {
        for user in &self.users {
            let principal = user
                .bindings
                .iter()
                .cloned()
                .fold(Principal::new(user.id, user.email.clone()), Principal::with_binding);
            state.authn.add_user(principal).await;

            for token in &user.tokens {
                state.authn.issue_token(token.clone(), user.id).await;
            }
            for session in &user.sessions {
                state.authn.issue_session(session.clone(), user.id).await;
            }
        }

        let store = &state.store;
        for project in &self.projects {
            store.insert_project(project.clone()).await;
        }
        for cluster in &self.clusters {
            store.insert_cluster(cluster.clone()).await;
        }
        for namespace in &self.namespaces {
            store.insert_namespace(namespace.clone()).await;
        }
        for release in &self.releases {
            store.insert_release(release.clone()).await;
        }
        for registry in &self.registries {
            store.insert_registry(registry.clone()).await;
        }
        for infra in &self.infras {
            store.insert_infra(infra.clone()).await;
        }
        for invite in &self.invites {
            store.insert_invite(invite.clone()).await;
        }
        for installation in &self.git_installations {
            store.insert_git_installation(installation.clone()).await;
        }
        for repo in &self.helm_repos {
            store.insert_helm_repo(repo.clone()).await;
        }
        for operation in &self.operations {
            store.insert_operation(operation.clone()).await;
        }

        for document in &self.policies {
            state.loader.put_document(document.clone()).await;
        }
        for limit in &self.usage_limits {
            state
                .meter
                .set_limit(limit.tenant, limit.metric.clone(), limit.limit);
        }

        // Seeded documents replace whatever the cache may hold
        state.builder.engine().store().invalidate_all();

        info!(
            users = self.users.len(),
            projects = self.projects.len(),
            policies = self.policies.len(),
            "Seed applied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_seed() {
        let seed: Seed = serde_json::from_str(
            r#"{
                "users": [{"id": 7, "email": "ops@acme.io", "tokens": ["t"],
                           "bindings": [{"tenant": 3, "role": "ops", "policies": ["ops"]}]}],
                "projects": [{"id": 3, "name": "acme"}],
                "clusters": [{"id": 9, "project_id": 3, "name": "prod"}],
                "policies": [{"id": "ops", "tenant": 3, "statements": [
                    {"scopes": ["project", "cluster"], "verbs": ["read"]}
                ]}]
            }"#,
        )
        .unwrap();

        assert_eq!(seed.users[0].bindings[0].tenant, TenantId(3));
        assert_eq!(seed.clusters[0].server, "");
        assert!(seed.namespaces.is_empty());

        let statement = &seed.policies[0].statements[0];
        assert!(statement.covers(ScopeType::Cluster));
        assert!(statement.permits(Verb::Read));
        assert!(!statement.permits(Verb::Write));
    }

    #[test]
    fn test_demo_seed_round_trips() {
        let demo = Seed::demo();
        let json = serde_json::to_string(&demo).unwrap();
        let parsed: Seed = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, demo);
        assert_eq!(parsed.policies.len(), 2);
    }
}
