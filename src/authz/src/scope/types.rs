/// Scope type definitions and identifier validation
///
/// Provides the closed set of resource scopes together with their static
/// parent relation, path parameters and identifier shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};
use crate::types::ResourceId;

/// Resource type position in the tenant hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    User,
    Project,
    Cluster,
    Namespace,
    Release,
    Registry,
    Infra,
    Invite,
    GitInstallation,
    HelmRepo,
    ProjectIntegration,
    #[serde(rename = "project_oauth")]
    ProjectOAuth,
    SlackIntegration,
    Operation,
}

/// Shape of the identifier carried in a scope's path parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// Positive integer database id
    Numeric,
    /// Lowercase alphanumerics and '-', starting and ending alphanumeric
    DnsLabel { max_len: usize },
    /// Alphanumerics, '-' and '_'
    Token { max_len: usize },
}

impl ScopeType {
    /// Every scope type, roots first
    pub const ALL: [ScopeType; 14] = [
        ScopeType::User,
        ScopeType::Project,
        ScopeType::Cluster,
        ScopeType::Namespace,
        ScopeType::Release,
        ScopeType::Registry,
        ScopeType::Infra,
        ScopeType::Invite,
        ScopeType::GitInstallation,
        ScopeType::HelmRepo,
        ScopeType::ProjectIntegration,
        ScopeType::ProjectOAuth,
        ScopeType::SlackIntegration,
        ScopeType::Operation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::User => "user",
            ScopeType::Project => "project",
            ScopeType::Cluster => "cluster",
            ScopeType::Namespace => "namespace",
            ScopeType::Release => "release",
            ScopeType::Registry => "registry",
            ScopeType::Infra => "infra",
            ScopeType::Invite => "invite",
            ScopeType::GitInstallation => "git_installation",
            ScopeType::HelmRepo => "helm_repo",
            ScopeType::ProjectIntegration => "project_integration",
            ScopeType::ProjectOAuth => "project_oauth",
            ScopeType::SlackIntegration => "slack_integration",
            ScopeType::Operation => "operation",
        }
    }

    /// Declared parent scope, `None` for the roots
    pub fn parent(&self) -> Option<ScopeType> {
        match self {
            ScopeType::User | ScopeType::Project => None,
            ScopeType::Cluster
            | ScopeType::Registry
            | ScopeType::Infra
            | ScopeType::Invite
            | ScopeType::GitInstallation
            | ScopeType::HelmRepo
            | ScopeType::ProjectIntegration
            | ScopeType::ProjectOAuth
            | ScopeType::SlackIntegration => Some(ScopeType::Project),
            ScopeType::Namespace => Some(ScopeType::Cluster),
            ScopeType::Release => Some(ScopeType::Namespace),
            ScopeType::Operation => Some(ScopeType::Infra),
        }
    }

    /// Name of the path parameter carrying this scope's identifier
    pub fn path_param(&self) -> Option<&'static str> {
        match self {
            ScopeType::User => None,
            ScopeType::Project => Some("project_id"),
            ScopeType::Cluster => Some("cluster_id"),
            ScopeType::Namespace => Some("namespace"),
            ScopeType::Release => Some("name"),
            ScopeType::Registry => Some("registry_id"),
            ScopeType::Infra => Some("infra_id"),
            ScopeType::Invite => Some("invite_id"),
            ScopeType::GitInstallation => Some("git_installation_id"),
            ScopeType::HelmRepo => Some("helm_repo_id"),
            ScopeType::ProjectIntegration => Some("integration_id"),
            ScopeType::ProjectOAuth => Some("oauth_integration_id"),
            ScopeType::SlackIntegration => Some("slack_integration_id"),
            ScopeType::Operation => Some("operation_id"),
        }
    }

    /// Whether entities of this scope are loaded from storage
    ///
    /// Structural scopes are authorized like any other but carry only
    /// their identifier through the request.
    pub fn is_persisted(&self) -> bool {
        !matches!(
            self,
            ScopeType::User
                | ScopeType::ProjectIntegration
                | ScopeType::ProjectOAuth
                | ScopeType::SlackIntegration
        )
    }

    pub fn identifier_kind(&self) -> Option<IdentifierKind> {
        match self {
            ScopeType::User => None,
            ScopeType::Namespace => Some(IdentifierKind::DnsLabel { max_len: 63 }),
            ScopeType::Release => Some(IdentifierKind::DnsLabel { max_len: 53 }),
            ScopeType::Operation => Some(IdentifierKind::Token { max_len: 64 }),
            _ => Some(IdentifierKind::Numeric),
        }
    }

    /// Parse a raw path segment into this scope's identifier
    ///
    /// Fails with `Malformed` when the segment does not have the shape
    /// required by the scope.
    pub fn parse_identifier(&self, raw: &str) -> Result<ResourceId> {
        let Some(kind) = self.identifier_kind() else {
            return Err(AuthzError::malformed(*self, raw, "scope carries no identifier"));
        };

        if raw.is_empty() {
            return Err(AuthzError::malformed(*self, raw, "identifier is empty"));
        }

        match kind {
            IdentifierKind::Numeric => {
                if !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(AuthzError::malformed(*self, raw, "expected a numeric id"));
                }
                match raw.parse::<u64>() {
                    Ok(0) => Err(AuthzError::malformed(*self, raw, "id must be positive")),
                    Ok(id) => Ok(ResourceId::Numeric(id)),
                    Err(_) => Err(AuthzError::malformed(*self, raw, "id out of range")),
                }
            }
            IdentifierKind::DnsLabel { max_len } => {
                if raw.len() > max_len {
                    return Err(AuthzError::malformed(
                        *self,
                        raw,
                        format!("longer than {} characters", max_len),
                    ));
                }
                let valid_chars = raw
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
                let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
                let bytes = raw.as_bytes();
                if !valid_chars || !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
                    return Err(AuthzError::malformed(*self, raw, "not a valid DNS label"));
                }
                Ok(ResourceId::Name(raw.to_string()))
            }
            IdentifierKind::Token { max_len } => {
                if raw.len() > max_len {
                    return Err(AuthzError::malformed(
                        *self,
                        raw,
                        format!("longer than {} characters", max_len),
                    ));
                }
                if !raw
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
                {
                    return Err(AuthzError::malformed(*self, raw, "invalid characters"));
                }
                Ok(ResourceId::Name(raw.to_string()))
            }
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ScopeType::ALL
            .iter()
            .copied()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| format!("unknown scope '{}'", s))
    }
}
