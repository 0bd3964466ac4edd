//! Principal resolution

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AuthzError, Result};
use crate::types::{Credentials, Principal, RoleBinding, UserId};

/// Turns request credentials into a principal
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// # Errors
    ///
    /// `Unauthenticated` when the credentials are missing, unknown or revoked.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal>;
}

/// Opaque bearer tokens and session ids mapped to users, held in memory
#[derive(Default)]
pub struct StaticTokenAuthenticator {
    users: RwLock<HashMap<UserId, Principal>>,
    tokens: RwLock<HashMap<String, UserId>>,
    sessions: RwLock<HashMap<String, UserId>>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, principal: Principal) {
        self.users.write().await.insert(principal.user_id, principal);
    }

    pub async fn issue_token(&self, token: impl Into<String>, user_id: UserId) {
        self.tokens.write().await.insert(token.into(), user_id);
    }

    pub async fn issue_session(&self, session: impl Into<String>, user_id: UserId) {
        self.sessions.write().await.insert(session.into(), user_id);
    }

    pub async fn revoke_token(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }

    /// Attach a role binding; returns false for unknown users
    pub async fn add_binding(&self, user_id: UserId, binding: RoleBinding) -> bool {
        match self.users.write().await.get_mut(&user_id) {
            Some(principal) => {
                principal.bindings.push(binding);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal> {
        let user_id = match credentials {
            Credentials::None => {
                return Err(AuthzError::Unauthenticated("no credentials".to_string()))
            }
            Credentials::Bearer(token) => self.tokens.read().await.get(token).copied(),
            Credentials::Session(session) => self.sessions.read().await.get(session).copied(),
        };

        let user_id = user_id
            .ok_or_else(|| AuthzError::Unauthenticated("unknown credentials".to_string()))?;

        self.users
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| AuthzError::Unauthenticated("user no longer exists".to_string()))
    }
}
