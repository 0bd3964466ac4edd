//! Error types for the authorization core

use crate::scope::ScopeType;
use crate::types::Verb;
use thiserror::Error;

/// Misuse of the per-request resolved-scope context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// Scope is not part of the route's declared chain
    #[error("scope {0} is not declared by this route")]
    Undeclared(ScopeType),

    /// Scope is declared but no stage has resolved it yet
    #[error("scope {0} has not been resolved for this request")]
    Unresolved(ScopeType),

    /// Entity stored under the scope has a different type than requested
    #[error("scope {scope} holds a {found} entity, expected {expected}")]
    WrongType {
        scope: ScopeType,
        expected: &'static str,
        found: &'static str,
    },

    /// The context is append-only
    #[error("scope {0} was already resolved for this request")]
    AlreadyResolved(ScopeType),
}

/// Authorization core errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// No valid principal could be established
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Identifier does not have the shape required by its scope
    #[error("Malformed {scope} identifier '{raw}': {reason}")]
    Malformed {
        scope: ScopeType,
        raw: String,
        reason: String,
    },

    /// Entity is absent, or not contained in the claimed parent
    #[error("{scope} '{id}' not found")]
    NotFound { scope: ScopeType, id: String },

    /// Entity exists but no statement grants the action
    #[error("Policy denied {verb} on {scope} '{id}'")]
    PolicyDenied {
        scope: ScopeType,
        verb: Verb,
        id: String,
    },

    /// Tenant exhausted a metered resource
    #[error("Usage limit exceeded for metric '{metric}'")]
    UsageLimitExceeded { metric: String },

    /// Request deadline elapsed or the request was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// Storage or transport failure unrelated to existence or policy
    #[error("Internal error: {0}")]
    Internal(String),

    /// Route table rejected at startup
    #[error("Invalid route {route}: {reason}")]
    InvalidRoute { route: String, reason: String },

    /// Handler or stage broke the resolved-scope context contract
    #[error("Context contract violation: {0}")]
    Context(#[from] ContextError),
}

/// Externally visible outcome of a failed request
///
/// `NotFound` and `PolicyDenied` collapse into `Forbidden` so a caller cannot
/// probe for resources in tenants it has no access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unauthenticated,
    BadRequest,
    Forbidden,
    Cancelled,
    Internal,
}

impl Outcome {
    /// HTTP status code at the API boundary
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::Unauthenticated => 401,
            Outcome::BadRequest => 400,
            Outcome::Forbidden => 403,
            Outcome::Cancelled => 408,
            Outcome::Internal => 500,
        }
    }

    /// Message safe to return to the client
    pub fn public_message(&self) -> &'static str {
        match self {
            Outcome::Unauthenticated => "unauthenticated",
            Outcome::BadRequest => "malformed request",
            Outcome::Forbidden => "forbidden",
            Outcome::Cancelled => "request cancelled",
            Outcome::Internal => "internal server error",
        }
    }
}

impl AuthzError {
    /// Collapse the error taxonomy to its client-facing outcome
    pub fn outcome(&self) -> Outcome {
        match self {
            AuthzError::Unauthenticated(_) => Outcome::Unauthenticated,
            AuthzError::Malformed { .. } => Outcome::BadRequest,
            AuthzError::NotFound { .. }
            | AuthzError::PolicyDenied { .. }
            | AuthzError::UsageLimitExceeded { .. } => Outcome::Forbidden,
            AuthzError::Cancelled => Outcome::Cancelled,
            AuthzError::Internal(_)
            | AuthzError::InvalidRoute { .. }
            | AuthzError::Context(_) => Outcome::Internal,
        }
    }

    pub(crate) fn malformed(scope: ScopeType, raw: &str, reason: impl Into<String>) -> Self {
        AuthzError::Malformed {
            scope,
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_and_denied_are_indistinguishable() {
        let not_found = AuthzError::NotFound {
            scope: ScopeType::Cluster,
            id: "7".to_string(),
        };
        let denied = AuthzError::PolicyDenied {
            scope: ScopeType::Cluster,
            verb: Verb::Read,
            id: "7".to_string(),
        };

        assert_eq!(not_found.outcome(), Outcome::Forbidden);
        assert_eq!(denied.outcome(), Outcome::Forbidden);
        assert_eq!(
            not_found.outcome().public_message(),
            denied.outcome().public_message()
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthzError::Unauthenticated("no token".into()).outcome().status_code(), 401);
        assert_eq!(
            AuthzError::malformed(ScopeType::Project, "abc", "not numeric").outcome().status_code(),
            400
        );
        assert_eq!(AuthzError::Internal("db down".into()).outcome().status_code(), 500);
        assert_eq!(
            AuthzError::from(ContextError::Unresolved(ScopeType::Release)).outcome().status_code(),
            500
        );
        assert_eq!(AuthzError::Cancelled.outcome().status_code(), 408);
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = AuthzError::Internal("connection refused to 10.0.0.3:5432".into());
        assert_eq!(err.outcome().public_message(), "internal server error");
    }
}
