use std::any::Any;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use stratum_authz::{Outcome, Rejection};
use tracing::error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The authorization pipeline rejected the request
    #[error("Request rejected: {0}")]
    Rejected(Box<Rejection>),

    /// Unauthenticated browser route; send the client to the login page
    #[error("Redirecting to {location}")]
    Redirect { location: String },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Map a rejection to its HTTP form, honoring the route's redirect flag
    pub fn from_rejection(rejection: Rejection, login_path: &str) -> Self {
        if rejection.redirect {
            return ApiError::Redirect {
                location: login_path.to_string(),
            };
        }
        ApiError::Rejected(Box::new(rejection))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Rejected(rejection) => status_for(rejection.outcome()),
            ApiError::Redirect { .. } => StatusCode::FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Response for a handler or stage that panicked
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    ApiError::Internal(format!("request panicked: {}", detail)).into_response()
}

fn status_for(outcome: Outcome) -> StatusCode {
    StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Clients only ever see the collapsed outcome
        let message = match self {
            ApiError::Redirect { location } => {
                let location = HeaderValue::from_str(&location)
                    .unwrap_or_else(|_| HeaderValue::from_static("/login"));
                return (status, [(header::LOCATION, location)]).into_response();
            }
            ApiError::Rejected(rejection) => rejection.outcome().public_message(),
            ApiError::Internal(detail) => {
                error!(error = %detail, "Internal server error");
                Outcome::Internal.public_message()
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_authz::scope::ScopeType;
    use stratum_authz::{AuthzError, RequestPhase, Verb};

    fn rejection(error: AuthzError, redirect: bool) -> Rejection {
        Rejection {
            request_id: "req-1".to_string(),
            route: "GET /projects/{project_id}".to_string(),
            error,
            phase: RequestPhase::Unauthenticated,
            redirect,
            phases: vec![RequestPhase::Unauthenticated],
        }
    }

    #[test]
    fn test_not_found_and_denied_share_status() {
        let not_found = ApiError::from_rejection(
            rejection(
                AuthzError::NotFound {
                    scope: ScopeType::Cluster,
                    id: "20".into(),
                },
                false,
            ),
            "/login",
        );
        let denied = ApiError::from_rejection(
            rejection(
                AuthzError::PolicyDenied {
                    scope: ScopeType::Cluster,
                    verb: Verb::Read,
                    id: "20".into(),
                },
                false,
            ),
            "/login",
        );

        assert_eq!(not_found.status(), StatusCode::FORBIDDEN);
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_redirect() {
        let error = ApiError::from_rejection(
            rejection(AuthzError::Unauthenticated("no credentials".into()), true),
            "/auth/login",
        );
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/auth/login");
    }

    #[test]
    fn test_cancelled_status() {
        let error = ApiError::from_rejection(rejection(AuthzError::Cancelled, false), "/login");
        assert_eq!(error.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_panic_renders_internal_error() {
        let response = panic_response(Box::new("secret detail".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = panic_response(Box::new(42_u8));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
