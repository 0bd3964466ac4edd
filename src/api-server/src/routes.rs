//! Route catalog and router construction
//!
//! Every control-plane route is declared once with its scope chain and
//! flags. The table is validated at startup, each route gets its pipeline,
//! and the pipeline runs before the route's handler on every request.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    middleware as axum_middleware,
    routing::{get, MethodFilter, MethodRouter},
    Extension, Json, Router,
};
use serde_json::Value;
use stratum_authz::scope::{Method, Route, RouteTable, ScopeType};
use stratum_authz::{Credentials, Pipeline, RequestInput, RouteHandler};
use tokio_util::sync::CancellationToken;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, Result as ApiResult};
use crate::handlers::{self, CurrentUser, ResolvedChain};
use crate::{middleware, state::AppState};

/// Route declaration paired with its handler
pub struct Endpoint {
    pub route: Route,
    pub handler: Arc<dyn RouteHandler>,
}

impl Endpoint {
    pub fn new(route: Route, handler: Arc<dyn RouteHandler>) -> Self {
        Self { route, handler }
    }
}

/// All routes served by the control plane
pub fn catalog() -> Vec<Endpoint> {
    use ScopeType::*;

    let chain: Arc<dyn RouteHandler> = Arc::new(ResolvedChain);
    let project = "/projects/{project_id}";
    let cluster = "/projects/{project_id}/clusters/{cluster_id}";
    let namespace = "/projects/{project_id}/clusters/{cluster_id}/namespaces/{namespace}";
    let release = "/projects/{project_id}/clusters/{cluster_id}/namespaces/{namespace}/releases/{name}";
    let infra = "/projects/{project_id}/infras/{infra_id}";

    let routes = vec![
        Route::new(Method::Get, "/users/current", [User]).quiet(),
        Route::new(Method::Get, project, [Project]),
        Route::new(Method::Delete, project, [Project]),
        Route::new(Method::Get, format!("{}/clusters", project), [Project]),
        Route::new(Method::Post, format!("{}/clusters", project), [Project]).metered("clusters"),
        Route::new(Method::Get, cluster, [Project, Cluster]),
        Route::new(Method::Put, cluster, [Project, Cluster]),
        Route::new(Method::Delete, cluster, [Project, Cluster]),
        Route::new(Method::Get, namespace, [Project, Cluster, Namespace]),
        Route::new(Method::Get, release, [Project, Cluster, Namespace, Release]),
        Route::new(Method::Patch, release, [Project, Cluster, Namespace, Release]),
        Route::new(
            Method::Get,
            format!("{}/logs", release),
            [Project, Cluster, Namespace, Release],
        )
        .streaming()
        .quiet(),
        Route::new(Method::Get, format!("{}/registries/{{registry_id}}", project), [Project, Registry]),
        Route::new(Method::Get, format!("{}/helmrepos/{{helm_repo_id}}", project), [Project, HelmRepo]),
        Route::new(Method::Get, format!("{}/invites/{{invite_id}}", project), [Project, Invite]),
        Route::new(
            Method::Get,
            format!("{}/gitrepos/{{git_installation_id}}", project),
            [Project, GitInstallation],
        ),
        Route::new(Method::Get, infra, [Project, Infra]),
        Route::new(
            Method::Get,
            format!("{}/operations/{{operation_id}}", infra),
            [Project, Infra, Operation],
        ),
        Route::new(
            Method::Get,
            format!("{}/integrations/{{integration_id}}", project),
            [Project, ProjectIntegration],
        ),
        Route::new(
            Method::Get,
            format!("{}/oauth/{{oauth_integration_id}}", project),
            [Project, ProjectOAuth],
        )
        .redirect_on_auth_failure(),
        Route::new(
            Method::Delete,
            format!("{}/slack-integrations/{{slack_integration_id}}", project),
            [Project, SlackIntegration],
        ),
    ];

    routes
        .into_iter()
        .map(|route| {
            let handler = if route.chain == [User] {
                Arc::new(CurrentUser) as Arc<dyn RouteHandler>
            } else {
                chain.clone()
            };
            Endpoint::new(route, handler)
        })
        .collect()
}

/// `{param}` template segments in axum's `:param` syntax
pub fn axum_path(template: &str) -> String {
    template
        .split('/')
        .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(param) => format!(":{}", param),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn method_filter(method: Method) -> MethodFilter {
    match method {
        Method::Get => MethodFilter::GET,
        Method::Post => MethodFilter::POST,
        Method::Put => MethodFilter::PUT,
        Method::Patch => MethodFilter::PATCH,
        Method::Delete => MethodFilter::DELETE,
    }
}

/// Bearer header first, then the `session` cookie
pub fn credentials(headers: &HeaderMap) -> Credentials {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Credentials::Bearer(token.to_string());
    }

    let session = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| pair.trim().strip_prefix("session="))
        .filter(|value| !value.is_empty());

    match session {
        Some(value) => Credentials::Session(value.to_string()),
        None => Credentials::None,
    }
}

fn wants_upgrade(headers: &HeaderMap) -> bool {
    headers.contains_key(header::UPGRADE)
        || headers
            .get(header::CONNECTION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"))
}

/// Pipeline and handler of one mounted route
struct Mounted {
    pipeline: Pipeline,
    handler: Arc<dyn RouteHandler>,
}

impl Mounted {
    async fn serve(
        &self,
        state: &AppState,
        params: HashMap<String, String>,
        request_id: Option<Uuid>,
        headers: &HeaderMap,
    ) -> ApiResult<Json<Value>> {
        let mut input = RequestInput::new();
        if let Some(id) = request_id {
            input = input.request_id(id.to_string());
        }
        input.credentials = credentials(headers);
        input.params = params;
        input.upgrade = wants_upgrade(headers);

        // A dropped connection drops this future, which cancels the pipeline
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        match self
            .pipeline
            .dispatch(input, cancel, self.handler.as_ref())
            .await
        {
            Ok(dispatched) => Ok(Json(dispatched.body)),
            Err(rejection) => Err(ApiError::from_rejection(rejection, &state.config.login_path)),
        }
    }
}

/// Build the router for `endpoints`
///
/// # Errors
///
/// Fails when the route table is invalid or a route's pipeline cannot be
/// built; the server must not start with a partial table.
pub fn build_router(state: Arc<AppState>, endpoints: Vec<Endpoint>) -> Result<Router> {
    let (routes, route_handlers): (Vec<Route>, Vec<Arc<dyn RouteHandler>>) = endpoints
        .into_iter()
        .map(|endpoint| (endpoint.route, endpoint.handler))
        .unzip();

    let table = RouteTable::new(&state.tree, routes).context("Invalid route table")?;

    let mut by_path: BTreeMap<String, MethodRouter<Arc<AppState>>> = BTreeMap::new();
    for (route, handler) in table.iter().zip(route_handlers) {
        let pipeline = state
            .builder
            .build(route.clone())
            .with_context(|| format!("Failed to build pipeline for {}", route.name()))?;
        let mounted = Arc::new(Mounted { pipeline, handler });

        let serve = move |State(state): State<Arc<AppState>>,
                          params: Option<Path<HashMap<String, String>>>,
                          request_id: Option<Extension<Uuid>>,
                          headers: HeaderMap| {
            let mounted = mounted.clone();
            async move {
                let params = params.map(|Path(p)| p).unwrap_or_default();
                let request_id = request_id.map(|Extension(id)| id);
                mounted.serve(&state, params, request_id, &headers).await
            }
        };

        let path = axum_path(&route.path);
        let method_router = by_path.remove(&path).unwrap_or_default();
        by_path.insert(path, method_router.on(method_filter(route.method), serve));
    }

    info!("Mounted {} routes on {} paths", table.len(), by_path.len());

    let router = by_path
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(&path, method_router)
        })
        .route("/health", get(handlers::health_check))
        .layer(CatchPanicLayer::custom(crate::error::panic_response))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .with_state(state);

    Ok(router)
}

/// Router over the full catalog
pub fn create_router(state: Arc<AppState>) -> Result<Router> {
    build_router(state, catalog())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use stratum_authz::scope::ScopeTree;

    #[test]
    fn test_axum_path() {
        assert_eq!(
            axum_path("/projects/{project_id}/clusters/{cluster_id}"),
            "/projects/:project_id/clusters/:cluster_id"
        );
        assert_eq!(axum_path("/users/current"), "/users/current");
    }

    #[test]
    fn test_catalog_is_valid() {
        let tree = ScopeTree::new().unwrap();
        let routes: Vec<Route> = catalog().into_iter().map(|e| e.route).collect();
        let count = routes.len();

        let table = RouteTable::new(&tree, routes).unwrap();
        assert_eq!(table.len(), count);
    }

    #[test]
    fn test_catalog_covers_every_scope() {
        let catalog = catalog();
        for scope in ScopeType::ALL.iter() {
            assert!(
                catalog.iter().any(|e| e.route.chain.contains(scope)),
                "no route reaches {}",
                scope
            );
        }
    }

    #[test]
    fn test_credentials() {
        let mut headers = HeaderMap::new();
        assert_eq!(credentials(&headers), Credentials::None);

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc"));
        assert_eq!(credentials(&headers), Credentials::Session("abc".to_string()));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
        assert_eq!(credentials(&headers), Credentials::Bearer("tok-1".to_string()));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(credentials(&headers), Credentials::Session("abc".to_string()));
    }

    #[test]
    fn test_upgrade_intent() {
        let mut headers = HeaderMap::new();
        assert!(!wants_upgrade(&headers));

        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        assert!(wants_upgrade(&headers));
    }
}
