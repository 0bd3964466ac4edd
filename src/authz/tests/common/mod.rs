//! Shared fixture: two tenants, two users and the routes the tests exercise

#![allow(dead_code)]

use std::sync::Arc;

use stratum_authz::model::{Cluster, Namespace, Project, Release};
use stratum_authz::scope::{Method, Route, ScopeTree, ScopeType};
use stratum_authz::{
    AuditTrail, EngineConfig, InMemoryEntityStore, InMemoryPolicyLoader, InMemoryUsageMeter,
    Pipeline, PipelineBuilder, PolicyDocument, PolicyEngine, Principal, RequestInput,
    ResolverRegistry, RoleBinding, Statement, StaticTokenAuthenticator, TenantId, Verb,
};

pub const ACME: TenantId = TenantId(1);
pub const GLOBEX: TenantId = TenantId(2);

pub const ALICE: u64 = 1;
pub const BOB: u64 = 2;

pub struct Harness {
    pub store: Arc<InMemoryEntityStore>,
    pub loader: Arc<InMemoryPolicyLoader>,
    pub authn: Arc<StaticTokenAuthenticator>,
    pub audit: Arc<AuditTrail>,
    pub meter: Arc<InMemoryUsageMeter>,
    pub engine: Arc<PolicyEngine>,
    pub builder: PipelineBuilder,
}

impl Harness {
    pub async fn new(config: EngineConfig) -> Self {
        Self::with_resolvers(config, None).await
    }

    /// Harness whose resolvers come from `resolvers` instead of the store
    pub async fn with_resolvers(config: EngineConfig, resolvers: Option<ResolverRegistry>) -> Self {
        let store = Arc::new(InMemoryEntityStore::new());
        seed_entities(&store).await;

        let loader = Arc::new(InMemoryPolicyLoader::new());
        let authn = Arc::new(StaticTokenAuthenticator::new());
        for (id, email) in [(ALICE, "alice@acme.io"), (BOB, "bob@acme.io")] {
            authn
                .add_user(Principal::new(id, email).with_binding(RoleBinding::new(
                    ACME,
                    "member",
                    vec![format!("user-{}", id)],
                )))
                .await;
            authn.issue_token(format!("tok-{}", id), id).await;
        }

        let audit = Arc::new(AuditTrail::new(1_000));
        let meter = Arc::new(InMemoryUsageMeter::new());
        let engine = Arc::new(config.policy_engine(loader.clone()));
        let resolvers = resolvers.unwrap_or_else(|| ResolverRegistry::for_store(store.clone()));

        let builder = PipelineBuilder::new(
            Arc::new(ScopeTree::new().unwrap()),
            authn.clone(),
            engine.clone(),
            resolvers,
            audit.clone(),
        )
        .usage_meter(meter.clone())
        .config(config);

        Self {
            store,
            loader,
            authn,
            audit,
            meter,
            engine,
            builder,
        }
    }

    /// Grant `statements` to the user through their personal document in ACME
    pub async fn grant(&self, user_id: u64, statements: Vec<Statement>) {
        let id = format!("user-{}", user_id);
        let mut document = self
            .loader
            .document(ACME, &id)
            .await
            .unwrap_or_else(|| PolicyDocument::new(id, ACME));
        document.statements.extend(statements);

        self.loader.put_document(document).await;
    }

    pub async fn revoke_all(&self, user_id: u64) {
        self.loader.remove_document(ACME, &format!("user-{}", user_id)).await;
    }

    pub fn pipeline(&self, route: Route) -> Pipeline {
        self.builder.build(Arc::new(route)).unwrap()
    }
}

async fn seed_entities(store: &InMemoryEntityStore) {
    store.insert_project(Project { id: 1, name: "acme".into() }).await;
    store.insert_project(Project { id: 2, name: "globex".into() }).await;

    for (id, project_id, name) in [(10, 1, "prod"), (11, 1, "staging"), (20, 2, "globex-prod")] {
        store
            .insert_cluster(Cluster {
                id,
                project_id,
                name: name.into(),
                server: format!("https://{}.k8s.local", name),
            })
            .await;
    }

    store
        .insert_namespace(Namespace { cluster_id: 10, name: "web".into() })
        .await;
    store
        .insert_namespace(Namespace { cluster_id: 20, name: "api".into() })
        .await;

    store
        .insert_release(Release {
            cluster_id: 10,
            namespace: "web".into(),
            name: "frontend".into(),
            chart: "nginx".into(),
            revision: 4,
        })
        .await;
}

pub fn read(scopes: impl IntoIterator<Item = ScopeType>) -> Statement {
    Statement::new(scopes, [Verb::Read.into()])
}

pub fn write(scopes: impl IntoIterator<Item = ScopeType>) -> Statement {
    Statement::new(scopes, [Verb::Write.into()])
}

pub fn project_route(method: Method) -> Route {
    Route::new(method, "/projects/{project_id}", [ScopeType::Project])
}

pub fn cluster_route(method: Method) -> Route {
    Route::new(
        method,
        "/projects/{project_id}/clusters/{cluster_id}",
        [ScopeType::Project, ScopeType::Cluster],
    )
}

pub fn namespace_route() -> Route {
    Route::new(
        Method::Get,
        "/projects/{project_id}/clusters/{cluster_id}/namespaces/{namespace}",
        [ScopeType::Project, ScopeType::Cluster, ScopeType::Namespace],
    )
}

pub fn release_route() -> Route {
    Route::new(
        Method::Get,
        "/projects/{project_id}/clusters/{cluster_id}/namespaces/{namespace}/releases/{name}",
        [
            ScopeType::Project,
            ScopeType::Cluster,
            ScopeType::Namespace,
            ScopeType::Release,
        ],
    )
}

pub fn as_user(user_id: u64) -> RequestInput {
    RequestInput::new().bearer(format!("tok-{}", user_id))
}

pub fn cluster_request(user_id: u64, project: &str, cluster: &str) -> RequestInput {
    as_user(user_id)
        .param("project_id", project)
        .param("cluster_id", cluster)
}
