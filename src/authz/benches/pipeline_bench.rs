//! Authorization pipeline benchmarks
//!
//! Measures chain evaluation against policies of growing size, and a full
//! cached pipeline run over the in-memory store.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stratum_authz::model::{Cluster, Project};
use stratum_authz::scope::{Method, Route, ScopeTree, ScopeType};
use stratum_authz::{
    AuditTrail, EngineConfig, InMemoryEntityStore, InMemoryPolicyLoader, InheritanceMode,
    PipelineBuilder, PolicyDocument, PolicyEvaluator, Principal, RequestAction, RequestInput,
    ResolverRegistry, ResourceId, RoleBinding, Statement, StaticTokenAuthenticator, TenantId,
    TenantPolicy, Verb,
};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

const TENANT: TenantId = TenantId(1);

fn create_policy(statements: usize) -> TenantPolicy {
    let mut document = PolicyDocument::new("bench", TENANT);
    for i in 0..statements {
        // Only the last statement grants the cluster
        let scope = if i + 1 == statements {
            ScopeType::Cluster
        } else {
            ScopeType::Registry
        };
        document.statements.push(
            Statement::new([ScopeType::Project, scope], [Verb::Read.into()])
                .on_resources([ResourceId::Numeric(1), ResourceId::Numeric(10)]),
        );
    }

    let mut policy = TenantPolicy::new(TENANT);
    policy.insert(document);
    policy
}

fn principal() -> Principal {
    Principal::new(1, "bench@example.com").with_binding(RoleBinding::new(
        TENANT,
        "member",
        vec!["bench".to_string()],
    ))
}

fn bench_evaluate_chain(c: &mut Criterion) {
    let chain = vec![
        RequestAction::new(ScopeType::Project, 1u64, Verb::Read),
        RequestAction::new(ScopeType::Cluster, 10u64, Verb::Read),
    ];
    let principal = principal();

    let mut group = c.benchmark_group("evaluate_chain");

    for statements in [1, 10, 100, 1000].iter() {
        let policy = create_policy(*statements);

        for mode in [InheritanceMode::ScopeExact, InheritanceMode::DescendantGrants] {
            let evaluator = PolicyEvaluator::new(mode);
            group.bench_with_input(
                BenchmarkId::new(mode.to_string(), statements),
                statements,
                |b, _| {
                    b.iter(|| {
                        black_box(evaluator.evaluate_chain(
                            black_box(&principal),
                            &policy,
                            &chain,
                        ))
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_pipeline_execute(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let pipeline = rt.block_on(async {
        let store = Arc::new(InMemoryEntityStore::new());
        store.insert_project(Project { id: 1, name: "bench".into() }).await;
        store
            .insert_cluster(Cluster {
                id: 10,
                project_id: 1,
                name: "prod".into(),
                server: "https://prod.k8s.local".into(),
            })
            .await;

        let loader = Arc::new(InMemoryPolicyLoader::new());
        let mut document = PolicyDocument::new("bench", TENANT);
        document.statements.push(Statement::new(
            [ScopeType::Project, ScopeType::Cluster],
            [Verb::Read.into()],
        ));
        loader.put_document(document).await;

        let authn = Arc::new(StaticTokenAuthenticator::new());
        authn.add_user(principal()).await;
        authn.issue_token("bench-token", 1).await;

        let config = EngineConfig::default();
        let engine = Arc::new(config.policy_engine(loader));
        let builder = PipelineBuilder::new(
            Arc::new(ScopeTree::new().unwrap()),
            authn,
            engine,
            ResolverRegistry::for_store(store),
            Arc::new(AuditTrail::new(1_000)),
        )
        .config(config);

        let route = Route::new(
            Method::Get,
            "/projects/{project_id}/clusters/{cluster_id}",
            [ScopeType::Project, ScopeType::Cluster],
        )
        .quiet();
        builder.build(Arc::new(route)).unwrap()
    });

    c.bench_function("pipeline_execute_cached", |b| {
        b.to_async(&rt).iter(|| async {
            let input = RequestInput::new()
                .bearer("bench-token")
                .param("project_id", "1")
                .param("cluster_id", "10");
            black_box(pipeline.execute(input, CancellationToken::new()).await.is_ok())
        })
    });
}

criterion_group!(benches, bench_evaluate_chain, bench_pipeline_execute);
criterion_main!(benches);
