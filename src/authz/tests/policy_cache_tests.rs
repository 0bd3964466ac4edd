//! Policy staleness bounds through the full pipeline

mod common;

use std::time::Duration;

use stratum_authz::pipeline::RejectReason;
use stratum_authz::scope::{Method, ScopeType};
use stratum_authz::{EngineConfig, PolicyCacheConfig};
use tokio_util::sync::CancellationToken;

use common::*;

fn config(policy_cache: PolicyCacheConfig) -> EngineConfig {
    EngineConfig {
        policy_cache,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_revocation_visible_after_ttl() {
    let h = Harness::new(config(PolicyCacheConfig::ttl(Duration::from_secs(10)))).await;
    h.grant(ALICE, vec![read([ScopeType::Project, ScopeType::Cluster])]).await;
    let pipeline = h.pipeline(cluster_route(Method::Get));

    pipeline
        .execute(cluster_request(ALICE, "1", "10"), CancellationToken::new())
        .await
        .unwrap();

    h.revoke_all(ALICE).await;

    // Within the staleness bound the cached grant still applies
    tokio::time::advance(Duration::from_secs(5)).await;
    pipeline
        .execute(cluster_request(ALICE, "1", "10"), CancellationToken::new())
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(6)).await;
    let rejection = pipeline
        .execute(cluster_request(ALICE, "1", "10"), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(rejection.reason(), RejectReason::PolicyDenied);
    assert_eq!(h.engine.store().stats().expirations, 1);
}

#[tokio::test]
async fn test_uncached_revocation_is_immediate() {
    let h = Harness::new(config(PolicyCacheConfig::uncached())).await;
    h.grant(ALICE, vec![read([ScopeType::Project, ScopeType::Cluster])]).await;
    let pipeline = h.pipeline(cluster_route(Method::Get));

    pipeline
        .execute(cluster_request(ALICE, "1", "10"), CancellationToken::new())
        .await
        .unwrap();

    h.revoke_all(ALICE).await;
    let rejection = pipeline
        .execute(cluster_request(ALICE, "1", "10"), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(rejection.status_code(), 403);
    assert_eq!(h.loader.load_count(), 2);
}

#[tokio::test]
async fn test_explicit_invalidation() {
    let h = Harness::new(EngineConfig::default()).await;
    h.grant(ALICE, vec![read([ScopeType::Project, ScopeType::Cluster])]).await;
    let pipeline = h.pipeline(cluster_route(Method::Get));

    pipeline
        .execute(cluster_request(ALICE, "1", "10"), CancellationToken::new())
        .await
        .unwrap();
    h.revoke_all(ALICE).await;

    // Invalidating another tenant leaves ours cached
    h.engine.store().invalidate(GLOBEX);
    pipeline
        .execute(cluster_request(ALICE, "1", "10"), CancellationToken::new())
        .await
        .unwrap();

    h.engine.store().invalidate(ACME);
    let rejection = pipeline
        .execute(cluster_request(ALICE, "1", "10"), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(rejection.reason(), RejectReason::PolicyDenied);
}

#[tokio::test]
async fn test_one_load_per_ttl_window() {
    let h = Harness::new(EngineConfig::default()).await;
    h.grant(ALICE, vec![read([ScopeType::Project, ScopeType::Cluster])]).await;
    h.grant(BOB, vec![read([ScopeType::Project, ScopeType::Cluster])]).await;
    let pipeline = h.pipeline(cluster_route(Method::Get));

    for user in [ALICE, BOB, ALICE, BOB, ALICE] {
        pipeline
            .execute(cluster_request(user, "1", "11"), CancellationToken::new())
            .await
            .unwrap();
    }

    let stats = h.engine.store().stats();
    assert_eq!(h.loader.load_count(), 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 4);
    assert_eq!(stats.entries, 1);
}

#[tokio::test]
async fn test_grant_visible_after_invalidation() {
    let h = Harness::new(EngineConfig::default()).await;
    h.grant(ALICE, vec![read([ScopeType::Project])]).await;
    let pipeline = h.pipeline(cluster_route(Method::Get));

    let rejection = pipeline
        .execute(cluster_request(ALICE, "1", "10"), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(rejection.reason(), RejectReason::PolicyDenied);

    h.grant(ALICE, vec![read([ScopeType::Cluster])]).await;
    h.engine.store().invalidate_all();

    pipeline
        .execute(cluster_request(ALICE, "1", "10"), CancellationToken::new())
        .await
        .unwrap();
}
