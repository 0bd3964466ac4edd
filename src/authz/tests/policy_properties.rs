//! Property tests for policy evaluation
//!
//! Grant-only evaluation must be monotonic: adding a statement can turn a
//! denial into a grant, never the reverse.

use proptest::prelude::*;
use stratum_authz::scope::ScopeType;
use stratum_authz::{
    InheritanceMode, PolicyDocument, PolicyEvaluator, Principal, RequestAction, ResourceId,
    RoleBinding, Statement, TenantId, TenantPolicy, Verb, VerbGrant,
};

const TENANT: TenantId = TenantId(1);

const CHAIN: [ScopeType; 4] = [
    ScopeType::Project,
    ScopeType::Cluster,
    ScopeType::Namespace,
    ScopeType::Release,
];

fn resource_for(scope: ScopeType, n: u64) -> ResourceId {
    match scope {
        ScopeType::Namespace | ScopeType::Release => ResourceId::Name(format!("n{}", n)),
        _ => ResourceId::Numeric(n),
    }
}

fn verb_strategy() -> impl Strategy<Value = Verb> {
    prop_oneof![Just(Verb::Read), Just(Verb::Write)]
}

fn statement_strategy() -> impl Strategy<Value = Statement> {
    (
        prop::collection::btree_set(prop::sample::select(CHAIN.to_vec()), 1..=3),
        prop_oneof![
            Just(vec![VerbGrant::Verb(Verb::Read)]),
            Just(vec![VerbGrant::Verb(Verb::Write)]),
            Just(vec![VerbGrant::Any]),
        ],
        prop::option::of(prop::collection::vec(1u64..4, 1..3)),
        any::<bool>(),
    )
        .prop_map(|(scopes, verbs, ids, descendants)| {
            let mut statement = Statement::new(scopes, verbs);
            if let Some(ids) = ids {
                statement = statement.on_resources(ids.into_iter().flat_map(|n| {
                    [ResourceId::Numeric(n), ResourceId::Name(format!("n{}", n))]
                }));
            }
            if descendants {
                statement = statement.with_descendants();
            }
            statement
        })
}

fn chain_strategy() -> impl Strategy<Value = Vec<RequestAction>> {
    (1usize..=4, prop::collection::vec(1u64..4, 4), verb_strategy()).prop_map(
        |(len, ids, verb)| {
            CHAIN[..len]
                .iter()
                .zip(ids)
                .map(|(scope, n)| RequestAction::new(*scope, resource_for(*scope, n), verb))
                .collect()
        },
    )
}

fn principal() -> Principal {
    Principal::new(7, "prop@example.com").with_binding(RoleBinding::new(
        TENANT,
        "member",
        vec!["doc".to_string()],
    ))
}

fn tenant_policy(statements: Vec<Statement>) -> TenantPolicy {
    let mut document = PolicyDocument::new("doc", TENANT);
    document.statements = statements;

    let mut policy = TenantPolicy::new(TENANT);
    policy.insert(document);
    policy
}

fn modes() -> [PolicyEvaluator; 2] {
    [
        PolicyEvaluator::new(InheritanceMode::ScopeExact),
        PolicyEvaluator::new(InheritanceMode::DescendantGrants),
    ]
}

proptest! {
    #[test]
    fn test_adding_statement_never_revokes(
        statements in prop::collection::vec(statement_strategy(), 0..5),
        extra in statement_strategy(),
        chain in chain_strategy(),
    ) {
        let before = tenant_policy(statements.clone());
        let mut grown = statements;
        grown.push(extra);
        let after = tenant_policy(grown);

        for evaluator in modes() {
            for index in 0..chain.len() {
                let was = evaluator.evaluate(&principal(), &before, &chain, index).allowed;
                let now = evaluator.evaluate(&principal(), &after, &chain, index).allowed;
                prop_assert!(!was || now);
            }
        }
    }

    #[test]
    fn test_chain_is_conjunction(
        statements in prop::collection::vec(statement_strategy(), 0..6),
        chain in chain_strategy(),
    ) {
        let policy = tenant_policy(statements);

        for evaluator in modes() {
            let all = (0..chain.len())
                .all(|i| evaluator.evaluate(&principal(), &policy, &chain, i).allowed);
            let decision = evaluator.evaluate_chain(&principal(), &policy, &chain);
            prop_assert_eq!(decision.allowed, all);
        }
    }

    #[test]
    fn test_descendant_mode_only_widens(
        statements in prop::collection::vec(statement_strategy(), 0..6),
        chain in chain_strategy(),
    ) {
        let policy = tenant_policy(statements);
        let [exact, descendants] = modes();

        for index in 0..chain.len() {
            if exact.evaluate(&principal(), &policy, &chain, index).allowed {
                prop_assert!(descendants.evaluate(&principal(), &policy, &chain, index).allowed);
            }
        }
    }

    #[test]
    fn test_unbound_principal_is_denied(
        statements in prop::collection::vec(statement_strategy(), 0..6),
        chain in chain_strategy(),
    ) {
        let policy = tenant_policy(statements);
        let stranger = Principal::new(9, "stranger@example.com");

        for evaluator in modes() {
            prop_assert!(!evaluator.evaluate_chain(&stranger, &policy, &chain).allowed);
        }
    }

    #[test]
    fn test_scope_exact_ignores_other_scopes(
        statements in prop::collection::vec(statement_strategy(), 0..6),
        chain in chain_strategy(),
    ) {
        let policy = tenant_policy(statements.clone());
        let evaluator = PolicyEvaluator::new(InheritanceMode::ScopeExact);
        let leaf = chain.len() - 1;

        // Only statements naming the leaf's scope matter for the leaf
        let relevant: Vec<Statement> = statements
            .into_iter()
            .filter(|s| s.covers(chain[leaf].scope))
            .collect();
        let narrowed = tenant_policy(relevant);

        prop_assert_eq!(
            evaluator.evaluate(&principal(), &policy, &chain, leaf).allowed,
            evaluator.evaluate(&principal(), &narrowed, &chain, leaf).allowed
        );
    }
}
