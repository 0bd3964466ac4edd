//! Scope tree with startup-time ordering validation
//!
//! The tree is built once from the parent relation and checked for cycles with
//! Kahn's algorithm. Route chains are validated against it before any request
//! is served, so an ordering mistake in a route surfaces as a startup failure
//! instead of an authorization failure at request time.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use thiserror::Error;

use super::types::ScopeType;

/// Scope graph and chain validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScopeGraphError {
    /// Chain has no elements
    #[error("scope chain is empty")]
    EmptyChain,

    /// Chain does not start at a root scope
    #[error("scope chain must start at a root scope, found {0}")]
    NotRooted(ScopeType),

    /// Adjacent chain elements are not a declared parent/child pair
    #[error("{parent} -> {child} is not a declared parent/child edge")]
    MissingEdge { parent: ScopeType, child: ScopeType },

    /// Scope repeated inside one chain
    #[error("scope {0} appears more than once in the chain")]
    Repeated(ScopeType),

    /// Scope is not part of the tree
    #[error("scope {0} is not part of the scope tree")]
    UnknownScope(ScopeType),

    /// Scope declared twice while building the tree
    #[error("scope {0} declared more than once")]
    DuplicateScope(ScopeType),

    /// Parent relation contains a cycle
    #[error("circular parent relation: {0}")]
    Cycle(String),
}

/// Tree node: a scope and its valid children
#[derive(Debug, Clone)]
pub struct ScopeNode {
    pub scope: ScopeType,
    pub parent: Option<ScopeType>,
    pub children: BTreeSet<ScopeType>,
}

static NO_CHILDREN: BTreeSet<ScopeType> = BTreeSet::new();

/// Immutable scope hierarchy
///
/// # Example
///
/// ```
/// use stratum_authz::scope::{ScopeTree, ScopeType};
///
/// let tree = ScopeTree::new().unwrap();
/// assert_eq!(tree.parent_of(ScopeType::Namespace), Some(ScopeType::Cluster));
/// assert!(tree
///     .validate_chain(&[ScopeType::Project, ScopeType::Cluster, ScopeType::Namespace])
///     .is_ok());
/// assert!(tree
///     .validate_chain(&[ScopeType::Project, ScopeType::Namespace])
///     .is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ScopeTree {
    nodes: BTreeMap<ScopeType, ScopeNode>,
    /// Topological order, parents before children
    order: Vec<ScopeType>,
}

impl ScopeTree {
    /// Build the tree from the static parent relation of [`ScopeType`]
    pub fn new() -> Result<Self, ScopeGraphError> {
        Self::from_edges(ScopeType::ALL.iter().map(|scope| (*scope, scope.parent())))
    }

    /// Build a tree from explicit `(scope, parent)` declarations
    ///
    /// # Errors
    ///
    /// Fails when a scope is declared twice, a parent is never declared, or
    /// the parent relation is circular.
    pub fn from_edges<I>(edges: I) -> Result<Self, ScopeGraphError>
    where
        I: IntoIterator<Item = (ScopeType, Option<ScopeType>)>,
    {
        let mut nodes: BTreeMap<ScopeType, ScopeNode> = BTreeMap::new();

        for (scope, parent) in edges {
            if nodes.contains_key(&scope) {
                return Err(ScopeGraphError::DuplicateScope(scope));
            }
            nodes.insert(
                scope,
                ScopeNode {
                    scope,
                    parent,
                    children: BTreeSet::new(),
                },
            );
        }

        let links: Vec<(ScopeType, ScopeType)> = nodes
            .values()
            .filter_map(|node| node.parent.map(|parent| (parent, node.scope)))
            .collect();

        for (parent, child) in links {
            match nodes.get_mut(&parent) {
                Some(node) => {
                    node.children.insert(child);
                }
                None => return Err(ScopeGraphError::UnknownScope(parent)),
            }
        }

        let order = Self::topological_sort(&nodes)?;

        Ok(Self { nodes, order })
    }

    /// Kahn's algorithm over parent -> child edges
    fn topological_sort(
        nodes: &BTreeMap<ScopeType, ScopeNode>,
    ) -> Result<Vec<ScopeType>, ScopeGraphError> {
        let mut in_degree: HashMap<ScopeType, usize> = nodes
            .values()
            .map(|node| (node.scope, usize::from(node.parent.is_some())))
            .collect();

        let mut queue: VecDeque<ScopeType> = nodes
            .keys()
            .copied()
            .filter(|scope| in_degree[scope] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(nodes.len());

        while let Some(current) = queue.pop_front() {
            sorted.push(current);

            for child in &nodes[&current].children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }

        if sorted.len() != nodes.len() {
            let stuck = nodes
                .keys()
                .copied()
                .find(|scope| !sorted.contains(scope));
            let path = stuck
                .map(|start| Self::cycle_path(nodes, start))
                .unwrap_or_else(|| "unknown cycle".to_string());
            return Err(ScopeGraphError::Cycle(path));
        }

        Ok(sorted)
    }

    /// Walk parent links from `start` until a scope repeats
    fn cycle_path(nodes: &BTreeMap<ScopeType, ScopeNode>, start: ScopeType) -> String {
        let mut path = vec![start];
        let mut current = start;

        while let Some(parent) = nodes.get(&current).and_then(|node| node.parent) {
            if let Some(pos) = path.iter().position(|scope| *scope == parent) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(parent.to_string());
                return cycle.join(" -> ");
            }
            path.push(parent);
            current = parent;
        }

        path.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" -> ")
    }

    /// Parent of `scope`, `None` for roots and unknown scopes
    pub fn parent_of(&self, scope: ScopeType) -> Option<ScopeType> {
        self.nodes.get(&scope).and_then(|node| node.parent)
    }

    /// Valid children of `scope`
    pub fn children_of(&self, scope: ScopeType) -> &BTreeSet<ScopeType> {
        self.nodes
            .get(&scope)
            .map(|node| &node.children)
            .unwrap_or(&NO_CHILDREN)
    }

    pub fn node(&self, scope: ScopeType) -> Option<&ScopeNode> {
        self.nodes.get(&scope)
    }

    pub fn roots(&self) -> impl Iterator<Item = ScopeType> + '_ {
        self.nodes
            .values()
            .filter(|node| node.parent.is_none())
            .map(|node| node.scope)
    }

    /// Scopes in topological order, parents before children
    pub fn topological_order(&self) -> &[ScopeType] {
        &self.order
    }

    /// Ancestors of `scope`, root first, excluding `scope` itself
    pub fn ancestors(&self, scope: ScopeType) -> Vec<ScopeType> {
        let mut ancestors = Vec::new();
        let mut current = self.parent_of(scope);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.parent_of(parent);
        }
        ancestors.reverse();
        ancestors
    }

    /// Check that `chain` is a root-to-leaf path through the tree
    ///
    /// # Errors
    ///
    /// Fails if the chain is empty, does not begin at a root, repeats a scope,
    /// or contains an adjacent pair that is not a declared parent/child edge.
    pub fn validate_chain(&self, chain: &[ScopeType]) -> Result<(), ScopeGraphError> {
        let Some(first) = chain.first() else {
            return Err(ScopeGraphError::EmptyChain);
        };

        for scope in chain {
            if !self.nodes.contains_key(scope) {
                return Err(ScopeGraphError::UnknownScope(*scope));
            }
        }

        if self.parent_of(*first).is_some() {
            return Err(ScopeGraphError::NotRooted(*first));
        }

        let mut seen = BTreeSet::new();
        for scope in chain {
            if !seen.insert(*scope) {
                return Err(ScopeGraphError::Repeated(*scope));
            }
        }

        for pair in chain.windows(2) {
            let (parent, child) = (pair[0], pair[1]);
            if !self.children_of(parent).contains(&child) {
                return Err(ScopeGraphError::MissingEdge { parent, child });
            }
        }

        Ok(())
    }
}
