//! Per-request resolved-scope context
//!
//! Append-only record of the entities validated so far for one request,
//! keyed by [`ScopeType`]. Lookups for scopes the route never declared, or
//! that have not been resolved yet, fail instead of yielding a default.

use std::collections::BTreeMap;

use crate::error::ContextError;
use crate::model::{
    Cluster, GitInstallation, HelmRepo, Infra, Invite, Namespace, Operation, Project, Registry,
    Release, ResolvedEntity, StructuralScope, User,
};
use crate::scope::ScopeType;
use crate::types::ResourceId;

/// Entity type that can be read back from the context by its scope
pub trait ScopedEntity: Sized {
    const SCOPE: ScopeType;

    fn from_resolved(entity: &ResolvedEntity) -> Option<&Self>;
}

macro_rules! scoped_entity {
    ($($ty:ident => $scope:ident),* $(,)?) => {
        $(
            impl ScopedEntity for $ty {
                const SCOPE: ScopeType = ScopeType::$scope;

                fn from_resolved(entity: &ResolvedEntity) -> Option<&Self> {
                    match entity {
                        ResolvedEntity::$ty(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

scoped_entity! {
    User => User,
    Project => Project,
    Cluster => Cluster,
    Namespace => Namespace,
    Release => Release,
    Registry => Registry,
    Infra => Infra,
    Invite => Invite,
    GitInstallation => GitInstallation,
    HelmRepo => HelmRepo,
    Operation => Operation,
}

/// Resolved entities of one request
#[derive(Debug, Clone)]
pub struct ResolvedScopeContext {
    /// Chain declared by the route, root first
    declared: Vec<ScopeType>,
    entries: BTreeMap<ScopeType, ResolvedEntity>,
}

impl ResolvedScopeContext {
    pub fn new(declared: &[ScopeType]) -> Self {
        Self {
            declared: declared.to_vec(),
            entries: BTreeMap::new(),
        }
    }

    /// Append an entity under its scope
    ///
    /// # Errors
    ///
    /// Fails if the scope is not declared by the route or was already
    /// resolved; the context never overwrites.
    pub fn publish(&mut self, entity: ResolvedEntity) -> Result<(), ContextError> {
        let scope = entity.scope();

        if !self.declared.contains(&scope) {
            return Err(ContextError::Undeclared(scope));
        }
        if self.entries.contains_key(&scope) {
            return Err(ContextError::AlreadyResolved(scope));
        }

        self.entries.insert(scope, entity);
        Ok(())
    }

    /// Typed accessor, e.g. `ctx.get::<Cluster>()`
    pub fn get<T: ScopedEntity>(&self) -> Result<&T, ContextError> {
        let entity = self.get_resolved(T::SCOPE)?;

        T::from_resolved(entity).ok_or(ContextError::WrongType {
            scope: T::SCOPE,
            expected: T::SCOPE.as_str(),
            found: entity.type_name(),
        })
    }

    /// Untyped accessor for any declared scope
    pub fn get_resolved(&self, scope: ScopeType) -> Result<&ResolvedEntity, ContextError> {
        if !self.declared.contains(&scope) {
            return Err(ContextError::Undeclared(scope));
        }

        self.entries.get(&scope).ok_or(ContextError::Unresolved(scope))
    }

    /// Structural scope marker, for scopes without stored entities
    pub fn structural(&self, scope: ScopeType) -> Result<&StructuralScope, ContextError> {
        match self.get_resolved(scope)? {
            ResolvedEntity::Structural(inner) => Ok(inner),
            other => Err(ContextError::WrongType {
                scope,
                expected: "structural",
                found: other.type_name(),
            }),
        }
    }

    /// Identifier of a resolved scope
    pub fn identifier(&self, scope: ScopeType) -> Result<ResourceId, ContextError> {
        self.get_resolved(scope).map(ResolvedEntity::key)
    }

    /// Most recently resolved entity of the scope's declared parent
    pub fn parent_of(&self, scope: ScopeType) -> Option<&ResolvedEntity> {
        let index = self.declared.iter().position(|s| *s == scope)?;
        let parent = index.checked_sub(1).map(|i| self.declared[i])?;
        self.entries.get(&parent)
    }

    pub fn contains(&self, scope: ScopeType) -> bool {
        self.entries.contains_key(&scope)
    }

    pub fn declared(&self) -> &[ScopeType] {
        &self.declared
    }

    /// Resolved entities in chain order
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedEntity> {
        self.declared.iter().filter_map(|scope| self.entries.get(scope))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
