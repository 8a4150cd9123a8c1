//! Finder contract for reference-producing searches.

use crate::descriptor::EntityType;
use crate::error::FinderError;
use crate::query::{OrderBy, Predicate, Variables};
use crate::reference::EntityReference;

/// A search interface over committed entity state.
///
/// Finders produce [`EntityReference`]s, never live entities; the session
/// layer resolves each reference through its identity map so that query
/// results observe in-session modifications. Finders see only committed
/// state and therefore know nothing about entities created in an open
/// session.
///
/// # Invariants
///
/// - Results contain each matching reference exactly once
/// - `find_entities` applies ordering before pagination
/// - Finders must be `Send + Sync`; one finder serves many sessions
pub trait EntityFinder: Send + Sync {
    /// Finds the first entity of a type matching a predicate.
    ///
    /// Which match is "first" is finder-defined unless the caller orders
    /// results through [`find_entities`](Self::find_entities).
    ///
    /// # Errors
    ///
    /// Returns a [`FinderError`] if the search cannot be executed.
    fn find_entity(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
        variables: &Variables,
    ) -> Result<Option<EntityReference>, FinderError>;

    /// Finds all entities of a type matching a predicate.
    ///
    /// `first` skips that many matches after ordering; `max` caps how many
    /// are returned after the skip.
    ///
    /// # Errors
    ///
    /// Returns a [`FinderError`] if the search cannot be executed.
    fn find_entities(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
        order_by: &[OrderBy],
        first: Option<usize>,
        max: Option<usize>,
        variables: &Variables,
    ) -> Result<Vec<EntityReference>, FinderError>;

    /// Counts entities of a type matching a predicate.
    ///
    /// # Errors
    ///
    /// Returns a [`FinderError`] if the search cannot be executed. Callers
    /// must not treat a failed count as zero.
    fn count_entities(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
        variables: &Variables,
    ) -> Result<u64, FinderError>;
}
