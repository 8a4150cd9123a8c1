//! Completion callbacks and entity lifecycle hooks.

use crate::entity::Entity;
use crate::error::LifecycleError;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
    /// Every store committed its changes.
    Completed,
    /// The session was discarded; no changes were applied.
    Discarded,
}

/// Observer registered on a single session.
///
/// The callback list is snapshotted when completion starts, so registering
/// or unregistering from inside a hook affects only later completions.
/// `before_completion` runs after every store has prepared and may still
/// abort the commit; `after_completion` runs once the outcome is settled
/// and its errors are logged and swallowed.
pub trait UnitOfWorkCallback {
    /// Called after prepare succeeds, before any committer is applied.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the completion; every prepared committer
    /// is cancelled and the session stays open.
    fn before_completion(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Called after the session closed, with the final status.
    ///
    /// # Errors
    ///
    /// Errors are logged and swallowed; the outcome is already settled.
    fn after_completion(&self, _status: CompletionStatus) -> Result<(), LifecycleError> {
        Ok(())
    }
}

/// Lifecycle hooks attached to an entity type at module assembly.
///
/// The session resolves the hooks once per instance and invokes them for
/// creation, removal and completion. All methods default to no-ops so
/// implementors override only what they observe.
pub trait EntityLifecycle: Send + Sync {
    /// Called when a builder finalizes a new entity, before it enters the
    /// identity map.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the build; the pending allocation is
    /// dropped and the entity never becomes visible.
    fn on_create(&self, _entity: &Entity) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Called when an entity is removed, before its status changes.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the removal.
    fn on_remove(&self, _entity: &Entity) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Called during completion after every store prepared, for each cached
    /// non-removed entity of this type.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the completion; every prepared committer
    /// is cancelled and the session stays open.
    fn before_completion(&self, _entity: &Entity) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Called once the session closed, for each snapshotted non-removed
    /// entity of this type.
    ///
    /// # Errors
    ///
    /// Errors are logged and swallowed; the outcome is already settled.
    fn after_completion(
        &self,
        _entity: &Entity,
        _status: CompletionStatus,
    ) -> Result<(), LifecycleError> {
        Ok(())
    }
}
