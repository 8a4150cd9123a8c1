//! Per-session behavior options.

/// Options fixed when a session opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitOfWorkOptions {
    prune_on_pause: bool,
}

impl UnitOfWorkOptions {
    /// Creates the default options: no pruning.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict unmodified (`Loaded`) instances from the identity map on
    /// pause, bounding memory across long suspensions.
    ///
    /// `New`, `Updated` and `Removed` instances are never pruned.
    #[must_use]
    pub fn prune_on_pause(mut self, prune: bool) -> Self {
        self.prune_on_pause = prune;
        self
    }

    /// Returns true if pausing prunes unmodified instances.
    #[must_use]
    pub fn prunes_on_pause(&self) -> bool {
        self.prune_on_pause
    }
}
