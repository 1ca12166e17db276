//! A thread-safe in-memory holder for the currently active [`Snapshot`]. [`ToggleRepository`]
//! serves any number of concurrent readers (evaluation) while a single writer (the refresh
//! loop) replaces the snapshot.
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::Snapshot;

/// Whether the repository has received definitions yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryState {
    /// No successful refresh yet. Every lookup returns "not found".
    Empty,
    /// A snapshot is installed.
    Ready,
}

/// `ToggleRepository` provides a `Sync` storage for toggle definitions.
///
/// The snapshot itself is always immutable and can only be replaced completely. Readers load
/// the current pointer without taking a lock and keep using the snapshot they loaded for the
/// whole operation, so they never observe a mix of two refreshes.
pub struct ToggleRepository {
    snapshot: ArcSwapOption<Snapshot>,
    empty: Arc<Snapshot>,
}

impl Default for ToggleRepository {
    fn default() -> ToggleRepository {
        ToggleRepository {
            snapshot: ArcSwapOption::empty(),
            empty: Arc::new(Snapshot::empty()),
        }
    }
}

impl ToggleRepository {
    /// Create a new empty repository.
    pub fn new() -> ToggleRepository {
        ToggleRepository::default()
    }

    /// Currently installed snapshot, or an empty snapshot before the first install. Never
    /// blocks.
    pub fn current(&self) -> Arc<Snapshot> {
        self.get_snapshot().unwrap_or_else(|| self.empty.clone())
    }

    /// Currently installed snapshot. Returns `None` if nothing has been installed yet.
    pub fn get_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.load_full()
    }

    pub fn state(&self) -> RepositoryState {
        if self.snapshot.load().is_some() {
            RepositoryState::Ready
        } else {
            RepositoryState::Empty
        }
    }

    /// Replace the active snapshot with a single atomic pointer swap.
    pub fn install(&self, snapshot: impl Into<Arc<Snapshot>>) {
        let snapshot = snapshot.into();
        log::debug!(target: "toggles", features = snapshot.len(); "installing new snapshot");
        self.snapshot.store(Some(snapshot));
    }
}
