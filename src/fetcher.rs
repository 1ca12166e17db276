//! The boundary to whatever transport delivers toggle definitions, and the refresh cycle that
//! turns a fetched definition set into an installed snapshot.
use crate::{repository::ToggleRepository, toggles::FeatureSet, Result, Snapshot};

/// Source of toggle definitions.
///
/// Implementations own the transport (HTTP, file, message bus) and its decoding. Any error keeps
/// the currently installed snapshot active.
pub trait Fetcher {
    fn fetch(&mut self) -> Result<FeatureSet>;
}

impl<T: FnMut() -> Result<FeatureSet>> Fetcher for T {
    fn fetch(&mut self) -> Result<FeatureSet> {
        self()
    }
}

/// A fetcher that always serves the same definition set.
#[derive(Debug, Clone)]
pub struct StaticFetcher {
    features: FeatureSet,
}

impl StaticFetcher {
    pub fn new(features: FeatureSet) -> StaticFetcher {
        StaticFetcher { features }
    }

    /// Parse a definition set from its JSON representation.
    pub fn from_json(json: &str) -> Result<StaticFetcher> {
        Ok(StaticFetcher::new(serde_json::from_str(json)?))
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&mut self) -> Result<FeatureSet> {
        Ok(self.features.clone())
    }
}

/// Run one refresh cycle.
///
/// On success the new snapshot is installed exactly once. On failure the error is logged and
/// returned, and the repository keeps its current snapshot.
pub fn refresh(fetcher: &mut impl Fetcher, repository: &ToggleRepository) -> Result<()> {
    log::debug!(target: "toggles", "fetching toggle definitions");
    match fetcher.fetch() {
        Ok(features) => {
            let snapshot = Snapshot::from_feature_set(features);
            log::debug!(target: "toggles", features = snapshot.len(); "successfully fetched toggle definitions");
            repository.install(snapshot);
            Ok(())
        }
        Err(err) => {
            log::warn!(target: "toggles", "failed to fetch toggle definitions, keeping the current snapshot: {err}");
            Err(err)
        }
    }
}
