use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    toggles::{Feature, FeatureSet, TryParse},
    Str,
};

/// The complete, immutable set of feature definitions active at a point in time.
///
/// A snapshot is never modified after it is installed in the
/// [`ToggleRepository`](crate::repository::ToggleRepository); a refresh builds a new one.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Timestamp when the definitions were received. `None` for the empty snapshot.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Format version reported by the backend.
    pub version: u32,
    features: HashMap<Str, Feature>,
}

impl Snapshot {
    /// A snapshot with no features.
    pub fn empty() -> Snapshot {
        Snapshot::default()
    }

    /// Build a snapshot from a definition set.
    ///
    /// Records that failed to parse are skipped. If two records share a name, the later one
    /// wins.
    pub fn from_feature_set(set: FeatureSet) -> Snapshot {
        let mut features = HashMap::with_capacity(set.features.len());
        for record in set.features {
            match record {
                TryParse::Parsed(feature) => {
                    let name = Str::from(feature.name.as_str());
                    if features.insert(name.clone(), feature).is_some() {
                        log::warn!(target: "toggles", feature_name = name; "duplicate feature definition, keeping the last one");
                    }
                }
                TryParse::ParseFailed(value) => {
                    let name = value.get("name").and_then(|n| n.as_str()).unwrap_or("<unnamed>");
                    log::warn!(target: "toggles", feature_name = name; "skipping feature that failed to parse");
                }
            }
        }

        Snapshot {
            fetched_at: Some(Utc::now()),
            version: set.version,
            features,
        }
    }

    /// Look up a feature by name.
    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features.get(name)
    }

    /// Look up a feature together with its shared name.
    pub(crate) fn get_key_value(&self, name: &str) -> Option<(&Str, &Feature)> {
        self.features.get_key_value(name)
    }

    /// Names of all features, sorted.
    pub fn feature_names(&self) -> Vec<Str> {
        let mut names: Vec<Str> = self.features.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
