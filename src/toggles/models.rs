use std::collections::HashMap;

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};

use super::constraints::Constraint;

/// A complete toggle definition set, as produced by a [`Fetcher`](crate::fetcher::Fetcher).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    /// Format version reported by the backend.
    #[serde(default)]
    pub version: u32,
    /// Feature records.
    ///
    /// Each record is wrapped in `TryParse` so that if one feature fails to parse (e.g., new
    /// server format), the remaining features are still usable.
    #[serde(default)]
    pub features: Vec<TryParse<Feature>>,
}

impl FeatureSet {
    /// Build a definition set from already-parsed features.
    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> FeatureSet {
        FeatureSet {
            version: 1,
            features: features.into_iter().map(TryParse::Parsed).collect(),
        }
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// A named, independently toggleable capability.
///
/// Features are immutable once published in a snapshot. A refresh replaces the whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub name: String,
    /// Server-side kill switch.
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub feature_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Activation strategies, OR-ed together. An empty list means "on for everyone" (subject to
    /// `enabled`).
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    /// Variants in declared order. Order is significant for both override precedence and the
    /// weighted walk.
    #[serde(default)]
    pub variants: Vec<VariantDefinition>,
}

impl Feature {
    /// A feature with no strategies and no variants.
    pub fn new(name: impl Into<String>, enabled: bool) -> Feature {
        Feature {
            name: name.into(),
            enabled,
            description: None,
            feature_type: None,
            project: None,
            strategies: Vec::new(),
            variants: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Feature {
        self.strategies.push(strategy);
        self
    }

    pub fn with_variant(mut self, variant: VariantDefinition) -> Feature {
        self.variants.push(variant);
        self
    }
}

/// A named activation rule and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub name: String,
    #[serde(default)]
    pub parameters: Parameters,
    /// All constraints must hold for the strategy to be considered.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl Strategy {
    pub fn new(name: impl Into<String>) -> Strategy {
        Strategy {
            name: name.into(),
            parameters: Parameters::default(),
            constraints: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Strategy {
        self.parameters.0.insert(key.into(), value.into());
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Strategy {
        self.constraints.push(constraint);
        self
    }
}

/// Strategy parameters. All values are strings on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct Parameters(HashMap<String, String>);

impl Parameters {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Split a comma-separated parameter into trimmed, non-empty items.
    pub fn list(&self, key: &str) -> impl Iterator<Item = &str> {
        self.get(key)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Parse a percentage parameter. Returns `None` for missing or malformed values.
    pub fn percentage(&self, key: &str) -> Option<f64> {
        self.get(key)?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite())
    }
}

/// Variant definition as published by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantDefinition {
    pub name: String,
    /// Relative weight. A feature whose variants sum to zero never selects a variant.
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub weight_type: WeightType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub overrides: Vec<Override>,
    /// Context field used to make the weighted pick sticky. `None` or `"default"` uses the
    /// identifier chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stickiness: Option<String>,
}

impl VariantDefinition {
    pub fn new(name: impl Into<String>, weight: u32) -> VariantDefinition {
        VariantDefinition {
            name: name.into(),
            weight,
            weight_type: WeightType::default(),
            payload: None,
            overrides: Vec::new(),
            stickiness: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> VariantDefinition {
        self.payload = Some(payload);
        self
    }

    pub fn with_override(mut self, item: Override) -> VariantDefinition {
        self.overrides.push(item);
        self
    }

    pub fn with_stickiness(mut self, stickiness: impl Into<String>) -> VariantDefinition {
        self.stickiness = Some(stickiness.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeightType {
    #[default]
    Variable,
    /// Weight was pinned by the author and is excluded from redistribution on the server.
    Fix,
}

/// Forces a variant when a context field matches one of `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    pub context_name: String,
    pub values: Vec<String>,
}

impl Override {
    pub fn new(
        context_name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Override {
        Override {
            context_name: context_name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Typed value attached to a variant. Opaque to selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub payload_type: PayloadType,
    pub value: String,
}

impl Payload {
    pub fn string(value: impl Into<String>) -> Payload {
        Payload {
            payload_type: PayloadType::String,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    String,
    Json,
    Csv,
    Number,
    #[serde(other)]
    Unknown,
}
