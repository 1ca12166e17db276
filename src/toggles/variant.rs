use serde::{Deserialize, Serialize};

use crate::{sharder::Sharder, Context};

use super::{
    models::{Feature, Payload, VariantDefinition},
    strategy::{default_stickiness, random_stickiness, DEFAULT_STICKINESS, RANDOM_STICKINESS},
};

/// Name of the sentinel variant returned when no real variant applies.
pub const DISABLED_VARIANT_NAME: &str = "disabled";

/// Outcome of variant selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    /// `true` for every selected variant, `false` only for [`Variant::disabled()`].
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Variant {
    /// The sentinel variant.
    pub fn disabled() -> Variant {
        Variant {
            name: DISABLED_VARIANT_NAME.to_owned(),
            enabled: false,
            payload: None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        !self.enabled
    }
}

impl Default for Variant {
    fn default() -> Variant {
        Variant::disabled()
    }
}

impl From<&VariantDefinition> for Variant {
    fn from(definition: &VariantDefinition) -> Variant {
        Variant {
            name: definition.name.clone(),
            enabled: true,
            payload: definition.payload.clone(),
        }
    }
}

/// Select a variant of `feature` for `context`.
///
/// Only the feature's kill switch is consulted here; strategy evaluation is the caller's job.
/// Overrides are checked first in declared order, then the weighted walk runs over the sticky
/// bucket.
pub fn select_variant(feature: &Feature, context: &Context, sharder: &impl Sharder) -> Variant {
    if !feature.enabled || feature.variants.is_empty() {
        return Variant::disabled();
    }

    if let Some(variant) = override_variant(feature, context) {
        return variant.into();
    }

    weighted_variant(feature, context, sharder)
        .map(Variant::from)
        .unwrap_or_else(Variant::disabled)
}

/// First variant (in declared order) with an override matching the context.
fn override_variant<'a>(feature: &'a Feature, context: &Context) -> Option<&'a VariantDefinition> {
    feature.variants.iter().find(|variant| {
        variant.overrides.iter().any(|o| {
            context
                .field(&o.context_name)
                .is_some_and(|value| o.values.iter().any(|v| *v == *value))
        })
    })
}

fn weighted_variant<'a>(
    feature: &'a Feature,
    context: &Context,
    sharder: &impl Sharder,
) -> Option<&'a VariantDefinition> {
    let total_weight: u64 = feature.variants.iter().map(|v| u64::from(v.weight)).sum();
    if total_weight == 0 {
        return None;
    }
    let normalizer = u32::try_from(total_weight).unwrap_or(u32::MAX);

    // Variants of one feature share stickiness, so the first one decides.
    let seed = variant_stickiness(feature.variants[0].stickiness.as_deref(), context);
    let target = u64::from(sharder.get_shard(format!("{seed}:{}", feature.name), normalizer));

    let mut cumulative = 0u64;
    feature.variants.iter().find(|variant| {
        cumulative += u64::from(variant.weight);
        target < cumulative
    })
}

fn variant_stickiness(stickiness: Option<&str>, context: &Context) -> String {
    match stickiness.unwrap_or(DEFAULT_STICKINESS) {
        "" | DEFAULT_STICKINESS => default_stickiness(context),
        RANDOM_STICKINESS => random_stickiness(),
        field => context
            .field(field)
            .map(|value| value.into_owned())
            .unwrap_or_else(|| default_stickiness(context)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::{select_variant, Variant, DISABLED_VARIANT_NAME};
    use crate::{
        sharder::{DeterministicSharder, Murmur3Sharder},
        toggles::models::{Feature, Override, Payload, VariantDefinition},
        Context,
    };

    fn variants_with_override() -> Vec<VariantDefinition> {
        vec![
            VariantDefinition::new("VarA", 33)
                .with_payload(Payload::string("Test 1"))
                .with_override(Override::new("userId", ["1"]))
                .with_override(Override::new("sessionId", ["ABCDE"])),
            VariantDefinition::new("VarB", 33)
                .with_payload(Payload::string("Test 2"))
                .with_override(Override::new("remoteAddress", ["127.0.0.1"])),
            VariantDefinition::new("VarC", 34)
                .with_payload(Payload::string("Test 3"))
                .with_override(Override::new("env", ["dev"])),
        ]
    }

    fn variants_without_override() -> Vec<VariantDefinition> {
        vec![
            VariantDefinition::new("VarD", 33),
            VariantDefinition::new("VarE", 33),
            VariantDefinition::new("VarF", 34),
        ]
    }

    fn feature(enabled: bool, variants: Vec<VariantDefinition>) -> Feature {
        Feature {
            variants,
            ..Feature::new("test.variants", enabled)
        }
    }

    fn select(feature: &Feature, context: &Context) -> Variant {
        select_variant(feature, context, &Murmur3Sharder)
    }

    #[test]
    fn no_variants_returns_disabled() {
        let result = select(&feature(true, vec![]), &Context::new());
        assert_eq!(result, Variant::disabled());
        assert_eq!(result.name, DISABLED_VARIANT_NAME);
        assert!(!result.enabled);
        assert_eq!(result.payload, None);
    }

    #[test]
    fn disabled_feature_returns_disabled_even_if_override_matches() {
        let context = Context::new()
            .with_user_id("1")
            .with_session_id("ABCDE")
            .with_remote_address("127.0.0.1");
        assert_eq!(
            select(&feature(false, variants_with_override()), &context),
            Variant::disabled()
        );
    }

    #[test]
    fn override_on_user_id() {
        let context = Context::new()
            .with_user_id("1")
            .with_session_id("ABCDE")
            .with_remote_address("127.0.0.1");
        let result = select(&feature(true, variants_with_override()), &context);
        assert_eq!(result.name, "VarA");
        assert!(result.enabled);
        assert_eq!(result.payload, Some(Payload::string("Test 1")));
    }

    #[test]
    fn override_on_remote_address() {
        let context = Context::new()
            .with_session_id("FGHIJ")
            .with_remote_address("127.0.0.1");
        let result = select(&feature(true, variants_with_override()), &context);
        assert_eq!(result.name, "VarB");
        assert!(result.enabled);
        assert_eq!(result.payload, Some(Payload::string("Test 2")));
    }

    #[test]
    fn override_on_session_id() {
        let context = Context::new()
            .with_user_id("123")
            .with_session_id("ABCDE")
            .with_remote_address("127.0.0.1");
        let result = select(&feature(true, variants_with_override()), &context);
        assert_eq!(result.name, "VarA");
        assert_eq!(result.payload, Some(Payload::string("Test 1")));
    }

    #[test]
    fn override_on_custom_property() {
        let context = Context::new().with_property("env", "dev");
        let result = select(&feature(true, variants_with_override()), &context);
        assert_eq!(result.name, "VarC");
        assert!(result.enabled);
        assert_eq!(result.payload, Some(Payload::string("Test 3")));
    }

    #[test]
    fn weighted_selection_by_user_id() {
        let feature = feature(true, variants_without_override());
        for (user_id, expected) in [("40", "VarD"), ("123", "VarE"), ("163", "VarF")] {
            let result = select(&feature, &Context::new().with_user_id(user_id));
            assert_eq!(result.name, expected, "user {user_id}");
            assert!(result.enabled);
        }
    }

    #[test]
    fn override_beats_weights() {
        // All weight sits on VarB, but VarA's override wins.
        let feature = feature(
            true,
            vec![
                VariantDefinition::new("VarA", 0).with_override(Override::new("userId", ["7"])),
                VariantDefinition::new("VarB", 100),
            ],
        );
        assert_eq!(
            select(&feature, &Context::new().with_user_id("7")).name,
            "VarA"
        );
        assert_eq!(
            select(&feature, &Context::new().with_user_id("8")).name,
            "VarB"
        );
    }

    #[test]
    fn first_matching_variant_wins() {
        let feature = feature(
            true,
            vec![
                VariantDefinition::new("first", 50).with_override(Override::new("env", ["dev"])),
                VariantDefinition::new("second", 50).with_override(Override::new("env", ["dev"])),
            ],
        );
        assert_eq!(
            select(&feature, &Context::new().with_property("env", "dev")).name,
            "first"
        );
    }

    #[test]
    fn zero_total_weight_returns_disabled() {
        let feature = feature(
            true,
            vec![
                VariantDefinition::new("a", 0),
                VariantDefinition::new("b", 0),
            ],
        );
        assert_eq!(
            select(&feature, &Context::new().with_user_id("1")),
            Variant::disabled()
        );
    }

    #[test]
    fn selection_is_deterministic_for_stable_stickiness() {
        let feature = feature(true, variants_without_override());
        let context = Context::new().with_user_id("user-42");
        let first = select(&feature, &context);
        for _ in 0..100 {
            assert_eq!(select(&feature, &context), first);
        }
    }

    #[test]
    fn custom_stickiness_field() {
        let feature = feature(
            true,
            vec![
                VariantDefinition::new("a", 50).with_stickiness("tenant"),
                VariantDefinition::new("b", 50).with_stickiness("tenant"),
            ],
        );
        let tenant = |user: &str| {
            Context::new()
                .with_user_id(user)
                .with_property("tenant", "acme")
        };
        // Same tenant, different users: same variant.
        let expected = select(&feature, &tenant("1")).name;
        for user in ["2", "3", "4", "5"] {
            assert_eq!(select(&feature, &tenant(user)).name, expected);
        }
    }

    #[test]
    fn half_open_ranges_in_declared_order() {
        let feature = feature(
            true,
            vec![
                VariantDefinition::new("a", 1),
                VariantDefinition::new("b", 2),
                VariantDefinition::new("c", 1),
            ],
        );
        let sharder = DeterministicSharder(HashMap::from([
            ("u0:test.variants".to_owned(), 0),
            ("u1:test.variants".to_owned(), 1),
            ("u2:test.variants".to_owned(), 2),
            ("u3:test.variants".to_owned(), 3),
        ]));
        let pick = |user: &str| {
            select_variant(&feature, &Context::new().with_user_id(user), &sharder).name
        };
        assert_eq!(pick("u0"), "a");
        assert_eq!(pick("u1"), "b");
        assert_eq!(pick("u2"), "b");
        assert_eq!(pick("u3"), "c");
    }

    #[test]
    fn random_stickiness_still_selects_real_variants() {
        let feature = feature(true, variants_without_override());
        let names: HashSet<_> = (0..200)
            .map(|_| select(&feature, &Context::new()).name)
            .collect();
        assert!(names.iter().all(|n| ["VarD", "VarE", "VarF"].contains(&n.as_str())));
        // 200 re-rolls over three buckets hit more than one variant.
        assert!(names.len() > 1);
    }

    #[test]
    fn distribution_follows_weights() {
        let feature = Feature {
            variants: vec![
                VariantDefinition::new("A", 20),
                VariantDefinition::new("B", 30),
                VariantDefinition::new("C", 50),
            ],
            ..Feature::new("dist.test", true)
        };
        let mut counts: HashMap<String, u32> = HashMap::new();
        let n = 10_000;
        for i in 0..n {
            let name = select(&feature, &Context::new().with_user_id(format!("user-{i}"))).name;
            *counts.entry(name).or_default() += 1;
        }
        for (name, weight) in [("A", 0.2), ("B", 0.3), ("C", 0.5)] {
            let share = f64::from(counts[name]) / f64::from(n);
            assert!(
                (share - weight).abs() < 0.03,
                "{name}: expected ~{weight}, got {share}"
            );
        }
    }
}
