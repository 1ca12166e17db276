use std::sync::Arc;

use crate::{
    metrics::{EvaluationEvent, MetricsSink, NoopMetricsSink},
    repository::ToggleRepository,
    toggles::{select_variant, Feature, StrategyEvaluator, Variant},
    Context, Snapshot, Str,
};

pub struct EvaluatorConfig {
    pub repository: Arc<ToggleRepository>,
    pub metrics: Arc<dyn MetricsSink + Send + Sync>,
    /// Host name matched by `applicationHostname`. Read from the OS when `None`.
    pub hostname: Option<String>,
}

impl EvaluatorConfig {
    /// Config with no metrics and the OS host name.
    pub fn new(repository: Arc<ToggleRepository>) -> EvaluatorConfig {
        EvaluatorConfig {
            repository,
            metrics: Arc::new(NoopMetricsSink),
            hostname: None,
        }
    }

    pub fn with_metrics(mut self, metrics: impl MetricsSink + Send + Sync + 'static) -> EvaluatorConfig {
        self.metrics = Arc::new(metrics);
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> EvaluatorConfig {
        self.hostname = Some(hostname.into());
        self
    }
}

/// Evaluator answers "is this feature on?" and "which variant?" against the snapshot currently
/// installed in the repository, and reports every answer to the metrics sink.
///
/// Evaluation is synchronous, never blocks on refresh, and never fails: unknown features resolve
/// to disabled.
pub struct Evaluator {
    repository: Arc<ToggleRepository>,
    metrics: Arc<dyn MetricsSink + Send + Sync>,
    strategies: StrategyEvaluator,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Evaluator {
        let hostname = config.hostname.or_else(local_hostname);
        log::debug!(target: "toggles", hostname = hostname.as_deref(); "creating evaluator");
        Evaluator {
            repository: config.repository,
            metrics: config.metrics,
            strategies: StrategyEvaluator::new(hostname),
        }
    }

    /// Whether `name` is enabled for `context`. Unknown features are disabled.
    pub fn is_enabled(&self, name: &str, context: &Context) -> bool {
        self.is_enabled_with_fallback(name, context, false)
    }

    /// Like [`Evaluator::is_enabled`], but returns `fallback` for features missing from the
    /// current snapshot.
    pub fn is_enabled_with_fallback(&self, name: &str, context: &Context, fallback: bool) -> bool {
        let snapshot = self.repository.current();
        let (feature_name, enabled) = match snapshot.get_key_value(name) {
            Some((key, feature)) => (key.clone(), self.is_feature_enabled(feature, context)),
            None => (Str::from(name), fallback),
        };

        self.report(feature_name, enabled, None);
        enabled
    }

    /// Variant of `name` selected for `context`.
    ///
    /// Returns [`Variant::disabled()`] for unknown features, features that are off for this
    /// context, and features without variants.
    pub fn get_variant(&self, name: &str, context: &Context) -> Variant {
        // One snapshot for both the enabled check and the selection.
        let snapshot = self.repository.current();
        let (feature_name, enabled, variant) = match snapshot.get_key_value(name) {
            Some((key, feature)) => {
                let enabled = self.is_feature_enabled(feature, context);
                let variant = if enabled {
                    select_variant(feature, context, self.strategies.sharder())
                } else {
                    Variant::disabled()
                };
                (key.clone(), enabled, variant)
            }
            None => (Str::from(name), false, Variant::disabled()),
        };

        self.report(feature_name, enabled, Some(Str::from(variant.name.as_str())));
        variant
    }

    /// Sorted names of the features in the current snapshot.
    pub fn feature_names(&self) -> Vec<Str> {
        self.repository.current().feature_names()
    }

    /// The snapshot evaluations currently run against.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.repository.current()
    }

    fn is_feature_enabled(&self, feature: &Feature, context: &Context) -> bool {
        self.strategies.is_feature_enabled(feature, context)
    }

    fn report(&self, feature_name: Str, enabled: bool, variant: Option<Str>) {
        log::trace!(target: "toggles", feature_name = feature_name, enabled = enabled, variant = variant; "evaluated feature");
        self.metrics.record_evaluation(EvaluationEvent {
            feature_name,
            enabled,
            variant,
        });
    }
}

fn local_hostname() -> Option<String> {
    match hostname::get() {
        Ok(name) => name.into_string().ok(),
        Err(err) => {
            log::warn!(target: "toggles", "failed to read host name: {err}");
            None
        }
    }
}
