//! Evaluation metrics.
//!
//! The evaluator reports every evaluation to a [`MetricsSink`]. Sinks must return immediately:
//! [`aggregator::channel()`] provides one that hands events to a background aggregation task.
use serde::{Deserialize, Serialize};

use crate::Str;

pub mod aggregator;

/// A single evaluation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    pub feature_name: Str,
    pub enabled: bool,
    /// Selected variant name. Only set for variant evaluations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Str>,
}

/// Receiver of evaluation outcomes.
///
/// Recording is best-effort: implementations must not block and have no way to report errors
/// back into evaluation.
pub trait MetricsSink {
    fn record_evaluation(&self, event: EvaluationEvent);
}

/// A sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_evaluation(&self, _event: EvaluationEvent) {}
}

impl<T: Fn(EvaluationEvent)> MetricsSink for T {
    fn record_evaluation(&self, event: EvaluationEvent) {
        self(event);
    }
}
