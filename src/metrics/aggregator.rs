//! Background aggregation of evaluation events into periodic count buckets.
use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::{interval_at, Instant, MissedTickBehavior},
};

use super::{EvaluationEvent, MetricsSink};
use crate::Str;

/// Configuration for [`MetricsAggregator`].
#[derive(Debug, Clone)]
pub struct MetricsAggregatorConfig {
    /// How often accumulated counts are handed to the bucket handler.
    ///
    /// Defaults to [`MetricsAggregatorConfig::DEFAULT_FLUSH_INTERVAL`].
    pub flush_interval: Duration,
    /// Events buffered between the sinks and the aggregator. Events recorded while the buffer is
    /// full are dropped.
    ///
    /// Defaults to [`MetricsAggregatorConfig::DEFAULT_QUEUE_CAPACITY`].
    pub queue_capacity: usize,
}

impl MetricsAggregatorConfig {
    /// Default value for [`MetricsAggregatorConfig::flush_interval`].
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
    /// Default value for [`MetricsAggregatorConfig::queue_capacity`].
    pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

    pub fn new() -> MetricsAggregatorConfig {
        MetricsAggregatorConfig::default()
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> MetricsAggregatorConfig {
        self.flush_interval = flush_interval;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> MetricsAggregatorConfig {
        self.queue_capacity = queue_capacity;
        self
    }
}

impl Default for MetricsAggregatorConfig {
    fn default() -> MetricsAggregatorConfig {
        MetricsAggregatorConfig {
            flush_interval: MetricsAggregatorConfig::DEFAULT_FLUSH_INTERVAL,
            queue_capacity: MetricsAggregatorConfig::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Per-feature counts within one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleCount {
    pub yes: u64,
    pub no: u64,
    /// Selection count per variant name.
    #[serde(default)]
    pub variants: HashMap<Str, u64>,
}

/// Evaluation counts collected over `[start, stop]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsBucket {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub toggles: HashMap<Str, ToggleCount>,
}

impl MetricsBucket {
    fn new(start: DateTime<Utc>) -> MetricsBucket {
        MetricsBucket {
            start,
            stop: start,
            toggles: HashMap::new(),
        }
    }

    fn record(&mut self, event: EvaluationEvent) {
        let count = self.toggles.entry(event.feature_name).or_default();
        if event.enabled {
            count.yes += 1;
        } else {
            count.no += 1;
        }
        if let Some(variant) = event.variant {
            *count.variants.entry(variant).or_default() += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.toggles.is_empty()
    }
}

/// Create a connected sink and aggregator pair.
///
/// The aggregator does nothing until it is driven with [`MetricsAggregator::run`] or
/// [`MetricsAggregator::spawn`], and events beyond `queue_capacity` are dropped meanwhile. It
/// finishes once every clone of the sink has been dropped.
pub fn channel(config: MetricsAggregatorConfig) -> (ChannelMetricsSink, MetricsAggregator) {
    // tokio panics on a zero-capacity channel.
    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    (
        ChannelMetricsSink { sender },
        MetricsAggregator { receiver, config },
    )
}

/// A [`MetricsSink`] that forwards events to a [`MetricsAggregator`].
///
/// Sending never blocks. Events are dropped when the queue is full or the aggregator has
/// stopped.
#[derive(Debug, Clone)]
pub struct ChannelMetricsSink {
    sender: mpsc::Sender<EvaluationEvent>,
}

impl MetricsSink for ChannelMetricsSink {
    fn record_evaluation(&self, event: EvaluationEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::trace!(target: "toggles", feature_name = event.feature_name; "metrics queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                // Aggregator is gone. Metrics are best-effort.
            }
        }
    }
}

/// Folds evaluation events into [`MetricsBucket`]s.
#[derive(Debug)]
pub struct MetricsAggregator {
    receiver: mpsc::Receiver<EvaluationEvent>,
    config: MetricsAggregatorConfig,
}

impl MetricsAggregator {
    /// Aggregate events until every sink is dropped.
    ///
    /// Non-empty buckets are passed to `handler` every flush interval. The remainder is flushed
    /// when the channel closes.
    pub async fn run(mut self, mut handler: impl FnMut(MetricsBucket)) {
        let flush_interval = self.config.flush_interval;
        let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut bucket = MetricsBucket::new(Utc::now());
        loop {
            tokio::select! {
                event = self.receiver.recv() => match event {
                    Some(event) => bucket.record(event),
                    None => {
                        log::debug!(target: "toggles", "metrics channel closed, flushing remaining counts");
                        flush(&mut bucket, &mut handler);
                        return;
                    }
                },
                _ = ticker.tick() => flush(&mut bucket, &mut handler),
            }
        }
    }

    /// Run the aggregator on a dedicated thread with its own single-threaded runtime.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the thread failed to start.
    pub fn spawn(
        self,
        handler: impl FnMut(MetricsBucket) + Send + 'static,
    ) -> std::io::Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name("toggles-metrics".to_owned())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        log::warn!(target: "toggles", "failed to start metrics runtime: {err}");
                        return;
                    }
                };
                runtime.block_on(self.run(handler));
            })
    }
}

fn flush(bucket: &mut MetricsBucket, handler: &mut impl FnMut(MetricsBucket)) {
    if bucket.is_empty() {
        return;
    }
    let now = Utc::now();
    let mut full = std::mem::replace(bucket, MetricsBucket::new(now));
    full.stop = now;
    log::trace!(target: "toggles", features = full.toggles.len(); "flushing metrics bucket");
    handler(full);
}
