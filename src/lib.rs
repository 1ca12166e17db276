//! A feature toggle evaluation engine.
//!
//! # Overview
//!
//! Toggle definitions (features, their activation strategies and variants) are produced by a
//! [`Fetcher`](fetcher::Fetcher) and installed as an immutable [`Snapshot`] in a
//! [`ToggleRepository`](repository::ToggleRepository). An [`Evaluator`] answers two questions
//! for a caller-supplied [`Context`]:
//!
//! - [`Evaluator::is_enabled`]: is the feature on for this context?
//! - [`Evaluator::get_variant`]: which variant of the feature does this context get?
//!
//! A [`PollerThread`](poller_thread::PollerThread) keeps the repository fresh in the background.
//! Evaluation never waits for it: it always runs against whatever snapshot is installed, and a
//! failed refresh keeps the previous snapshot active.
//!
//! Every evaluation is reported to a [`MetricsSink`](metrics::MetricsSink).
//! [`metrics::aggregator::channel()`] connects the evaluator to a background task that folds
//! events into periodic count buckets.
//!
//! # Error Handling
//!
//! Evaluation is total and never returns errors: unknown features, unknown strategies and
//! missing context values all resolve to "disabled". Errors (represented by the [`Error`] enum)
//! only surface on the refresh path.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with target `"toggles"`.
//! Install a `log`-compatible logger to see refresh activity and skipped definitions.
//!
//! # Examples
//!
//! A runnable example lives in `demos/simple`.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod context;
pub mod error;
pub mod evaluator;
pub mod fetcher;
pub mod metrics;
pub mod poller_thread;
pub mod repository;
pub mod sharder;
pub mod snapshot;
pub mod toggles;

mod str;

pub use context::Context;
pub use error::{Error, Result};
pub use evaluator::{Evaluator, EvaluatorConfig};
pub use snapshot::Snapshot;
pub use crate::str::Str;
pub use toggles::Variant;
