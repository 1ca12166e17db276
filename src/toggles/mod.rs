//! Toggle definitions and the pure evaluation functions over them.
//!
//! Nothing in this module touches shared state: strategies and variants are evaluated against a
//! [`Feature`] borrowed from a snapshot and a caller-supplied [`Context`](crate::Context).
pub mod constraints;
mod models;
pub mod strategy;
pub mod variant;

pub use constraints::{Constraint, Operator};
pub use models::*;
pub use strategy::{StrategyEvaluator, StrategyKind};
pub use variant::{select_variant, Variant, DISABLED_VARIANT_NAME};
