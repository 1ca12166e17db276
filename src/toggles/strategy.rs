use std::net::IpAddr;

use ipnet::IpNet;
use rand::{thread_rng, Rng};

use crate::{
    sharder::{bucket, Murmur3Sharder, Sharder},
    Context,
};

use super::models::{Feature, Parameters, Strategy};

/// Stickiness value meaning "use the identifier chain".
pub const DEFAULT_STICKINESS: &str = "default";
/// Stickiness value meaning "re-roll on every evaluation".
pub const RANDOM_STICKINESS: &str = "random";

/// Closed set of strategies the engine knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Default,
    UserWithId,
    RemoteAddress,
    GradualRolloutUserId,
    GradualRolloutSessionId,
    GradualRolloutRandom,
    ApplicationHostname,
    FlexibleRollout,
    /// Anything else. Always evaluates to `false`.
    Unknown,
}

impl StrategyKind {
    pub fn from_name(name: &str) -> StrategyKind {
        match name {
            "default" => StrategyKind::Default,
            "userWithId" => StrategyKind::UserWithId,
            "remoteAddress" => StrategyKind::RemoteAddress,
            "gradualRolloutUserId" => StrategyKind::GradualRolloutUserId,
            "gradualRolloutSessionId" => StrategyKind::GradualRolloutSessionId,
            "gradualRolloutRandom" => StrategyKind::GradualRolloutRandom,
            "applicationHostname" => StrategyKind::ApplicationHostname,
            "flexibleRollout" => StrategyKind::FlexibleRollout,
            _ => StrategyKind::Unknown,
        }
    }
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        StrategyKind::from_name(&self.name)
    }
}

/// Evaluates strategies against a context.
///
/// Evaluation is total: malformed parameters, unknown strategies and missing context values
/// all resolve to `false` (or fall back through the identifier chain where rollouts allow it).
#[derive(Debug, Clone)]
pub struct StrategyEvaluator<S = Murmur3Sharder> {
    hostname: Option<String>,
    sharder: S,
}

impl StrategyEvaluator<Murmur3Sharder> {
    /// `hostname` is matched by `applicationHostname`.
    pub fn new(hostname: Option<String>) -> StrategyEvaluator {
        StrategyEvaluator::with_sharder(hostname, Murmur3Sharder)
    }
}

impl<S: Sharder> StrategyEvaluator<S> {
    pub fn with_sharder(hostname: Option<String>, sharder: S) -> StrategyEvaluator<S> {
        StrategyEvaluator { hostname, sharder }
    }

    pub fn sharder(&self) -> &S {
        &self.sharder
    }

    /// A feature is enabled iff its kill switch is on and any strategy is active. No strategies
    /// means on for everyone.
    pub fn is_feature_enabled(&self, feature: &Feature, context: &Context) -> bool {
        feature.enabled
            && (feature.strategies.is_empty()
                || feature
                    .strategies
                    .iter()
                    .any(|strategy| self.evaluate(strategy, context)))
    }

    /// Evaluate one strategy, including its constraints.
    pub fn evaluate(&self, strategy: &Strategy, context: &Context) -> bool {
        strategy.constraints.iter().all(|c| c.eval(context))
            && self.evaluate_kind(strategy, context)
    }

    fn evaluate_kind(&self, strategy: &Strategy, context: &Context) -> bool {
        let params = &strategy.parameters;
        match strategy.kind() {
            StrategyKind::Default => true,

            StrategyKind::UserWithId => context
                .user_id()
                .is_some_and(|user_id| params.list("userIds").any(|id| id == user_id)),

            StrategyKind::RemoteAddress => {
                let Some(address) = context
                    .remote_address()
                    .and_then(|a| a.trim().parse::<IpAddr>().ok())
                else {
                    return false;
                };
                params.list("IPs").any(|entry| match entry.parse::<IpNet>() {
                    Ok(net) => net.contains(&address),
                    Err(_) => entry.parse::<IpAddr>().is_ok_and(|ip| ip == address),
                })
            }

            StrategyKind::GradualRolloutUserId => {
                let stickiness = context
                    .user_id()
                    .map(str::to_owned)
                    .unwrap_or_else(|| default_stickiness(context));
                self.is_in_rollout(params.percentage("percentage"), &stickiness, params)
            }

            StrategyKind::GradualRolloutSessionId => {
                let stickiness = context
                    .session_id()
                    .map(str::to_owned)
                    .unwrap_or_else(|| default_stickiness(context));
                self.is_in_rollout(params.percentage("percentage"), &stickiness, params)
            }

            StrategyKind::GradualRolloutRandom => {
                self.is_in_rollout(params.percentage("percentage"), &random_stickiness(), params)
            }

            StrategyKind::ApplicationHostname => self.hostname.as_deref().is_some_and(|host| {
                params
                    .list("hostNames")
                    .any(|name| name.eq_ignore_ascii_case(host))
            }),

            StrategyKind::FlexibleRollout => {
                let stickiness = match params.get("stickiness").unwrap_or(DEFAULT_STICKINESS) {
                    "" | DEFAULT_STICKINESS => default_stickiness(context),
                    RANDOM_STICKINESS => random_stickiness(),
                    // Explicit stickiness field must be present, otherwise fail closed.
                    field => match context.field(field) {
                        Some(value) => value.into_owned(),
                        None => return false,
                    },
                };
                self.is_in_rollout(params.percentage("rollout"), &stickiness, params)
            }

            StrategyKind::Unknown => {
                log::trace!(target: "toggles", strategy = strategy.name.as_str(); "unknown strategy evaluates to false");
                false
            }
        }
    }

    fn is_in_rollout(
        &self,
        percentage: Option<f64>,
        stickiness: &str,
        params: &Parameters,
    ) -> bool {
        let Some(percentage) = percentage else {
            return false;
        };
        let group_id = params.get("groupId").unwrap_or_default();
        f64::from(bucket(&self.sharder, stickiness, group_id)) < percentage
    }
}

/// Resolve the identifier chain: user id, then session id, then a random value.
pub(crate) fn default_stickiness(context: &Context) -> String {
    context
        .user_id()
        .or_else(|| context.session_id())
        .map(str::to_owned)
        .unwrap_or_else(random_stickiness)
}

pub(crate) fn random_stickiness() -> String {
    thread_rng().gen_range(1..=10_000u32).to_string()
}
