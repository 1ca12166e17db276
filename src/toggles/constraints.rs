use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::Context;

/// A precondition attached to a strategy. All constraints of a strategy must hold before the
/// strategy itself is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub context_name: String,
    pub operator: Operator,
    /// Used by the list operators (`IN`, `NOT_IN`, `STR_*`).
    #[serde(default)]
    pub values: Vec<String>,
    /// Used by the single-value operators (`NUM_*`, `DATE_*`, `SEMVER_*`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub inverted: bool,
    /// Only affects the `STR_*` operators.
    #[serde(default)]
    pub case_insensitive: bool,
}

impl Constraint {
    pub fn new(
        context_name: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Constraint {
        Constraint {
            context_name: context_name.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
            value: None,
            inverted: false,
            case_insensitive: false,
        }
    }

    /// Constraint for a single-value operator.
    pub fn single(
        context_name: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Constraint {
        Constraint {
            value: Some(value.into()),
            ..Constraint::new(context_name, operator, Vec::<String>::new())
        }
    }

    pub fn inverted(mut self) -> Constraint {
        self.inverted = true;
        self
    }

    pub fn case_insensitive(mut self) -> Constraint {
        self.case_insensitive = true;
        self
    }

    pub fn eval(&self, context: &Context) -> bool {
        if self.operator == Operator::Unknown {
            return false;
        }
        let outcome = self.operator.eval(self, context);
        outcome != self.inverted
    }

    /// The single comparison value. Falls back to the first list value, which older definitions
    /// use for the single-value operators.
    fn single_value(&self) -> Option<&str> {
        self.value
            .as_deref()
            .or_else(|| self.values.first().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    In,
    NotIn,
    StrContains,
    StrStartsWith,
    StrEndsWith,
    NumEq,
    NumGt,
    NumGte,
    NumLt,
    NumLte,
    DateAfter,
    DateBefore,
    SemverEq,
    SemverGt,
    SemverLt,
    /// An operator this engine does not know. Always fails.
    #[serde(other)]
    Unknown,
}

impl Operator {
    /// Applying `Operator` to the context. Returns `false` if the operator cannot be applied or
    /// there's a misconfiguration.
    fn eval(&self, constraint: &Constraint, context: &Context) -> bool {
        self.try_eval(constraint, context).unwrap_or(false)
    }

    /// Try applying `Operator`, returning `None` if the operator cannot be applied.
    fn try_eval(&self, constraint: &Constraint, context: &Context) -> Option<bool> {
        let name = constraint.context_name.as_str();
        match self {
            Self::In | Self::NotIn => {
                let is_in = context
                    .field(name)
                    .is_some_and(|v| constraint.values.iter().any(|c| *c == *v));
                Some(if *self == Self::In { is_in } else { !is_in })
            }

            Self::StrContains | Self::StrStartsWith | Self::StrEndsWith => {
                let value = context.field(name)?;
                let fold = |s: &str| {
                    if constraint.case_insensitive {
                        s.to_lowercase()
                    } else {
                        s.to_owned()
                    }
                };
                let value = fold(value.as_ref());
                Some(constraint.values.iter().map(|c| fold(c.as_str())).any(|c| match self {
                    Self::StrContains => value.contains(&c),
                    Self::StrStartsWith => value.starts_with(&c),
                    _ => value.ends_with(&c),
                }))
            }

            Self::NumEq | Self::NumGt | Self::NumGte | Self::NumLt | Self::NumLte => {
                let value: f64 = context.field(name)?.trim().parse().ok()?;
                let target: f64 = constraint.single_value()?.trim().parse().ok()?;
                Some(match self {
                    Self::NumEq => value == target,
                    Self::NumGt => value > target,
                    Self::NumGte => value >= target,
                    Self::NumLt => value < target,
                    _ => value <= target,
                })
            }

            Self::DateAfter | Self::DateBefore => {
                let value = if name == "currentTime" {
                    context.current_time.unwrap_or_else(Utc::now)
                } else {
                    parse_date(&context.field(name)?)?
                };
                let target = parse_date(constraint.single_value()?)?;
                Some(if *self == Self::DateAfter {
                    value > target
                } else {
                    value < target
                })
            }

            Self::SemverEq | Self::SemverGt | Self::SemverLt => {
                let value = Version::parse(context.field(name)?.trim()).ok()?;
                let target = Version::parse(constraint.single_value()?.trim()).ok()?;
                Some(match self {
                    Self::SemverEq => value == target,
                    Self::SemverGt => value > target,
                    _ => value < target,
                })
            }

            Self::Unknown => None,
        }
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Constraint, Operator};
    use crate::Context;

    fn ctx(key: &str, value: &str) -> Context {
        Context::new().with_property(key, value)
    }

    #[test]
    fn in_and_not_in() {
        let c = Constraint::new("env", Operator::In, ["dev", "test"]);
        assert!(c.eval(&ctx("env", "dev")));
        assert!(!c.eval(&ctx("env", "prod")));
        assert!(!c.eval(&Context::new()));

        let c = Constraint::new("env", Operator::NotIn, ["dev", "test"]);
        assert!(!c.eval(&ctx("env", "dev")));
        assert!(c.eval(&ctx("env", "prod")));
        // NOT_IN holds when the value is missing
        assert!(c.eval(&Context::new()));
    }

    #[test]
    fn in_uses_fixed_fields() {
        let c = Constraint::new("userId", Operator::In, ["7"]);
        assert!(c.eval(&Context::new().with_user_id("7")));
        assert!(!c.eval(&Context::new().with_user_id("8")));
    }

    #[test]
    fn string_operators() {
        let c = Constraint::new("email", Operator::StrEndsWith, ["@example.com"]);
        assert!(c.eval(&ctx("email", "alice@example.com")));
        assert!(!c.eval(&ctx("email", "alice@EXAMPLE.com")));
        assert!(c.clone().case_insensitive().eval(&ctx("email", "alice@EXAMPLE.com")));

        let c = Constraint::new("email", Operator::StrStartsWith, ["bob", "alice"]);
        assert!(c.eval(&ctx("email", "alice@example.com")));

        let c = Constraint::new("email", Operator::StrContains, ["@exa"]);
        assert!(c.eval(&ctx("email", "alice@example.com")));
        assert!(!c.eval(&Context::new()));
    }

    #[test]
    fn numeric_operators() {
        let c = Constraint::single("age", Operator::NumGte, "18");
        assert!(c.eval(&ctx("age", "18")));
        assert!(!c.eval(&ctx("age", "17.5")));
        assert!(!c.eval(&ctx("age", "unknown")));

        assert!(Constraint::single("age", Operator::NumGt, "18").eval(&ctx("age", "19")));
        assert!(!Constraint::single("age", Operator::NumGt, "18").eval(&ctx("age", "18")));
        assert!(Constraint::single("age", Operator::NumLt, "18").eval(&ctx("age", "17")));
        assert!(Constraint::single("age", Operator::NumLte, "18").eval(&ctx("age", "18")));
        assert!(Constraint::single("age", Operator::NumEq, "18").eval(&ctx("age", "18.0")));
    }

    #[test]
    fn numeric_operator_falls_back_to_values_list() {
        let c = Constraint::new("age", Operator::NumGt, ["18"]);
        assert!(c.eval(&ctx("age", "30")));
    }

    #[test]
    fn date_operators_use_current_time() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let context = Context::new().with_current_time(now);

        assert!(
            Constraint::single("currentTime", Operator::DateAfter, "2024-01-01T00:00:00Z")
                .eval(&context)
        );
        assert!(
            !Constraint::single("currentTime", Operator::DateBefore, "2024-01-01T00:00:00Z")
                .eval(&context)
        );
        assert!(
            Constraint::single("currentTime", Operator::DateBefore, "2024-06-01T14:00:00+01:00")
                .eval(&context)
        );
    }

    #[test]
    fn date_operator_defaults_to_now() {
        let c = Constraint::single("currentTime", Operator::DateAfter, "2000-01-01T00:00:00Z");
        assert!(c.eval(&Context::new()));
    }

    #[test]
    fn semver_operators() {
        let c = Constraint::single("version", Operator::SemverGt, "1.5.0");
        assert!(c.eval(&ctx("version", "1.13.0")));
        assert!(!c.eval(&ctx("version", "1.2.0")));
        assert!(!c.eval(&ctx("version", "not-a-version")));

        assert!(Constraint::single("version", Operator::SemverLt, "1.10.0")
            .eval(&ctx("version", "1.2.0")));
        assert!(Constraint::single("version", Operator::SemverEq, "2.0.0")
            .eval(&ctx("version", "2.0.0")));
    }

    #[test]
    fn inverted_negates_outcome() {
        let c = Constraint::new("env", Operator::In, ["dev"]).inverted();
        assert!(!c.eval(&ctx("env", "dev")));
        assert!(c.eval(&ctx("env", "prod")));
    }

    #[test]
    fn unknown_operator_fails_closed() {
        let c: Constraint = serde_json::from_str(
            r#"{"contextName": "env", "operator": "REGEX_MAGIC", "values": ["dev"], "inverted": true}"#,
        )
        .unwrap();
        assert_eq!(c.operator, Operator::Unknown);
        assert!(!c.eval(&ctx("env", "dev")));
        assert!(!c.eval(&ctx("env", "prod")));
    }
}
