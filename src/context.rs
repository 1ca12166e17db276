use std::{borrow::Cow, collections::HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Request-scoped evaluation context.
///
/// A context is supplied by the caller on every evaluation and is never stored by the engine.
/// It consists of a few well-known fields and an open mapping of custom properties. Empty
/// strings are treated the same as absent values everywhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub remote_address: Option<String>,
    pub environment: Option<String>,
    pub app_name: Option<String>,
    pub current_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Context {
        Context::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Context {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Context {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_remote_address(mut self, remote_address: impl Into<String>) -> Context {
        self.remote_address = Some(remote_address.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Context {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Context {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn with_current_time(mut self, current_time: DateTime<Utc>) -> Context {
        self.current_time = Some(current_time);
        self
    }

    /// Add a custom property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Context {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        non_empty(self.user_id.as_deref())
    }

    pub fn session_id(&self) -> Option<&str> {
        non_empty(self.session_id.as_deref())
    }

    pub fn remote_address(&self) -> Option<&str> {
        non_empty(self.remote_address.as_deref())
    }

    /// Look up a context value by its field name.
    ///
    /// `userId`, `sessionId`, `remoteAddress`, `environment`, `appName` and `currentTime` resolve
    /// to the fixed fields. Any other name is looked up in [`Context::properties`].
    pub fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        let value = match name {
            "userId" => self.user_id(),
            "sessionId" => self.session_id(),
            "remoteAddress" => self.remote_address(),
            "environment" => non_empty(self.environment.as_deref()),
            "appName" => non_empty(self.app_name.as_deref()),
            "currentTime" => {
                return self
                    .current_time
                    .map(|t| Cow::Owned(t.to_rfc3339_opts(SecondsFormat::Millis, true)))
            }
            _ => non_empty(self.properties.get(name).map(String::as_str)),
        };
        value.map(Cow::Borrowed)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::Context;

    #[test]
    fn resolves_fixed_fields() {
        let context = Context::new()
            .with_user_id("1")
            .with_session_id("ABCDE")
            .with_remote_address("127.0.0.1")
            .with_environment("production")
            .with_app_name("checkout");

        assert_eq!(context.field("userId").as_deref(), Some("1"));
        assert_eq!(context.field("sessionId").as_deref(), Some("ABCDE"));
        assert_eq!(context.field("remoteAddress").as_deref(), Some("127.0.0.1"));
        assert_eq!(context.field("environment").as_deref(), Some("production"));
        assert_eq!(context.field("appName").as_deref(), Some("checkout"));
    }

    #[test]
    fn falls_back_to_properties() {
        let context = Context::new().with_property("env", "dev");
        assert_eq!(context.field("env").as_deref(), Some("dev"));
        assert_eq!(context.field("region"), None);
    }

    #[test]
    fn empty_values_are_absent() {
        let context = Context::new().with_user_id("").with_property("env", "");
        assert_eq!(context.user_id(), None);
        assert_eq!(context.field("userId"), None);
        assert_eq!(context.field("env"), None);
    }

    #[test]
    fn formats_current_time() {
        let context =
            Context::new().with_current_time(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(
            context.field("currentTime").as_deref(),
            Some("2024-01-02T03:04:05.000Z")
        );
    }

    #[test]
    fn deserializes_from_camel_case() {
        let context: Context = serde_json::from_str(
            r#"{"userId": "42", "remoteAddress": "10.0.0.1", "properties": {"tier": "gold"}}"#,
        )
        .unwrap();
        assert_eq!(context.user_id(), Some("42"));
        assert_eq!(context.remote_address(), Some("10.0.0.1"));
        assert_eq!(context.field("tier").as_deref(), Some("gold"));
    }
}
