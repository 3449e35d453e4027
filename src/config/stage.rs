//! API Gateway stage settings.
//!
//! Settings can be given at service, function and http event level. Method
//! settings merge in that order, later levels winning. Values equal to the
//! provider defaults are never emitted, so redeploys do not produce spurious
//! stage diffs.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::error::{AliasError, Result};

/// Methods an `ANY` http event expands to
pub const ANY_METHODS: [&str; 7] = ["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"];

const LOGGING_LEVELS: [&str; 3] = ["OFF", "ERROR", "INFO"];
const CACHE_CONTROL_STRATEGIES: [&str; 3] = [
    "FAIL_WITH_403",
    "SUCCEED_WITH_RESPONSE_HEADER",
    "SUCCEED_WITHOUT_RESPONSE_HEADER",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MethodSetting {
    LoggingLevel,
    MetricsEnabled,
    DataTraceEnabled,
    ThrottlingBurstLimit,
    ThrottlingRateLimit,
    CachingEnabled,
    CacheTtlInSeconds,
    CacheDataEncrypted,
    RequireAuthorizationForCacheControl,
    UnauthorizedCacheControlHeaderStrategy,
}

#[derive(Debug, Clone, Copy)]
enum Expected {
    Bool,
    Integer,
    Number,
    OneOf(&'static [&'static str]),
}

impl MethodSetting {
    pub const ALL: [MethodSetting; 10] = [
        Self::LoggingLevel,
        Self::MetricsEnabled,
        Self::DataTraceEnabled,
        Self::ThrottlingBurstLimit,
        Self::ThrottlingRateLimit,
        Self::CachingEnabled,
        Self::CacheTtlInSeconds,
        Self::CacheDataEncrypted,
        Self::RequireAuthorizationForCacheControl,
        Self::UnauthorizedCacheControlHeaderStrategy,
    ];

    /// Key used in the configuration file
    pub fn config_key(self) -> &'static str {
        match self {
            Self::LoggingLevel => "logging_level",
            Self::MetricsEnabled => "metrics_enabled",
            Self::DataTraceEnabled => "data_trace_enabled",
            Self::ThrottlingBurstLimit => "throttling_burst_limit",
            Self::ThrottlingRateLimit => "throttling_rate_limit",
            Self::CachingEnabled => "caching_enabled",
            Self::CacheTtlInSeconds => "cache_ttl_in_seconds",
            Self::CacheDataEncrypted => "cache_data_encrypted",
            Self::RequireAuthorizationForCacheControl => "require_authorization_for_cache_control",
            Self::UnauthorizedCacheControlHeaderStrategy => {
                "unauthorized_cache_control_header_strategy"
            }
        }
    }

    /// Property name inside a `MethodSettings` entry
    pub fn property(self) -> &'static str {
        match self {
            Self::LoggingLevel => "LoggingLevel",
            Self::MetricsEnabled => "MetricsEnabled",
            Self::DataTraceEnabled => "DataTraceEnabled",
            Self::ThrottlingBurstLimit => "ThrottlingBurstLimit",
            Self::ThrottlingRateLimit => "ThrottlingRateLimit",
            Self::CachingEnabled => "CachingEnabled",
            Self::CacheTtlInSeconds => "CacheTtlInSeconds",
            Self::CacheDataEncrypted => "CacheDataEncrypted",
            Self::RequireAuthorizationForCacheControl => "RequireAuthorizationForCacheControl",
            Self::UnauthorizedCacheControlHeaderStrategy => "UnauthorizedCacheControlHeaderStrategy",
        }
    }

    /// Provider default; throttling has none and is always emitted
    pub fn default_value(self) -> Option<Value> {
        match self {
            Self::LoggingLevel => Some(json!("OFF")),
            Self::MetricsEnabled => Some(json!(false)),
            Self::DataTraceEnabled => Some(json!(false)),
            Self::CachingEnabled => Some(json!(false)),
            Self::CacheTtlInSeconds => Some(json!(300)),
            Self::CacheDataEncrypted => Some(json!(false)),
            Self::RequireAuthorizationForCacheControl => Some(json!(true)),
            Self::UnauthorizedCacheControlHeaderStrategy => {
                Some(json!("SUCCEED_WITH_RESPONSE_HEADER"))
            }
            Self::ThrottlingBurstLimit | Self::ThrottlingRateLimit => None,
        }
    }

    fn expected(self) -> Expected {
        match self {
            Self::LoggingLevel => Expected::OneOf(&LOGGING_LEVELS),
            Self::UnauthorizedCacheControlHeaderStrategy => Expected::OneOf(&CACHE_CONTROL_STRATEGIES),
            Self::ThrottlingBurstLimit | Self::CacheTtlInSeconds => Expected::Integer,
            Self::ThrottlingRateLimit => Expected::Number,
            _ => Expected::Bool,
        }
    }

    fn from_config_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.config_key() == key)
    }

    fn validate(self, value: &Value) -> Result<()> {
        let valid = match self.expected() {
            Expected::Bool => value.is_boolean(),
            Expected::Integer => value.is_i64() || value.is_u64(),
            Expected::Number => value.is_number(),
            Expected::OneOf(allowed) => value.as_str().is_some_and(|s| allowed.contains(&s)),
        };
        if valid {
            return Ok(());
        }
        let expected = match self.expected() {
            Expected::Bool => "a boolean".to_string(),
            Expected::Integer => "an integer".to_string(),
            Expected::Number => "a number".to_string(),
            Expected::OneOf(allowed) => format!("one of {}", allowed.join(", ")),
        };
        Err(AliasError::invalid_stage_value(self.config_key(), &expected))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct StageSettings {
    pub cache_cluster_enabled: Option<bool>,
    /// Number or string, passed through unchanged
    pub cache_cluster_size: Option<Value>,
    pub method: BTreeMap<MethodSetting, Value>,
}

impl TryFrom<Map<String, Value>> for StageSettings {
    type Error = AliasError;

    fn try_from(map: Map<String, Value>) -> Result<Self> {
        let mut settings = StageSettings::default();
        for (key, value) in map {
            match key.as_str() {
                "cache_cluster_enabled" => {
                    settings.cache_cluster_enabled = Some(
                        value
                            .as_bool()
                            .ok_or_else(|| AliasError::invalid_stage_value(&key, "a boolean"))?,
                    );
                }
                "cache_cluster_size" => {
                    if !(value.is_number() || value.is_string()) {
                        return Err(AliasError::invalid_stage_value(&key, "a number or string"));
                    }
                    settings.cache_cluster_size = Some(value);
                }
                other => {
                    let setting = MethodSetting::from_config_key(other).ok_or_else(|| {
                        AliasError::invalid_stage_config(format!("unknown setting '{other}'"))
                    })?;
                    setting.validate(&value)?;
                    settings.method.insert(setting, value);
                }
            }
        }
        Ok(settings)
    }
}

impl StageSettings {
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::try_from(map.clone()),
            Value::Null => Ok(Self::default()),
            _ => Err(AliasError::invalid_stage_config("settings must be a mapping")),
        }
    }

    /// Settings of `over` replace those of `self`
    pub fn merged(&self, over: &StageSettings) -> StageSettings {
        let mut method = self.method.clone();
        method.extend(over.method.iter().map(|(k, v)| (*k, v.clone())));
        StageSettings {
            cache_cluster_enabled: over.cache_cluster_enabled.or(self.cache_cluster_enabled),
            cache_cluster_size: over
                .cache_cluster_size
                .clone()
                .or_else(|| self.cache_cluster_size.clone()),
            method,
        }
    }

    /// `MethodSettings` entry for one method, or `None` if every value is a
    /// provider default
    pub fn method_settings_entry(&self, http_method: &str, path: &str) -> Option<Value> {
        let mut entry = Map::new();
        for (setting, value) in &self.method {
            if setting.default_value().as_ref() == Some(value) {
                continue;
            }
            entry.insert(setting.property().to_string(), value.clone());
        }
        if entry.is_empty() {
            return None;
        }
        entry.insert("HttpMethod".to_string(), json!(http_method));
        entry.insert("ResourcePath".to_string(), json!(resource_path(path)));
        Some(Value::Object(entry))
    }
}

/// `/funcA/create` -> `/~1funcA~1create`
pub fn resource_path(path: &str) -> String {
    let normalized = format!("/{}", path.trim_start_matches('/'));
    format!("/{}", normalized.replace('/', "~1"))
}

/// `ANY` expands to every concrete method
pub fn expand_method(method: &str) -> Vec<String> {
    let method = method.to_uppercase();
    if method == "ANY" {
        ANY_METHODS.iter().map(|m| m.to_string()).collect()
    } else {
        vec![method]
    }
}
