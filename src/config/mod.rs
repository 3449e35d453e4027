//! Service configuration.
//!
//! Loaded from a YAML file, then overridden from `CFN_ALIAS_*` environment
//! variables, then from command line flags.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub mod stage;

pub use stage::{expand_method, resource_path, MethodSetting, StageSettings};

use crate::error::{AliasError, ErrorCode, Result};
use crate::naming;

fn default_service_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service: String,
    pub stage: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub stack_name: Option<String>,
    #[serde(default = "default_service_path")]
    pub service_path: PathBuf,
    /// Keep function versions when an alias moves on
    #[serde(default)]
    pub retain_versions: bool,
    /// Externally managed execution role
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub stack_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub stack_policy: Vec<Value>,
    #[serde(default)]
    pub alias_stage: Option<StageSettings>,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionConfig>,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionConfig {
    #[serde(default)]
    pub alias_stage: Option<StageSettings>,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventConfig {
    #[serde(default)]
    pub http: Option<HttpEvent>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpEvent {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing)]
    pub alias_stage: Option<StageSettings>,
}

impl ServiceConfig {
    pub fn new(service: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            stage: stage.into(),
            alias: None,
            region: None,
            stack_name: None,
            service_path: default_service_path(),
            retain_versions: false,
            role: None,
            stack_tags: BTreeMap::new(),
            stack_policy: Vec::new(),
            alias_stage: None,
            functions: BTreeMap::new(),
            poll_interval: default_poll_interval(),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            AliasError::config_with_code(
                ErrorCode::CONFIG_INVALID_YAML,
                format!("Invalid service configuration: {e}"),
            )
            .with_source(e)
        })
    }

    /// Read the configuration file and apply environment overrides
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AliasError::config_with_code(
                ErrorCode::CONFIG_NOT_FOUND,
                format!("Cannot read {}", path.display()),
            )
            .with_source(e)
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        config.merge_env_vars();
        debug!("Loaded configuration for service {} from {}", config.service, path.display());
        Ok(config)
    }

    pub fn merge_env_vars(&mut self) {
        self.merge_env_with(|key| std::env::var(key).ok());
    }

    /// Apply the `CFN_ALIAS_*` overrides `lookup` resolves
    pub fn merge_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(stage) = lookup("CFN_ALIAS_STAGE") {
            self.stage = stage;
        }

        if let Some(alias) = lookup("CFN_ALIAS_ALIAS") {
            self.alias = Some(alias);
        }

        if let Some(region) = lookup("CFN_ALIAS_REGION") {
            self.region = Some(region);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.is_empty() {
            return Err(AliasError::config_with_code(
                ErrorCode::CONFIG_MISSING_REQUIRED,
                "service must not be empty",
            ));
        }
        if self.stage.is_empty() {
            return Err(AliasError::config_with_code(
                ErrorCode::CONFIG_MISSING_REQUIRED,
                "stage must not be empty",
            ));
        }
        naming::normalize_alias_for_logical_id(self.alias())?;
        naming::validate_stack_name(&naming::alias_stack_name(&self.stack_name(), self.alias()))
    }

    /// Alias to operate on; the stage name when none is given
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.stage)
    }

    /// Stage stack name, `<service>-<stage>` unless overridden
    pub fn stack_name(&self) -> String {
        self.stack_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.service, self.stage))
    }

    pub fn alias_stack_name(&self) -> String {
        naming::alias_stack_name(&self.stack_name(), self.alias())
    }

    pub fn is_stage_alias(&self) -> bool {
        self.alias() == self.stage
    }

    pub fn alias_template_path(&self, create: bool) -> PathBuf {
        self.service_path
            .join(".serverless")
            .join(naming::alias_template_file(create))
    }

    /// `StackPolicyBody` for the stage stack; none without statements
    pub fn stack_policy_body(&self) -> Option<String> {
        if self.stack_policy.is_empty() {
            return None;
        }
        Some(serde_json::json!({ "Statement": self.stack_policy }).to_string())
    }

    /// Stage-level settings of the alias API stage
    pub fn service_stage_settings(&self) -> StageSettings {
        self.alias_stage.clone().unwrap_or_default()
    }

    /// `MethodSettings` entries for every http event, functions in name order
    pub fn method_settings(&self) -> Vec<Value> {
        let service = self.service_stage_settings();
        let mut entries = Vec::new();
        for function in self.functions.values() {
            let function_settings = match &function.alias_stage {
                Some(settings) => service.merged(settings),
                None => service.clone(),
            };
            for http in function.events.iter().filter_map(|e| e.http.as_ref()) {
                let settings = match &http.alias_stage {
                    Some(settings) => function_settings.merged(settings),
                    None => function_settings.clone(),
                };
                entries.extend(
                    expand_method(&http.method)
                        .iter()
                        .filter_map(|method| settings.method_settings_entry(method, &http.path)),
                );
            }
        }
        entries
    }
}
