//! State threaded through the restructuring passes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::deferred::DeferredOutputs;
use crate::config::{ServiceConfig, StageSettings};
use crate::error::Result;
use crate::naming;
use crate::template::{
    alias_name, function_prefix, function_version_name, referenced_function, Output, Template,
};

/// Facts an alias publishes for its siblings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AliasFlags {
    pub has_role: bool,
}

impl AliasFlags {
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Flags published by a deployed alias template.
    ///
    /// Aliases deployed before flags existed, or with a flags output that does
    /// not parse, get the defaults.
    pub fn of_template(template: &Template) -> Self {
        let Some(output) = template.outputs.get(naming::ALIAS_FLAGS_OUTPUT) else {
            return Self::default();
        };
        let parsed = match &output.value {
            Value::String(raw) => parse_flags(raw),
            other => serde_json::from_value(other.clone()),
        };
        parsed.unwrap_or_else(|e| {
            debug!("Ignoring unreadable alias flags: {}", e);
            Self::default()
        })
    }
}

/// Parse the wire form of [`AliasFlags`]; missing keys take their defaults
pub fn parse_flags(raw: &str) -> std::result::Result<AliasFlags, serde_json::Error> {
    serde_json::from_str(raw)
}

/// The two documents being built
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workspace {
    pub stage: Template,
    pub alias: Template,
}

impl Workspace {
    pub fn new(stage: Template, alias: Template) -> Self {
        Self { stage, alias }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub stack_name: String,
    pub stage: String,
    pub alias: String,
    /// Alias in logical id form
    pub normalized_alias: String,
    /// Alias allowed to reconfigure shared resources
    pub master_alias: String,
    pub retain_versions: bool,
    pub global_role: Option<String>,
    /// Resources and outputs the operator declared
    pub user_resources: Template,
    pub stage_settings: StageSettings,
    pub method_settings: Vec<Value>,
    pub flags: AliasFlags,
    /// Flags of each sibling, in sibling order
    pub sibling_flags: Vec<AliasFlags>,
    /// Deployed resources no alias needs anymore
    pub removed_resources: Vec<String>,
    pub deferred: DeferredOutputs,
}

impl PipelineContext {
    pub fn new(
        config: &ServiceConfig,
        user_resources: Template,
        master_alias: impl Into<String>,
    ) -> Result<Self> {
        let alias = config.alias().to_string();
        let normalized_alias = naming::normalize_alias_for_logical_id(&alias)?.into_owned();
        Ok(Self {
            stack_name: config.stack_name(),
            stage: config.stage.clone(),
            alias,
            normalized_alias,
            master_alias: master_alias.into(),
            retain_versions: config.retain_versions,
            global_role: config.role.clone(),
            user_resources,
            stage_settings: config.service_stage_settings(),
            method_settings: config.method_settings(),
            flags: AliasFlags::default(),
            sibling_flags: Vec::new(),
            removed_resources: Vec::new(),
            deferred: DeferredOutputs::default(),
        })
    }

    pub fn is_master_alias(&self) -> bool {
        self.alias == self.master_alias
    }

    pub fn stage_export(&self, output: &str) -> String {
        naming::stage_export(&self.stack_name, output)
    }
}

/// Parse a JSON list of logical ids stored as an output value
pub fn output_list(template: &Template, output: &str) -> std::result::Result<Vec<String>, serde_json::Error> {
    match template.outputs.get(output).map(|o| &o.value) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(raw)) => serde_json::from_str(raw),
        Some(other) => serde_json::from_value(other.clone()),
    }
}

/// Store a list of logical ids as a JSON string output
pub fn set_output_list(template: &mut Template, output: &str, description: &str, names: &[String]) {
    let wire = serde_json::to_string(names).unwrap_or_else(|_| "[]".to_string());
    template
        .outputs
        .insert(output.to_string(), Output::new(description, Value::String(wire)));
}

/// Append one logical id to a JSON list output, creating it if needed
pub fn push_output_list(template: &mut Template, output: &str, description: &str, name: &str) {
    let mut names = output_list(template, output).unwrap_or_default();
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
    set_output_list(template, output, description, &names);
}

/// Version and function alias the alias template holds for the function a
/// property references. `None` unless the function is aliased there.
pub fn function_handles(alias: &Template, reference: &Value) -> Option<(Option<String>, String)> {
    let function = function_prefix(referenced_function(reference)?);
    let alias_id = alias_name(alias, function)?;
    Some((function_version_name(alias, function), alias_id))
}

/// A stage function without an alias in the alias template. Anything
/// pointing at it has to stay in the stage template.
pub fn is_unaliased_function(alias: &Template, reference: &Value) -> bool {
    referenced_function(reference).is_some() && function_handles(alias, reference).is_none()
}
