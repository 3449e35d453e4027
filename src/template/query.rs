//! Lookups over generated resources that rely on the serverless naming scheme.

use serde_json::Value;

use super::document::{Resource, ResourceType, Template};

const FUNCTION_SUFFIX: &str = "LambdaFunction";

/// True if the permission's principal is the given service, either as a
/// literal string or as any literal fragment of an `Fn::Join`.
pub fn has_permission_principal(permission: &Resource, service: &str) -> bool {
    match permission.property("Principal") {
        Some(Value::String(principal)) => principal.starts_with(service),
        Some(Value::Object(map)) => map
            .get("Fn::Join")
            .and_then(|join| join.get(1))
            .and_then(Value::as_array)
            .is_some_and(|parts| {
                parts
                    .iter()
                    .any(|p| p.as_str().is_some_and(|s| s.starts_with(service)))
            }),
        _ => false,
    }
}

/// `Fn1LambdaFunction` -> `Fn1`
pub fn function_prefix(logical_id: &str) -> &str {
    logical_id.strip_suffix(FUNCTION_SUFFIX).unwrap_or(logical_id)
}

pub fn function_logical_id(prefix: &str) -> String {
    format!("{prefix}{FUNCTION_SUFFIX}")
}

/// Version resource belonging to a function prefix
pub fn function_version_name(template: &Template, function: &str) -> Option<String> {
    let prefix = format!("{function}LambdaVersion");
    template
        .resources
        .iter()
        .find(|(name, r)| r.is(&ResourceType::LambdaVersion) && name.starts_with(&prefix))
        .map(|(name, _)| name.clone())
}

/// Function alias resource belonging to a function prefix
pub fn alias_name(template: &Template, function: &str) -> Option<String> {
    let prefix = format!("{function}Alias");
    template
        .resources
        .iter()
        .find(|(name, r)| r.is(&ResourceType::LambdaAlias) && name.starts_with(&prefix))
        .map(|(name, _)| name.clone())
}

/// Logical id in `FunctionName`/`Endpoint`-style properties that reference a
/// function by `Ref` or `GetAtt`
pub fn referenced_function(value: &Value) -> Option<&str> {
    let target = value
        .get("Ref")
        .and_then(Value::as_str)
        .or_else(|| value.get("Fn::GetAtt")?.get(0)?.as_str())?;
    target.ends_with(FUNCTION_SUFFIX).then_some(target)
}
