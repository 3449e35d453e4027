//! Naming conventions shared with already deployed stacks.
//!
//! These names are part of the deployed state: renaming any of them orphans the
//! resources of existing aliases.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

use crate::error::{AliasError, Result};

/// Longest stack name the provider accepts
pub const MAX_STACK_NAME_LENGTH: usize = 128;

pub const ALIAS_REFERENCE_OUTPUT: &str = "ServerlessAliasReference";
pub const ALIAS_NAME_OUTPUT: &str = "ServerlessAliasName";
pub const MASTER_ALIAS_OUTPUT: &str = "MasterAliasName";
pub const ALIAS_FLAGS_OUTPUT: &str = "AliasFlags";
pub const ALIAS_RESOURCES_OUTPUT: &str = "AliasResources";
pub const ALIAS_OUTPUTS_OUTPUT: &str = "AliasOutputs";
pub const ALIAS_LOG_GROUP: &str = "ServerlessAliasLogGroup";

pub const EXECUTION_ROLE: &str = "IamRoleLambdaExecution";
pub const LEGACY_EXECUTION_POLICY: &str = "IamPolicyLambdaExecution";

pub const REST_API: &str = "ApiGatewayRestApi";
pub const REST_API_ROOT_RESOURCE: &str = "ApiGatewayRestApiRootResource";
pub const API_STAGE: &str = "ApiGatewayStage";
pub const SERVICE_ENDPOINT_OUTPUT: &str = "ServiceEndpoint";

pub const ALIAS_ENV_VAR: &str = "SERVERLESS_ALIAS";
pub const STAGE_ENV_VAR: &str = "SERVERLESS_STAGE";

static ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("Valid regex pattern"));

static STACK_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]*$").expect("Valid regex pattern"));

static STAGE_NAME_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("Valid regex pattern"));

/// Map an alias onto the alphanumeric logical id alphabet.
///
/// `-`, `+` and `_` become `Dash`, `Plus` and `Uscore`; any other
/// non-alphanumeric character is rejected.
pub fn normalize_alias_for_logical_id(alias: &str) -> Result<Cow<'_, str>> {
    if alias.is_empty() || ALPHANUMERIC.is_match(alias) {
        return Ok(Cow::Borrowed(alias));
    }

    let mut normalized = String::with_capacity(alias.len() * 2);
    for c in alias.chars() {
        match c {
            '-' => normalized.push_str("Dash"),
            '+' => normalized.push_str("Plus"),
            '_' => normalized.push_str("Uscore"),
            c if c.is_ascii_alphanumeric() => normalized.push(c),
            other => return Err(AliasError::invalid_alias_character(alias, other)),
        }
    }
    Ok(Cow::Owned(normalized))
}

/// `<stageStack>-<alias>`
pub fn alias_stack_name(stack_name: &str, alias: &str) -> String {
    format!("{stack_name}-{alias}")
}

/// Reject alias stack names the provider would refuse
pub fn validate_stack_name(name: &str) -> Result<()> {
    if !STACK_NAME.is_match(name) || name.len() > MAX_STACK_NAME_LENGTH {
        return Err(AliasError::invalid_stack_name(name));
    }
    Ok(())
}

/// Export anchoring all alias stacks of a stage
pub fn alias_reference_export(stack_name: &str) -> String {
    format!("{stack_name}-{ALIAS_REFERENCE_OUTPUT}")
}

pub fn function_arn_output(function: &str) -> String {
    format!("{function}LambdaFunctionArn")
}

pub fn function_arn_export(stack_name: &str, function: &str) -> String {
    format!("{stack_name}-{function}-LambdaFunctionArn")
}

pub fn function_alias_id(function: &str) -> String {
    format!("{function}Alias")
}

pub fn execution_role_id(alias: &str) -> Result<String> {
    Ok(format!(
        "{EXECUTION_ROLE}{}",
        normalize_alias_for_logical_id(alias)?
    ))
}

/// Export of a stage output consumed by an alias stack
pub fn stage_export(stack_name: &str, output: &str) -> String {
    format!("{stack_name}-{output}")
}

/// API Gateway stage names only allow `[A-Za-z0-9_]`
pub fn sanitize_stage_name(alias: &str) -> String {
    STAGE_NAME_INVALID.replace_all(alias, "_").into_owned()
}

pub fn alias_template_file(create: bool) -> String {
    let kind = if create { "create" } else { "update" };
    format!("cloudformation-template-{kind}-alias-stack.json")
}
