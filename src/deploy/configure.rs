//! Stage and alias skeletons set up before the restructuring passes run.

use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::naming;
use crate::template::{ref_, Output, Resource, ResourceType, Template};

/// Value of the stage anchor output; only its export matters
pub const ALIAS_REFERENCE_VALUE: &str = "REFERENCE";

const FORMAT_VERSION: &str = "2010-09-09";
const LOG_RETENTION_DAYS: u64 = 7;

/// Publish the anchor export alias stacks import and record the master alias
pub fn configure_stage(stage: &mut Template, stack_name: &str, master_alias: &str) {
    stage.outputs.insert(
        naming::ALIAS_REFERENCE_OUTPUT.to_string(),
        Output::new("Alias stack reference", json!(ALIAS_REFERENCE_VALUE))
            .exported_as(naming::alias_reference_export(stack_name)),
    );
    stage.outputs.insert(
        naming::MASTER_ALIAS_OUTPUT.to_string(),
        Output::new("Master alias name (serverless-aws-alias)", json!(master_alias)),
    );
}

/// Empty alias template for `alias` of the stage stack `stack_name`
pub fn alias_skeleton(stack_name: &str, alias: &str) -> Result<Template> {
    let alias_stack = naming::alias_stack_name(stack_name, alias);
    naming::validate_stack_name(&alias_stack)?;
    debug!("Creating alias template skeleton for {}", alias_stack);

    let mut template = Template {
        format_version: Some(FORMAT_VERSION.to_string()),
        description: Some(format!("Alias stack for {stack_name} ({alias})")),
        ..Default::default()
    };
    template.resources.insert(
        naming::ALIAS_LOG_GROUP.to_string(),
        Resource::new(
            ResourceType::LogGroup,
            json!({
                "LogGroupName": format!("/serverless/{stack_name}-{alias}"),
                "RetentionInDays": LOG_RETENTION_DAYS
            }),
        ),
    );
    template.outputs.insert(
        naming::ALIAS_NAME_OUTPUT.to_string(),
        Output::new("Alias the stack represents.", json!(alias)),
    );
    template.outputs.insert(
        naming::ALIAS_LOG_GROUP.to_string(),
        Output::new("Log group for alias.", ref_(naming::ALIAS_LOG_GROUP))
            .exported_as(format!("{alias_stack}-LogGroup")),
    );
    Ok(template)
}
