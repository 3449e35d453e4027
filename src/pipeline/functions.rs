//! Moves function versions into the alias stack and gives every function an
//! alias resource pointing at its new version.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::{PipelineContext, StackPass, Workspace};
use crate::error::{AliasError, ErrorCode, Result};
use crate::naming;
use crate::snapshot::DeployedSnapshots;
use crate::template::{
    find_references, function_logical_id, function_prefix, get_att, import_value,
    referenced_function, Output, Path, Resource, ResourceType, Template, REMOVED_SENTINEL,
};

const ALIAS_REFERENCE_DESCRIPTION: &str = "Alias stack reference.";
const FUNCTION_ARN_DESCRIPTION: &str = "Function Arn";

/// Overwrite references to `removed` inside every function definition with
/// the removal sentinel. Returns the number of rewritten references.
pub fn neutralize_removed(template: &mut Template, removed: &[String]) -> Result<usize> {
    if removed.is_empty() {
        return Ok(0);
    }
    let mut rewritten = 0;
    for (id, function) in template.resources.iter_mut() {
        if !function.is(&ResourceType::LambdaFunction) {
            continue;
        }
        for path in find_references(&function.properties, removed) {
            debug!("Neutralizing {}.{}", id, path);
            path.set(&mut function.properties, Value::String(REMOVED_SENTINEL.to_string()))?;
            rewritten += 1;
        }
    }
    Ok(rewritten)
}

/// A function alias of some deployed alias stack and the stage-owned version
/// it may still pin
struct AliasedFunction {
    function: String,
    legacy_version: Option<String>,
}

fn aliased_functions(stack_name: &str, template: &Template) -> Vec<AliasedFunction> {
    let export_prefix = format!("{stack_name}-");
    template
        .resources_of_type(&ResourceType::LambdaAlias)
        .into_iter()
        .filter_map(|(name, alias)| {
            let prefix = name.strip_suffix("Alias")?;
            let legacy_version = alias
                .property("FunctionVersion.Fn::ImportValue")
                .and_then(Value::as_str)
                .map(|export| export.strip_prefix(&export_prefix).unwrap_or(export).to_string());
            Some(AliasedFunction {
                function: function_logical_id(prefix),
                legacy_version,
            })
        })
        .collect()
}

pub struct FunctionsPass;

impl FunctionsPass {
    fn relocate_version(
        &self,
        ctx: &PipelineContext,
        workspace: &mut Workspace,
        version_id: String,
        mut version: Resource,
    ) -> Result<()> {
        let function_id = version
            .property("FunctionName")
            .and_then(referenced_function)
            .map(str::to_string)
            .ok_or_else(|| {
                AliasError::template_with_code(
                    ErrorCode::TEMPLATE_MISSING_RESOURCE,
                    format!("Version {version_id} does not reference a function of this stack"),
                    Some(version_id.clone()),
                )
            })?;
        let function = function_prefix(&function_id).to_string();
        let arn_export = naming::function_arn_export(&ctx.stack_name, &function);
        debug!("Aliasing {} with version {}", function, version_id);

        workspace
            .stage
            .outputs
            .remove(&format!("{function}LambdaFunctionQualifiedArn"));
        workspace.stage.outputs.insert(
            naming::function_arn_output(&function),
            Output::new(FUNCTION_ARN_DESCRIPTION, get_att(&function_id, "Arn"))
                .exported_as(arn_export.clone()),
        );

        version.properties["FunctionName"] = import_value(&arn_export);
        version.deletion_policy = Some(if ctx.retain_versions { "Retain" } else { "Delete" }.to_string());

        let description = workspace
            .stage
            .resource(&function_id)
            .and_then(|f| f.property("Description"))
            .cloned();
        let mut properties = json!({
            "FunctionName": import_value(&arn_export),
            "FunctionVersion": get_att(&version_id, "Version"),
            "Name": ctx.alias,
        });
        if let Some(description) = description {
            properties["Description"] = description;
        }
        let alias = Resource::new(ResourceType::LambdaAlias, properties).with_depends_on([version_id.clone()]);

        workspace
            .alias
            .resources
            .insert(naming::function_alias_id(&function), alias);
        workspace.alias.resources.insert(version_id, version);
        Ok(())
    }

    /// Keep the functions and pinned versions every deployed alias still uses
    fn merge_aliases(&self, ctx: &PipelineContext, workspace: &mut Workspace, deployed: &DeployedSnapshots) {
        for aliased in deployed
            .all_alias_templates()
            .flat_map(|template| aliased_functions(&ctx.stack_name, template))
        {
            let mut ids = vec![aliased.function.clone()];
            ids.extend(aliased.legacy_version.clone());
            for id in &ids {
                if let Some(resource) = deployed.stage.resources.get(id) {
                    if workspace.stage.add_resource_if_absent(id.clone(), resource.clone()) {
                        debug!("Retaining {} for deployed aliases", id);
                    }
                }
            }

            let mut outputs = vec![format!("{}Arn", aliased.function)];
            outputs.extend(aliased.legacy_version);
            for id in outputs {
                if let Some(output) = deployed.stage.outputs.get(&id) {
                    workspace.stage.add_output_if_absent(id, output.clone());
                }
            }
        }
    }
}

impl StackPass for FunctionsPass {
    fn name(&self) -> &'static str {
        "functions"
    }

    fn apply(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        deployed: &DeployedSnapshots,
    ) -> Result<()> {
        debug!("Processing functions");

        workspace.alias.outputs.insert(
            naming::ALIAS_REFERENCE_OUTPUT.to_string(),
            Output::new(
                ALIAS_REFERENCE_DESCRIPTION,
                import_value(&naming::alias_reference_export(&ctx.stack_name)),
            ),
        );

        let variable = Path::root()
            .field("Environment")
            .field("Variables")
            .field(naming::ALIAS_ENV_VAR);
        for function in workspace.stage.resources.values_mut() {
            if function.is(&ResourceType::LambdaFunction) {
                variable.set_or_create(&mut function.properties, Value::String(ctx.alias.clone()))?;
            }
        }

        let versions = workspace.stage.take_resources_of_type(&ResourceType::LambdaVersion);
        if !versions.is_empty() {
            info!("Aliasing {} functions as {}", versions.len(), ctx.alias);
        }
        for (version_id, version) in versions {
            self.relocate_version(ctx, workspace, version_id, version)?;
        }

        self.merge_aliases(ctx, workspace, deployed);
        neutralize_removed(&mut workspace.stage, &ctx.removed_resources)?;
        Ok(())
    }
}
