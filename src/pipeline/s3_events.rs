//! S3 bucket notifications.
//!
//! Only buckets that notify a Lambda function are alias-scoped; their names
//! become `<bucket>-<alias>` in lower case.

use serde_json::Value;
use tracing::debug;

use super::context::{function_handles, is_unaliased_function};
use super::{PipelineContext, StackPass, Workspace};
use crate::error::Result;
use crate::snapshot::DeployedSnapshots;
use crate::template::{has_permission_principal, ref_, Resource, ResourceType};

pub struct S3EventsPass;

impl S3EventsPass {
    fn relink_buckets(&self, ctx: &PipelineContext, workspace: &mut Workspace) {
        for id in workspace.stage.ids_of_type(&ResourceType::S3Bucket) {
            let Some(mut bucket) = workspace.stage.resources.remove(&id) else {
                continue;
            };
            let mut dependencies = Vec::new();
            let mut notifies_lambda = false;
            let mut unaliased = false;
            if let Some(Value::Array(configurations)) = bucket
                .properties
                .pointer_mut("/NotificationConfiguration/LambdaConfigurations")
            {
                notifies_lambda = !configurations.is_empty();
                unaliased = configurations
                    .iter()
                    .filter_map(|c| c.get("Function"))
                    .any(|f| is_unaliased_function(&workspace.alias, f));
                let functions = configurations
                    .iter_mut()
                    .filter(|_| !unaliased)
                    .filter_map(|c| c.get_mut("Function"));
                for function in functions {
                    let Some((version, alias_id)) = function_handles(&workspace.alias, function) else {
                        continue;
                    };
                    *function = ref_(&alias_id);
                    dependencies.extend(version.into_iter().chain([alias_id]));
                }
            }
            if !notifies_lambda || unaliased {
                workspace.stage.resources.insert(id, bucket);
                continue;
            }
            for dependency in dependencies {
                bucket.add_dependency(dependency);
            }
            if let Some(Value::String(name)) = bucket.properties.get_mut("BucketName") {
                *name = format!("{name}-{}", ctx.alias).to_lowercase();
            }
            debug!("Moving bucket {}", id);
            workspace.alias.resources.insert(id, bucket);
        }
    }

    fn relink_permissions(&self, ctx: &PipelineContext, workspace: &mut Workspace) {
        let permissions: Vec<String> = workspace
            .stage
            .resources
            .iter()
            .filter(|(_, r)| r.is(&ResourceType::LambdaPermission) && has_permission_principal(r, "s3"))
            .map(|(id, _)| id.clone())
            .collect();
        for id in permissions {
            let Some(mut permission) = workspace.stage.resources.remove(&id) else {
                continue;
            };
            let handles = permission
                .property("FunctionName")
                .and_then(|f| function_handles(&workspace.alias, f));
            let Some((version, alias_id)) = handles else {
                workspace.stage.resources.insert(id, permission);
                continue;
            };
            permission.properties["FunctionName"] = ref_(&alias_id);
            suffix_source_arn(&mut permission, &ctx.alias.to_lowercase());
            permission.set_dependencies(version.into_iter().chain([alias_id]));
            debug!("Moving bucket permission {}", id);
            workspace.alias.resources.insert(id, permission);
        }
    }
}

fn suffix_source_arn(permission: &mut Resource, alias: &str) {
    match permission.properties.get_mut("SourceArn") {
        Some(Value::String(arn)) => *arn = format!("{arn}-{alias}"),
        Some(Value::Object(join)) => {
            if let Some(Value::Array(parts)) = join.get_mut("Fn::Join").and_then(|j| j.get_mut(1)) {
                parts.push(Value::String(format!("-{alias}")));
            }
        }
        _ => {}
    }
}

impl StackPass for S3EventsPass {
    fn name(&self) -> &'static str {
        "s3-events"
    }

    fn apply(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        _deployed: &DeployedSnapshots,
    ) -> Result<()> {
        self.relink_buckets(ctx, workspace);
        self.relink_permissions(ctx, workspace);
        Ok(())
    }
}
