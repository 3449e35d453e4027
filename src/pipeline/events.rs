//! Stream and queue event source mappings.

use serde_json::Value;
use tracing::{debug, warn};

use super::context::push_output_list;
use super::user_resources::OUTPUTS_DESCRIPTION;
use super::{PipelineContext, StackPass, Workspace};
use crate::error::Result;
use crate::naming;
use crate::snapshot::DeployedSnapshots;
use crate::template::{
    find_all_references, function_prefix, import_value, ref_, Output, Path, Reference,
    ResourceType,
};

/// Stage output publishing the source of a mapping, `<logicalId><Attribute>`
fn source_output_name(source: &Value) -> Option<(String, bool)> {
    match Reference::from_value(source)? {
        Reference::Ref(name) => Some((name, false)),
        Reference::GetAtt {
            logical_id,
            attribute,
        } => {
            let deferred = attribute == "StreamArn";
            Some((format!("{logical_id}{attribute}"), deferred))
        }
        Reference::ImportValue(_) => None,
    }
}

pub struct StreamEventsPass;

impl StackPass for StreamEventsPass {
    fn name(&self) -> &'static str {
        "stream-events"
    }

    fn apply(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        _deployed: &DeployedSnapshots,
    ) -> Result<()> {
        let mappings = workspace.stage.ids_of_type(&ResourceType::LambdaEventSourceMapping);
        for id in mappings {
            let Some(mut mapping) = workspace.stage.resources.remove(&id) else {
                continue;
            };
            let function = mapping
                .property("FunctionName")
                .and_then(|f| find_all_references(f).into_iter().next())
                .map(|r| function_prefix(&r.target).to_string());
            let Some(function) = function else {
                warn!("No function name defined for {}", id);
                workspace.stage.resources.insert(id, mapping);
                continue;
            };

            let alias_id = naming::function_alias_id(&function);
            mapping.properties["FunctionName"] = ref_(&alias_id);
            mapping.set_dependencies([alias_id]);

            let source = mapping.property("EventSourceArn").cloned().unwrap_or_default();
            if let Some((output, deferred)) = source_output_name(&source) {
                let export = ctx.stage_export(&output);
                debug!("Publishing source of {} as {}", id, export);
                workspace.stage.outputs.insert(
                    output.clone(),
                    Output::new("Alias resource reference", source.clone())
                        .exported_as(export.clone()),
                );
                push_output_list(
                    &mut workspace.alias,
                    naming::ALIAS_OUTPUTS_OUTPUT,
                    OUTPUTS_DESCRIPTION,
                    &output,
                );
                mapping.properties["EventSourceArn"] = import_value(&export);
                if deferred {
                    ctx.deferred
                        .register(export, id.clone(), Path::root().field("EventSourceArn"));
                }
            }

            debug!("Moving event source mapping {}", id);
            workspace.alias.add_resource_if_absent(id, mapping);
        }
        Ok(())
    }
}
