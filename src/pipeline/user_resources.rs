//! Reconciles operator-declared resources with those other aliases deployed.
//!
//! Every alias publishes the ids of its custom resources and outputs. Those
//! still listed by a sibling are pulled from the live stage template into the
//! new one, and anything only the previous deployment of this alias used is
//! recorded as removed.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::context::{output_list, set_output_list};
use super::{PipelineContext, StackPass, Workspace};
use crate::error::{AliasError, Result};
use crate::naming;
use crate::snapshot::DeployedSnapshots;
use crate::template::{is_match, Output, Resource};

pub const RESOURCES_DESCRIPTION: &str = "Custom resource references";
pub const OUTPUTS_DESCRIPTION: &str = "Custom output references";

/// Custom resources and outputs siblings still rely on, with the alias owning
/// each of them
#[derive(Debug, Default)]
struct AliasDependencies {
    resources: BTreeMap<String, (Resource, String)>,
    outputs: BTreeMap<String, (Output, String)>,
}

fn collect_dependencies(deployed: &DeployedSnapshots) -> AliasDependencies {
    let mut dependencies = AliasDependencies::default();
    for sibling in &deployed.siblings {
        let owner = sibling.alias_name().unwrap_or(&sibling.stack_name).to_string();
        let lists = output_list(&sibling.template, naming::ALIAS_RESOURCES_OUTPUT).and_then(|r| {
            output_list(&sibling.template, naming::ALIAS_OUTPUTS_OUTPUT).map(|o| (r, o))
        });
        let (resource_ids, output_ids) = match lists {
            Ok(lists) => lists,
            Err(e) => {
                warn!("Ignoring unreadable resource lists of alias {}: {}", owner, e);
                continue;
            }
        };
        for id in resource_ids {
            if let Some(resource) = deployed.stage.resources.get(&id) {
                dependencies
                    .resources
                    .insert(id, (resource.clone(), owner.clone()));
            }
        }
        for id in output_ids {
            if let Some(output) = deployed.stage.outputs.get(&id) {
                dependencies.outputs.insert(id, (output.clone(), owner.clone()));
            }
        }
    }
    dependencies
}

pub struct UserResourcesPass;

impl StackPass for UserResourcesPass {
    fn name(&self) -> &'static str {
        "user-resources"
    }

    fn apply(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        deployed: &DeployedSnapshots,
    ) -> Result<()> {
        debug!("Processing custom resources");
        let dependencies = collect_dependencies(deployed);
        let user = &ctx.user_resources;

        for (name, resource) in &user.resources {
            let Some((deployed_resource, owner)) = dependencies.resources.get(name) else {
                continue;
            };
            if is_match(&deployed_resource.to_value(), &resource.to_value()) {
                continue;
            }
            if ctx.is_master_alias() && deployed_resource.kind == resource.kind {
                warn!("Reconfigure resource {}. Remember to update it in other aliases too.", name);
            } else {
                return Err(AliasError::resource_conflict(name, owner));
            }
        }

        for (name, output) in &user.outputs {
            let Some((deployed_output, owner)) = dependencies.outputs.get(name) else {
                continue;
            };
            if is_match(&deployed_output.to_value(), &output.to_value()) {
                continue;
            }
            if ctx.is_master_alias() {
                warn!("Reconfigure output {}. Remember to update it in other aliases too.", name);
            } else {
                return Err(AliasError::output_conflict(name, owner));
            }
        }

        let previous = output_list(&deployed.current, naming::ALIAS_RESOURCES_OUTPUT).unwrap_or_else(|e| {
            warn!("Ignoring unreadable resource list of the previous deployment: {}", e);
            Vec::new()
        });
        let still_used: BTreeSet<&str> = dependencies
            .resources
            .keys()
            .chain(user.resources.keys())
            .chain(workspace.stage.resources.keys())
            .map(String::as_str)
            .collect();
        ctx.removed_resources = previous
            .into_iter()
            .filter(|id| !still_used.contains(id.as_str()))
            .collect();
        if !ctx.removed_resources.is_empty() {
            info!("Removing resources: {}", ctx.removed_resources.join(", "));
        }

        let own_resources: Vec<String> = user.resources.keys().cloned().collect();
        let own_outputs: Vec<String> = user.outputs.keys().cloned().collect();
        set_output_list(
            &mut workspace.alias,
            naming::ALIAS_RESOURCES_OUTPUT,
            RESOURCES_DESCRIPTION,
            &own_resources,
        );
        set_output_list(
            &mut workspace.alias,
            naming::ALIAS_OUTPUTS_OUTPUT,
            OUTPUTS_DESCRIPTION,
            &own_outputs,
        );

        workspace.stage.merge_defaults(
            dependencies.resources.into_iter().map(|(id, (r, _))| (id, r)),
            dependencies.outputs.into_iter().map(|(id, (o, _))| (id, o)),
        );
        Ok(())
    }
}
