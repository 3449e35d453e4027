//! Execution role handling.
//!
//! Without an externally configured role every alias gets its own copy of the
//! generated execution role, `IamRoleLambdaExecution<alias>`, and the roles of
//! the other deployed aliases are carried over from the live stage template.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::{PipelineContext, StackPass, Workspace};
use crate::error::{AliasError, Result};
use crate::naming;
use crate::snapshot::DeployedSnapshots;
use crate::template::{
    find_all_references, references, rename_references, Resource, ResourceType, Template,
};

/// Statement lists of every policy document attached to a role or policy
fn statement_lists(resource: &mut Resource) -> Vec<&mut Vec<Value>> {
    let documents: Vec<&mut Value> = match &resource.kind {
        ResourceType::IamRole => match resource.properties.get_mut("Policies") {
            Some(Value::Array(policies)) => policies
                .iter_mut()
                .filter_map(|p| p.get_mut("PolicyDocument"))
                .collect(),
            _ => Vec::new(),
        },
        ResourceType::IamPolicy => resource.properties.get_mut("PolicyDocument").into_iter().collect(),
        _ => Vec::new(),
    };
    documents
        .into_iter()
        .filter_map(|d| match d.get_mut("Statement") {
            Some(Value::Array(statements)) => Some(statements),
            _ => None,
        })
        .collect()
}

/// Drop statement resources that reference any of `removed`, and statements
/// left without resources. Returns the number of dropped statements.
pub fn prune_statements(statements: &mut Vec<Value>, removed: &[String]) -> usize {
    if removed.is_empty() {
        return 0;
    }
    let before = statements.len();
    statements.retain_mut(|statement| match statement.get_mut("Resource") {
        Some(Value::Array(resources)) => {
            let had_resources = !resources.is_empty();
            resources.retain(|r| !removed.iter().any(|name| references(r, name)));
            !resources.is_empty() || !had_resources
        }
        Some(single) => !removed.iter().any(|name| references(single, name)),
        None => true,
    });
    before - statements.len()
}

/// Prune policy statements of every role and policy resource in `template`
pub fn prune_policies(template: &mut Template, removed: &[String]) -> usize {
    let mut pruned = 0;
    for (id, resource) in template.resources.iter_mut() {
        let mut dropped = 0;
        for statements in statement_lists(resource) {
            dropped += prune_statements(statements, removed);
        }
        if dropped > 0 {
            debug!("Dropped {} policy statements of {}", dropped, id);
            drop_empty_policies(resource);
        }
        pruned += dropped;
    }
    pruned
}

/// Remove inline role policies without statements, and the `Policies` list
/// itself once nothing is left in it
fn drop_empty_policies(role: &mut Resource) {
    if !role.is(&ResourceType::IamRole) {
        return;
    }
    let Some(Value::Array(policies)) = role.properties.get_mut("Policies") else {
        return;
    };
    policies.retain(|policy| {
        !policy
            .pointer("/PolicyDocument/Statement")
            .and_then(Value::as_array)
            .is_some_and(Vec::is_empty)
    });
    if policies.is_empty() {
        if let Some(properties) = role.properties.as_object_mut() {
            properties.remove("Policies");
        }
    }
}

fn policy_count(stage: &Template, role: &Resource) -> usize {
    match role.properties.get("Policies") {
        Some(Value::Array(policies)) if !policies.is_empty() => policies.len(),
        _ if stage.resources.contains_key(naming::LEGACY_EXECUTION_POLICY) => 1,
        _ => 0,
    }
}

/// Append the alias to the generated role name
fn qualify_role_name(role: &mut Resource, alias: &str) {
    match role.properties.get_mut("RoleName") {
        Some(Value::String(name)) => *name = format!("{name}-{alias}"),
        Some(Value::Object(join)) => {
            if let Some(Value::Array(parts)) = join
                .get_mut("Fn::Join")
                .and_then(|j| j.get_mut(1))
            {
                parts.push(Value::String(alias.to_string()));
            }
        }
        _ => {}
    }
}

pub struct LambdaRolePass;

impl LambdaRolePass {
    fn apply_global_role(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        deployed: &DeployedSnapshots,
    ) -> Result<()> {
        debug!("Service role configured, importing alias roles only");
        let own_role = naming::execution_role_id(&ctx.alias)?;

        for (id, role) in &deployed.stage.resources {
            if id.starts_with(naming::EXECUTION_ROLE) && id != naming::EXECUTION_ROLE {
                workspace.stage.add_resource_if_absent(id.clone(), role.clone());
            }
        }
        if ctx.sibling_flags.iter().any(|flags| !flags.has_role) {
            if let Some(role) = deployed.stage.resources.get(naming::EXECUTION_ROLE) {
                workspace
                    .stage
                    .add_resource_if_absent(naming::EXECUTION_ROLE, role.clone());
            }
        }
        if workspace.stage.resources.remove(&own_role).is_some() {
            info!("Removed obsolete role {}", own_role);
        }

        ctx.flags.has_role = true;
        Ok(())
    }

    fn carry_sibling_roles(
        &self,
        workspace: &mut Workspace,
        deployed: &DeployedSnapshots,
    ) -> Result<()> {
        for alias in deployed.sibling_alias_names() {
            let role_id = naming::execution_role_id(&alias)?;
            if let Some(role) = deployed.stage.resources.get(&role_id) {
                workspace.stage.add_resource_if_absent(role_id, role.clone());
            }
        }
        Ok(())
    }
}

impl StackPass for LambdaRolePass {
    fn name(&self) -> &'static str {
        "lambda-role"
    }

    fn apply(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        deployed: &DeployedSnapshots,
    ) -> Result<()> {
        if ctx.global_role.is_some() {
            return self.apply_global_role(ctx, workspace, deployed);
        }

        let Some(mut role) = workspace.stage.resources.remove(naming::EXECUTION_ROLE) else {
            debug!("No execution role in the stage template");
            return self.carry_sibling_roles(workspace, deployed);
        };

        let count = policy_count(&workspace.stage, &role);
        if count != 1 {
            return Err(AliasError::unexpected_policy_shape(naming::EXECUTION_ROLE, count));
        }

        let role_id = naming::execution_role_id(&ctx.alias)?;
        debug!("Renaming execution role to {}", role_id);
        qualify_role_name(&mut role, &ctx.alias);

        for resource in workspace.stage.resources.values_mut() {
            rename_references(&mut resource.properties, naming::EXECUTION_ROLE, &role_id);
            resource.rename_dependency(naming::EXECUTION_ROLE, &role_id);
        }
        for output in workspace.stage.outputs.values_mut() {
            rename_references(&mut output.value, naming::EXECUTION_ROLE, &role_id);
        }

        let mut dependencies = BTreeSet::new();
        let mut pruned = 0;
        for statements in statement_lists(&mut role) {
            pruned += prune_statements(statements, &ctx.removed_resources);
            for statement in statements.iter() {
                dependencies.extend(find_all_references(statement).into_iter().map(|r| r.target));
            }
        }
        if pruned > 0 {
            drop_empty_policies(&mut role);
        }
        if let Some(policy) = workspace.stage.resources.get_mut(naming::LEGACY_EXECUTION_POLICY) {
            warn!("Stage uses a separate execution policy resource");
            for statements in statement_lists(policy) {
                prune_statements(statements, &ctx.removed_resources);
            }
        }
        for dependency in dependencies {
            if dependency.starts_with("AWS::") || workspace.stage.resources.contains_key(&dependency) {
                continue;
            }
            if let Some(resource) = deployed.stage.resources.get(&dependency) {
                debug!("Restoring policy dependency {}", dependency);
                workspace.stage.resources.insert(dependency, resource.clone());
            }
        }

        workspace.stage.resources.insert(role_id, role);
        self.carry_sibling_roles(workspace, deployed)
    }
}
