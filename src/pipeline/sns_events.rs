//! SNS topics and Lambda subscriptions.
//!
//! Topics with Lambda subscribers become per-alias topics named
//! `<topic>-<alias>`.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

use super::context::{function_handles, is_unaliased_function};
use super::{PipelineContext, StackPass, Workspace};
use crate::error::Result;
use crate::snapshot::DeployedSnapshots;
use crate::template::{
    has_permission_principal, ref_, Reference, Resource, ResourceType, Template,
};

fn is_lambda_protocol(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|p| p.eq_ignore_ascii_case("lambda"))
}

fn relink_endpoint(alias: &Template, endpoint: &mut Value) -> Vec<String> {
    let Some((version, alias_id)) = function_handles(alias, endpoint) else {
        return Vec::new();
    };
    *endpoint = ref_(&alias_id);
    version.into_iter().chain([alias_id]).collect()
}

fn topic_target(subscription: &Resource) -> Option<String> {
    subscription
        .property("TopicArn")
        .and_then(Reference::from_value)
        .and_then(|r| r.target().map(str::to_string))
}

pub struct SnsEventsPass;

impl SnsEventsPass {
    /// Topics referenced by standalone Lambda subscriptions, split into those
    /// whose function is aliased and those whose function stays unversioned
    fn subscribed_topics(&self, workspace: &Workspace) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut aliased = BTreeSet::new();
        let mut unaliased = BTreeSet::new();
        let subscriptions = workspace
            .stage
            .resources_of_type(&ResourceType::SnsSubscription)
            .into_values()
            .filter(|s| is_lambda_protocol(s.property("Protocol")));
        for subscription in subscriptions {
            let Some(topic) = topic_target(subscription) else {
                continue;
            };
            let endpoint = subscription.property("Endpoint").cloned().unwrap_or_default();
            if is_unaliased_function(&workspace.alias, &endpoint) {
                unaliased.insert(topic);
            } else if function_handles(&workspace.alias, &endpoint).is_some() {
                aliased.insert(topic);
            }
        }
        (aliased, unaliased)
    }

    fn relink_topics(&self, ctx: &PipelineContext, workspace: &mut Workspace) {
        let (subscribed, pinned) = self.subscribed_topics(workspace);
        for id in workspace.stage.ids_of_type(&ResourceType::SnsTopic) {
            let unaliased_endpoint = match workspace.stage.resources[&id].property("Subscription") {
                Some(Value::Array(subscriptions)) => subscriptions
                    .iter()
                    .filter(|s| is_lambda_protocol(s.get("Protocol")))
                    .filter_map(|s| s.get("Endpoint"))
                    .any(|e| is_unaliased_function(&workspace.alias, e)),
                _ => false,
            };
            if unaliased_endpoint || pinned.contains(&id) {
                debug!("Keeping topic {} of an unversioned function", id);
                continue;
            }
            let Some(mut topic) = workspace.stage.resources.remove(&id) else {
                continue;
            };
            let mut dependencies = Vec::new();
            if let Some(Value::Array(subscriptions)) = topic.properties.get_mut("Subscription") {
                for subscription in subscriptions.iter_mut() {
                    if !is_lambda_protocol(subscription.get("Protocol")) {
                        continue;
                    }
                    if let Some(endpoint) = subscription.get_mut("Endpoint") {
                        dependencies.extend(relink_endpoint(&workspace.alias, endpoint));
                    }
                }
            }
            if dependencies.is_empty() && !subscribed.contains(&id) {
                workspace.stage.resources.insert(id, topic);
                continue;
            }
            for dependency in dependencies {
                topic.add_dependency(dependency);
            }
            if let Some(Value::String(name)) = topic.properties.get_mut("TopicName") {
                *name = format!("{name}-{}", ctx.alias);
            }
            debug!("Moving topic {}", id);
            workspace.alias.resources.insert(id, topic);
        }
    }

    fn relink_subscriptions(&self, workspace: &mut Workspace) {
        for id in workspace.stage.ids_of_type(&ResourceType::SnsSubscription) {
            if topic_target(&workspace.stage.resources[&id])
                .is_some_and(|topic| workspace.stage.resources.contains_key(&topic))
            {
                continue;
            }
            let Some(mut subscription) = workspace.stage.resources.remove(&id) else {
                continue;
            };
            let dependencies = match subscription.properties.get_mut("Endpoint") {
                Some(endpoint) => relink_endpoint(&workspace.alias, endpoint),
                None => Vec::new(),
            };
            if dependencies.is_empty() {
                workspace.stage.resources.insert(id, subscription);
                continue;
            }
            subscription.set_dependencies(dependencies);
            debug!("Moving subscription {}", id);
            workspace.alias.resources.insert(id, subscription);
        }
    }

    fn relink_permissions(&self, ctx: &PipelineContext, workspace: &mut Workspace) {
        let permissions: Vec<String> = workspace
            .stage
            .resources
            .iter()
            .filter(|(_, r)| r.is(&ResourceType::LambdaPermission) && has_permission_principal(r, "sns"))
            .map(|(id, _)| id.clone())
            .collect();
        for id in permissions {
            let Some(mut permission) = workspace.stage.resources.remove(&id) else {
                continue;
            };
            let dependencies = match permission.properties.get_mut("FunctionName") {
                Some(function) => relink_endpoint(&workspace.alias, function),
                None => Vec::new(),
            };
            if dependencies.is_empty() {
                workspace.stage.resources.insert(id, permission);
                continue;
            }
            suffix_source_arn(&mut permission, &ctx.alias);
            permission.set_dependencies(dependencies);
            debug!("Moving topic permission {}", id);
            workspace.alias.resources.insert(id, permission);
        }
    }
}

fn suffix_source_arn(permission: &mut Resource, alias: &str) {
    if let Some(Value::Array(parts)) = permission
        .properties
        .pointer_mut("/SourceArn/Fn::Join/1")
    {
        parts.push(Value::String(format!("-{alias}")));
    }
}

impl StackPass for SnsEventsPass {
    fn name(&self) -> &'static str {
        "sns-events"
    }

    fn apply(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        _deployed: &DeployedSnapshots,
    ) -> Result<()> {
        self.relink_topics(ctx, workspace);
        self.relink_subscriptions(workspace);
        self.relink_permissions(ctx, workspace);
        Ok(())
    }
}
