//! Scheduled and CloudWatch event rules.

use tracing::debug;

use super::{PipelineContext, StackPass, Workspace};
use crate::error::Result;
use crate::naming;
use crate::snapshot::DeployedSnapshots;
use crate::template::{
    find_all_references, function_prefix, has_permission_principal, ref_, referenced_function,
    ResourceType,
};

pub struct CloudWatchEventsPass;

impl CloudWatchEventsPass {
    fn relink_rules(&self, workspace: &mut Workspace) -> Result<()> {
        for id in workspace.stage.ids_of_type(&ResourceType::EventsRule) {
            let Some(mut rule) = workspace.stage.resources.remove(&id) else {
                continue;
            };
            let mut aliases = Vec::new();
            let mut unaliased = false;
            if let Some(targets) = rule.properties.get_mut("Targets") {
                let functions: Vec<_> = find_all_references(targets)
                    .into_iter()
                    .filter(|found| found.target.ends_with("LambdaFunction"))
                    .map(|found| {
                        let alias_id = naming::function_alias_id(function_prefix(&found.target));
                        (found, alias_id)
                    })
                    .collect();
                unaliased = functions
                    .iter()
                    .any(|(_, alias_id)| !workspace.alias.resources.contains_key(alias_id));
                for (found, alias_id) in functions.into_iter().filter(|_| !unaliased) {
                    found.path.set(targets, ref_(&alias_id))?;
                    aliases.push(alias_id);
                }
            }
            if aliases.is_empty() || unaliased {
                workspace.stage.resources.insert(id, rule);
                continue;
            }
            for alias_id in aliases {
                rule.add_dependency(alias_id);
            }
            debug!("Moving event rule {}", id);
            workspace.alias.resources.insert(id, rule);
        }
        Ok(())
    }

    fn relink_permissions(&self, workspace: &mut Workspace) {
        let permissions: Vec<String> = workspace
            .stage
            .resources
            .iter()
            .filter(|(_, r)| r.is(&ResourceType::LambdaPermission) && has_permission_principal(r, "events"))
            .map(|(id, _)| id.clone())
            .collect();
        for id in permissions {
            let Some(mut permission) = workspace.stage.resources.remove(&id) else {
                continue;
            };
            let function = permission
                .property("FunctionName")
                .and_then(referenced_function)
                .map(|f| function_prefix(f).to_string());
            let Some(function) = function else {
                workspace.stage.resources.insert(id, permission);
                continue;
            };
            let alias_id = naming::function_alias_id(&function);
            if !workspace.alias.resources.contains_key(&alias_id) {
                debug!("Keeping event permission {} of an unversioned function", id);
                workspace.stage.resources.insert(id, permission);
                continue;
            }
            permission.properties["FunctionName"] = ref_(&alias_id);
            permission.set_dependencies([alias_id]);
            debug!("Moving event permission {}", id);
            workspace.alias.resources.insert(id, permission);
        }
    }
}

impl StackPass for CloudWatchEventsPass {
    fn name(&self) -> &'static str {
        "cw-events"
    }

    fn apply(
        &self,
        _ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        _deployed: &DeployedSnapshots,
    ) -> Result<()> {
        self.relink_rules(workspace)?;
        self.relink_permissions(workspace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{context, template};
    use crate::template::Template;
    use serde_json::json;

    fn alias() -> Template {
        template(json!({
            "Resources": {
                "Testfct1Alias": {"Type": "AWS::Lambda::Alias", "Properties": {}}
            }
        }))
    }

    #[test]
    fn test_rules_target_function_aliases() {
        let stage = template(json!({
            "Resources": {
                "Testfct1EventsRuleSchedule1": {
                    "Type": "AWS::Events::Rule",
                    "Properties": {
                        "ScheduleExpression": "rate(10 minutes)",
                        "Targets": [{"Arn": {"Fn::GetAtt": ["Testfct1LambdaFunction", "Arn"]}, "Id": "schedule"}]
                    }
                },
                "AuditRule": {
                    "Type": "AWS::Events::Rule",
                    "Properties": {"Targets": [{"Arn": {"Ref": "AuditTopic"}, "Id": "audit"}]}
                },
                "Testfct1LambdaPermissionEventsRuleSchedule1": {
                    "Type": "AWS::Lambda::Permission",
                    "Properties": {
                        "FunctionName": {"Fn::GetAtt": ["Testfct1LambdaFunction", "Arn"]},
                        "Principal": {"Fn::Join": ["", ["events.", {"Ref": "AWS::URLSuffix"}]]},
                        "SourceArn": {"Fn::GetAtt": ["Testfct1EventsRuleSchedule1", "Arn"]}
                    }
                }
            }
        }));
        let mut ws = Workspace::new(stage, alias());
        CloudWatchEventsPass
            .apply(&mut context("myAlias"), &mut ws, &DeployedSnapshots::default())
            .unwrap();

        let rule = &ws.alias.resources["Testfct1EventsRuleSchedule1"];
        assert_eq!(rule.properties["Targets"][0]["Arn"], json!({"Ref": "Testfct1Alias"}));
        assert_eq!(rule.dependencies(), vec!["Testfct1Alias"]);

        let permission = &ws.alias.resources["Testfct1LambdaPermissionEventsRuleSchedule1"];
        assert_eq!(permission.properties["FunctionName"], json!({"Ref": "Testfct1Alias"}));
        assert_eq!(permission.dependencies(), vec!["Testfct1Alias"]);

        assert!(ws.stage.resources.contains_key("AuditRule"));
        assert_eq!(ws.stage.resources.len(), 1);
    }

    #[test]
    fn test_rules_of_unversioned_functions_stay() {
        let stage = template(json!({
            "Resources": {
                "FanOutRule": {
                    "Type": "AWS::Events::Rule",
                    "Properties": {
                        "ScheduleExpression": "rate(1 hour)",
                        "Targets": [
                            {"Arn": {"Fn::GetAtt": ["Testfct1LambdaFunction", "Arn"]}, "Id": "first"},
                            {"Arn": {"Fn::GetAtt": ["Testfct2LambdaFunction", "Arn"]}, "Id": "second"}
                        ]
                    }
                },
                "Testfct2LambdaPermissionFanOutRule": {
                    "Type": "AWS::Lambda::Permission",
                    "Properties": {
                        "FunctionName": {"Fn::GetAtt": ["Testfct2LambdaFunction", "Arn"]},
                        "Principal": "events.amazonaws.com",
                        "SourceArn": {"Fn::GetAtt": ["FanOutRule", "Arn"]}
                    }
                }
            }
        }));
        let mut ws = Workspace::new(stage.clone(), alias());
        CloudWatchEventsPass
            .apply(&mut context("myAlias"), &mut ws, &DeployedSnapshots::default())
            .unwrap();

        assert_eq!(ws.stage.resources, stage.resources);
        assert_eq!(ws.alias.resources.len(), 1);
    }
}
