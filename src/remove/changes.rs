//! Stage template changes that follow the removal of an alias.
//!
//! Everything only the removed alias used goes away: function definitions no
//! other alias points at, custom resources and outputs nobody else lists, the
//! alias' authorizers and execution role, and the API itself once no alias
//! deploys it anymore.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::error::{AliasError, Result};
use crate::naming;
use crate::pipeline::api_gateway::deploys_api;
use crate::pipeline::context::output_list;
use crate::pipeline::functions::neutralize_removed;
use crate::pipeline::lambda_role::prune_policies;
use crate::snapshot::AliasSnapshot;
use crate::template::{find_references, references, ResourceType, Segment, Template};

/// What a removal strips from the stage template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackChanges {
    /// Function prefixes no remaining alias uses
    pub obsolete_functions: Vec<String>,
    pub removed_resources: Vec<String>,
    pub removed_outputs: Vec<String>,
    /// The execution role is still referenced and stays until the next deploy
    pub role_removal_delayed: bool,
    pub api_removed: bool,
}

impl StackChanges {
    pub fn is_empty(&self) -> bool {
        self.removed_resources.is_empty() && self.removed_outputs.is_empty() && !self.api_removed
    }
}

/// Prefixes of the functions an alias template holds aliases for
fn aliased_functions(template: &Template) -> Vec<String> {
    template
        .ids_of_type(&ResourceType::LambdaAlias)
        .into_iter()
        .filter_map(|id| id.strip_suffix("Alias").map(str::to_string))
        .collect()
}

fn listed(template: &Template, output: &str, stack_name: &str) -> Result<Vec<String>> {
    output_list(template, output)
        .map_err(|e| AliasError::corrupt_snapshot(stack_name).with_source(e))
}

/// Detach methods from an authorizer and drop every dependency on it
fn detach_authorizer(stage: &mut Template, authorizer: &str) {
    for (id, resource) in stage.resources.iter_mut() {
        for path in find_references(&resource.properties, &[authorizer]) {
            if path.last() != Some(&Segment::Field("AuthorizerId".to_string())) {
                continue;
            }
            let Some(Value::Object(method)) = path.parent().and_then(|p| p.get_mut(&mut resource.properties)) else {
                continue;
            };
            debug!("Detaching {} from {}", authorizer, id);
            method.remove("AuthorizerId");
            method.insert("AuthorizationType".to_string(), Value::String("NONE".to_string()));
        }
        resource.remove_dependency(authorizer);
    }
}

/// Strip what only `alias` used from `stage`.
///
/// `siblings` are the aliases that stay deployed, `current` the deployed
/// template of the alias being removed.
pub fn compute_stack_changes(
    stage: &mut Template,
    siblings: &[AliasSnapshot],
    current: &Template,
    stack_name: &str,
    alias: &str,
) -> Result<StackChanges> {
    let normalized_alias = naming::normalize_alias_for_logical_id(alias)?;
    let current_stack = naming::alias_stack_name(stack_name, alias);

    let mut used_functions = BTreeSet::new();
    let mut used_resources = BTreeSet::new();
    let mut used_outputs = BTreeSet::new();
    for sibling in siblings {
        used_functions.extend(aliased_functions(&sibling.template));
        used_resources.extend(listed(&sibling.template, naming::ALIAS_RESOURCES_OUTPUT, &sibling.stack_name)?);
        used_outputs.extend(listed(&sibling.template, naming::ALIAS_OUTPUTS_OUTPUT, &sibling.stack_name)?);
    }

    let mut changes = StackChanges {
        obsolete_functions: aliased_functions(current)
            .into_iter()
            .filter(|f| !used_functions.contains(f))
            .collect(),
        ..Default::default()
    };

    let mut obsolete_resources: Vec<String> = changes
        .obsolete_functions
        .iter()
        .flat_map(|f| [format!("{f}LambdaFunction"), format!("{f}LogGroup")])
        .collect();
    obsolete_resources.extend(
        listed(current, naming::ALIAS_RESOURCES_OUTPUT, &current_stack)?
            .into_iter()
            .filter(|r| !used_resources.contains(r)),
    );
    let mut obsolete_outputs: Vec<String> = changes
        .obsolete_functions
        .iter()
        .map(|f| naming::function_arn_output(f))
        .collect();
    obsolete_outputs.extend(
        listed(current, naming::ALIAS_OUTPUTS_OUTPUT, &current_stack)?
            .into_iter()
            .filter(|o| !used_outputs.contains(o)),
    );

    for function in &changes.obsolete_functions {
        let authorizer = format!("{function}ApiGatewayAuthorizer{normalized_alias}");
        if stage.resources.contains_key(&authorizer) {
            detach_authorizer(stage, &authorizer);
            obsolete_resources.push(authorizer);
        }
    }

    for id in &obsolete_resources {
        if stage.resources.remove(id).is_some() {
            changes.removed_resources.push(id.clone());
        }
    }
    for id in &obsolete_outputs {
        if stage.outputs.remove(id).is_some() {
            changes.removed_outputs.push(id.clone());
        }
    }
    if !changes.removed_resources.is_empty() {
        info!("Remove unused resources: {}", changes.removed_resources.join(", "));
    }

    let role = naming::execution_role_id(alias)?;
    if stage.resources.contains_key(&role) {
        let referenced = stage
            .resources
            .iter()
            .any(|(id, r)| id != &role && (references(&r.properties, &role) || r.depends_on_name(&role)));
        if referenced {
            warn!("IAM policy removal delayed - will be removed on next deployment");
            changes.role_removal_delayed = true;
        } else {
            debug!("Removing alias role {}", role);
            stage.resources.remove(&role);
            changes.removed_resources.push(role);
        }
    }

    prune_policies(stage, &obsolete_resources);
    neutralize_removed(stage, &obsolete_resources)?;

    if !siblings.iter().any(|s| deploys_api(&s.template)) {
        let api: Vec<String> = stage
            .resources
            .iter()
            .filter(|(_, r)| r.kind.is_api_gateway())
            .map(|(id, _)| id.clone())
            .collect();
        if !api.is_empty() {
            info!("Remove API");
            changes.api_removed = true;
        }
        for id in api {
            stage.resources.remove(&id);
            changes.removed_resources.push(id);
        }
        for output in [
            naming::REST_API,
            naming::REST_API_ROOT_RESOURCE,
            naming::SERVICE_ENDPOINT_OUTPUT,
        ] {
            if stage.outputs.remove(output).is_some() {
                changes.removed_outputs.push(output.to_string());
            }
        }
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    const STACK: &str = "testService-myStage";

    fn template(value: Value) -> Template {
        Template::from_value(value).unwrap()
    }

    fn sibling(alias: &str, value: Value) -> AliasSnapshot {
        AliasSnapshot {
            stack_name: format!("{STACK}-{alias}"),
            template: template(value),
        }
    }

    fn stage() -> Template {
        template(json!({
            "Resources": {
                "Testfct1LambdaFunction": {
                    "Type": "AWS::Lambda::Function",
                    "Properties": {"Role": {"Fn::GetAtt": ["IamRoleLambdaExecutionmyAlias", "Arn"]}}
                },
                "Testfct1LogGroup": {"Type": "AWS::Logs::LogGroup", "Properties": {}},
                "Testfct2LambdaFunction": {
                    "Type": "AWS::Lambda::Function",
                    "Properties": {
                        "Environment": {"Variables": {"QUEUE": {"Ref": "MyQueue"}}}
                    }
                },
                "MyQueue": {"Type": "AWS::SQS::Queue", "Properties": {}},
                "SharedTable": {"Type": "AWS::DynamoDB::Table", "Properties": {}},
                "IamRoleLambdaExecutionmyAlias": {
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "Policies": [{
                            "PolicyDocument": {
                                "Statement": [
                                    {"Effect": "Allow", "Action": ["sqs:*"], "Resource": [{"Fn::GetAtt": ["MyQueue", "Arn"]}]},
                                    {"Effect": "Allow", "Action": ["dynamodb:*"], "Resource": [{"Fn::GetAtt": ["SharedTable", "Arn"]}]}
                                ]
                            }
                        }]
                    }
                },
                "ApiGatewayRestApi": {"Type": "AWS::ApiGateway::RestApi", "Properties": {}},
                "ApiGatewayMethodGet": {
                    "Type": "AWS::ApiGateway::Method",
                    "Properties": {
                        "AuthorizationType": "CUSTOM",
                        "AuthorizerId": {"Ref": "Testfct1ApiGatewayAuthorizermyAlias"}
                    },
                    "DependsOn": ["Testfct1ApiGatewayAuthorizermyAlias"]
                },
                "Testfct1ApiGatewayAuthorizermyAlias": {"Type": "AWS::ApiGateway::Authorizer", "Properties": {}}
            },
            "Outputs": {
                "Testfct1LambdaFunctionArn": {"Value": {"Fn::GetAtt": ["Testfct1LambdaFunction", "Arn"]}},
                "Testfct2LambdaFunctionArn": {"Value": {"Fn::GetAtt": ["Testfct2LambdaFunction", "Arn"]}},
                "QueueUrl": {"Value": {"Ref": "MyQueue"}},
                "ApiGatewayRestApi": {"Value": {"Ref": "ApiGatewayRestApi"}},
                "ServiceEndpoint": {"Value": "https://example.com"}
            }
        }))
    }

    fn current() -> Template {
        template(json!({
            "Resources": {
                "Testfct1Alias": {"Type": "AWS::Lambda::Alias", "Properties": {}},
                "Testfct2Alias": {"Type": "AWS::Lambda::Alias", "Properties": {}}
            },
            "Outputs": {
                "AliasResources": {"Value": "[\"MyQueue\",\"SharedTable\"]"},
                "AliasOutputs": {"Value": "[\"QueueUrl\"]"}
            }
        }))
    }

    #[test]
    fn test_removes_what_only_the_alias_used() {
        let siblings = vec![sibling(
            "other",
            json!({
                "Resources": {
                    "Testfct2Alias": {"Type": "AWS::Lambda::Alias", "Properties": {}},
                    "ApiGatewayDeployment1": {"Type": "AWS::ApiGateway::Deployment", "Properties": {}}
                },
                "Outputs": {"AliasResources": {"Value": "[\"SharedTable\"]"}}
            }),
        )];
        let mut stage = stage();

        let changes = compute_stack_changes(&mut stage, &siblings, &current(), STACK, "myAlias").unwrap();

        assert_eq!(changes.obsolete_functions, vec!["Testfct1"]);
        for gone in ["Testfct1LambdaFunction", "Testfct1LogGroup", "MyQueue", "Testfct1ApiGatewayAuthorizermyAlias"] {
            assert!(!stage.resources.contains_key(gone), "{gone} should be removed");
        }
        assert!(stage.resources.contains_key("SharedTable"));
        assert!(stage.resources.contains_key("Testfct2LambdaFunction"));
        assert!(!stage.outputs.contains_key("Testfct1LambdaFunctionArn"));
        assert!(!stage.outputs.contains_key("QueueUrl"));
        assert!(stage.outputs.contains_key("Testfct2LambdaFunctionArn"));

        let method = &stage.resources["ApiGatewayMethodGet"];
        assert_eq!(method.properties, json!({"AuthorizationType": "NONE"}));
        assert!(method.dependencies().is_empty());

        // The function of the remaining alias still points at the queue
        assert_eq!(
            stage.resources["Testfct2LambdaFunction"].properties["Environment"]["Variables"]["QUEUE"],
            json!("REMOVED")
        );

        // Role is unreferenced once the function is gone; its queue statement went with it
        assert!(!changes.role_removal_delayed);
        assert!(!stage.resources.contains_key("IamRoleLambdaExecutionmyAlias"));

        // A sibling still deploys the API
        assert!(!changes.api_removed);
        assert!(stage.resources.contains_key("ApiGatewayRestApi"));
    }

    #[test]
    fn test_referenced_role_is_kept_and_pruned() {
        let siblings = vec![sibling(
            "other",
            json!({"Resources": {"Testfct1Alias": {"Type": "AWS::Lambda::Alias", "Properties": {}}}}),
        )];
        let mut stage = stage();

        let changes = compute_stack_changes(&mut stage, &siblings, &current(), STACK, "myAlias").unwrap();

        assert!(changes.role_removal_delayed);
        let role = &stage.resources["IamRoleLambdaExecutionmyAlias"];
        assert!(role.property("Policies").is_none());
        assert_eq!(role.properties, json!({}));
        assert!(changes.api_removed);
        assert!(!stage.resources.contains_key("ApiGatewayRestApi"));
        assert!(!stage.resources.contains_key("ApiGatewayMethodGet"));
        assert!(!stage.outputs.contains_key("ApiGatewayRestApi"));
        assert!(!stage.outputs.contains_key("ServiceEndpoint"));
    }

    #[test]
    fn test_malformed_sibling_lists_are_rejected() {
        let siblings = vec![sibling(
            "other",
            json!({"Outputs": {"AliasResources": {"Value": "{not json"}}}),
        )];
        let err = compute_stack_changes(&mut stage(), &siblings, &current(), STACK, "myAlias").unwrap_err();
        assert_eq!(err.code(), ErrorCode::TEMPLATE_CORRUPT_SNAPSHOT);
    }
}
