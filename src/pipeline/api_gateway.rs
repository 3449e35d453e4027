//! API Gateway restructuring.
//!
//! The REST API and its methods stay shared in the stage stack. Each alias
//! owns a deployment and a stage named after the alias; integrations route to
//! the function alias through the `SERVERLESS_ALIAS` stage variable.

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::context::{function_handles, is_unaliased_function};
use super::{PipelineContext, StackPass, Workspace};
use crate::error::{AliasError, Result};
use crate::naming;
use crate::snapshot::DeployedSnapshots;
use crate::template::{
    deep_merge, get_att, has_permission_principal, import_value, ref_, referenced_function,
    rename_references, Output, Resource, ResourceType, Template,
};

/// Segment spliced into Lambda URIs so each stage invokes its own alias
pub const ALIAS_PLACEHOLDER: &str = ":${stageVariables.SERVERLESS_ALIAS}";

const INVOCATIONS_SUFFIX: &str = "/invocations";

fn uri_parts(uri: Option<&mut Value>) -> Option<&mut Vec<Value>> {
    uri?.get_mut("Fn::Join")?.get_mut(1)?.as_array_mut()
}

/// Insert the placeholder after the function ARN of an integration URI
fn alias_integration_uri(method: &mut Resource) -> bool {
    let Some(parts) = uri_parts(method.properties.pointer_mut("/Integration/Uri")) else {
        return false;
    };
    if parts.iter().any(|p| p.as_str() == Some(ALIAS_PLACEHOLDER)) {
        return false;
    }
    let Some(index) = parts.iter().position(|p| p.get("Fn::GetAtt").is_some()) else {
        return false;
    };
    parts.insert(index + 1, Value::String(ALIAS_PLACEHOLDER.to_string()));
    true
}

/// An authorizer whose function is not part of this stack
fn is_external_authorizer(authorizer: &Resource) -> bool {
    match authorizer.property("AuthorizerUri.Fn::Join").and_then(|j| j.get(1)) {
        Some(Value::Array(parts)) => !parts.iter().any(|p| referenced_function(p).is_some()),
        _ => true,
    }
}

/// Insert the placeholder in front of the `/invocations` suffix
fn alias_authorizer_uri(authorizer: &mut Resource) {
    let Some(parts) = uri_parts(authorizer.properties.get_mut("AuthorizerUri")) else {
        return;
    };
    if parts.iter().any(|p| p.as_str() == Some(ALIAS_PLACEHOLDER)) {
        return;
    }
    match parts.iter().position(|p| p.as_str() == Some(INVOCATIONS_SUFFIX)) {
        Some(index) => parts.insert(index, Value::String(ALIAS_PLACEHOLDER.to_string())),
        None => parts.push(Value::String(ALIAS_PLACEHOLDER.to_string())),
    }
}

fn merge_override(resource: &mut Resource, user: &Resource) -> Result<()> {
    let mut merged = resource.to_value();
    deep_merge(&mut merged, &user.to_value());
    *resource = serde_json::from_value(merged)?;
    Ok(())
}

pub struct ApiGatewayPass;

impl ApiGatewayPass {
    fn api_exposed(&self, workspace: &mut Workspace, deployed: &DeployedSnapshots) -> bool {
        if workspace.stage.resources.contains_key(naming::REST_API) {
            return true;
        }
        let in_use = deployed
            .siblings
            .iter()
            .any(|s| s.template.has_resource_of_type(&ResourceType::ApiDeployment));
        if !in_use {
            return false;
        }
        match deployed.stage.resources.get(naming::REST_API) {
            Some(api) => {
                debug!("Retaining API for deployed aliases");
                workspace.stage.resources.insert(naming::REST_API.to_string(), api.clone());
                true
            }
            None => {
                warn!("Deployed aliases use an API that is missing from the stage stack");
                false
            }
        }
    }

    fn check_compatibility(&self, deployed: &DeployedSnapshots) -> Result<()> {
        if deployed
            .all_alias_templates()
            .any(|t| t.has_resource_of_type(&ResourceType::ApiMethod))
        {
            return Err(AliasError::incompatible_stack(
                "APIG deployment had to be changed. Please remove the alias stacks and the APIG stage for the alias in CF (AWS console) and redeploy.",
            ));
        }
        Ok(())
    }

    fn stage_resource(&self, ctx: &PipelineContext, deployment_id: &str) -> Resource {
        let mut properties = json!({
            "StageName": naming::sanitize_stage_name(&ctx.alias),
            "DeploymentId": ref_(deployment_id),
            "RestApiId": import_value(&ctx.stage_export(naming::REST_API)),
        });
        let mut variables = Map::new();
        variables.insert(naming::ALIAS_ENV_VAR.to_string(), Value::String(ctx.alias.clone()));
        variables.insert(naming::STAGE_ENV_VAR.to_string(), Value::String(ctx.stage.clone()));
        properties["Variables"] = Value::Object(variables);
        if let Some(enabled) = ctx.stage_settings.cache_cluster_enabled {
            properties["CacheClusterEnabled"] = Value::Bool(enabled);
        }
        if let Some(size) = &ctx.stage_settings.cache_cluster_size {
            properties["CacheClusterSize"] = size.clone();
        }
        if !ctx.method_settings.is_empty() {
            properties["MethodSettings"] = Value::Array(ctx.method_settings.clone());
        }
        Resource::new(ResourceType::ApiStage, properties).with_depends_on([deployment_id])
    }

    fn relocate_deployment(&self, ctx: &PipelineContext, workspace: &mut Workspace) {
        let mut deployments = workspace.stage.take_resources_of_type(&ResourceType::ApiDeployment);
        let Some((deployment_id, mut deployment)) = deployments.pop_first() else {
            return;
        };
        for (extra, _) in deployments {
            warn!("Ignoring additional API deployment {}", extra);
        }
        debug!("Moving API deployment {} to the alias stack", deployment_id);

        if let Some(properties) = deployment.properties.as_object_mut() {
            properties.remove("StageName");
            properties.insert(
                "RestApiId".to_string(),
                import_value(&ctx.stage_export(naming::REST_API)),
            );
        }
        deployment.set_dependencies(Vec::<String>::new());

        workspace
            .alias
            .resources
            .insert(naming::API_STAGE.to_string(), self.stage_resource(ctx, &deployment_id));
        workspace.alias.resources.insert(deployment_id, deployment);

        for (id, mut mapping) in workspace.stage.take_resources_of_type(&ResourceType::ApiBasePathMapping) {
            debug!("Moving base path mapping {}", id);
            if let Some(properties) = mapping.properties.as_object_mut() {
                properties.insert(
                    "RestApiId".to_string(),
                    import_value(&ctx.stage_export(naming::REST_API)),
                );
                properties.insert("Stage".to_string(), ref_(naming::API_STAGE));
            }
            mapping.set_dependencies(Vec::<String>::new());
            workspace.alias.resources.insert(id, mapping);
        }
    }

    fn alias_methods(&self, ctx: &mut PipelineContext, workspace: &mut Workspace) -> Result<()> {
        for (id, method) in workspace.stage.resources.iter_mut() {
            if !method.is(&ResourceType::ApiMethod) {
                continue;
            }
            let integration = method.property_str("Integration.Type");
            if matches!(integration, Some("AWS" | "AWS_PROXY")) && alias_integration_uri(method) {
                debug!("Routing method {} through the alias", id);
            }
            if let Some(user) = ctx.user_resources.resources.remove(id) {
                merge_override(method, &user)?;
            }
        }
        Ok(())
    }

    fn alias_authorizers(&self, ctx: &mut PipelineContext, workspace: &mut Workspace) -> Result<()> {
        let authorizers = workspace.stage.take_resources_of_type(&ResourceType::ApiAuthorizer);
        for (id, mut authorizer) in authorizers {
            let aliased_id = format!("{id}{}", ctx.normalized_alias);
            let kind = authorizer.property_str("Type").unwrap_or_default().to_uppercase();
            if matches!(kind.as_str(), "TOKEN" | "REQUEST") {
                if is_external_authorizer(&authorizer) {
                    debug!("Authorizer {} uses an external function", id);
                } else {
                    alias_authorizer_uri(&mut authorizer);
                }
            }
            if let Some(Value::String(name)) = authorizer.properties.get_mut("Name") {
                name.push('-');
                name.push_str(&ctx.alias);
            }
            if let Some(user) = ctx.user_resources.resources.remove(&id) {
                merge_override(&mut authorizer, &user)?;
            }

            debug!("Aliasing authorizer {} as {}", id, aliased_id);
            for resource in workspace.stage.resources.values_mut() {
                rename_references(&mut resource.properties, &id, &aliased_id);
                resource.rename_dependency(&id, &aliased_id);
            }
            for output in workspace.stage.outputs.values_mut() {
                rename_references(&mut output.value, &id, &aliased_id);
            }
            workspace.stage.resources.insert(aliased_id, authorizer);
        }
        Ok(())
    }

    /// Authorizers other aliases created stay until their alias is removed
    fn carry_sibling_authorizers(&self, workspace: &mut Workspace, deployed: &DeployedSnapshots) -> Result<()> {
        let mut suffixes = Vec::new();
        for alias in deployed.sibling_alias_names() {
            suffixes.push(naming::normalize_alias_for_logical_id(&alias)?.into_owned());
        }
        for (id, authorizer) in deployed.stage.resources_of_type(&ResourceType::ApiAuthorizer) {
            let owned_by_sibling = suffixes.iter().any(|suffix| {
                id.strip_suffix(suffix.as_str())
                    .is_some_and(|base| base.ends_with("Authorizer"))
            });
            if owned_by_sibling {
                workspace.stage.add_resource_if_absent(id, authorizer.clone());
            }
        }
        Ok(())
    }

    fn relink_permissions(&self, ctx: &PipelineContext, workspace: &mut Workspace) {
        let permission_ids: Vec<String> = workspace
            .stage
            .resources
            .iter()
            .filter(|(_, r)| r.is(&ResourceType::LambdaPermission) && has_permission_principal(r, "apigateway"))
            .map(|(id, _)| id.clone())
            .collect();

        for id in permission_ids {
            let Some(mut permission) = workspace.stage.resources.remove(&id) else {
                continue;
            };
            let function = permission.property("FunctionName").cloned().unwrap_or_default();
            if is_unaliased_function(&workspace.alias, &function) {
                debug!("Keeping API permission {} of an unversioned function", id);
                workspace.stage.resources.insert(id, permission);
                continue;
            }
            let (version_id, alias_id) = match function_handles(&workspace.alias, &function) {
                Some((version_id, alias_id)) => (version_id, Some(alias_id)),
                None => (None, None),
            };

            if let Some(alias_id) = &alias_id {
                permission.properties["FunctionName"] = ref_(alias_id);
            }
            permission.properties["SourceArn"] = json!({
                "Fn::Join": ["", [
                    "arn:aws:execute-api:",
                    ref_("AWS::Region"),
                    ":",
                    ref_("AWS::AccountId"),
                    ":",
                    import_value(&ctx.stage_export(naming::REST_API)),
                    "/*/*",
                ]]
            });
            permission.set_dependencies(version_id.into_iter().chain(alias_id));
            debug!("Moving API permission {}", id);
            workspace.alias.resources.insert(id, permission);
        }
    }
}

impl StackPass for ApiGatewayPass {
    fn name(&self) -> &'static str {
        "api-gateway"
    }

    fn apply(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        deployed: &DeployedSnapshots,
    ) -> Result<()> {
        if !self.api_exposed(workspace, deployed) {
            debug!("No API to process");
            return Ok(());
        }
        info!("Processing API");

        workspace.stage.outputs.insert(
            naming::REST_API.to_string(),
            Output::new("API Gateway API", ref_(naming::REST_API))
                .exported_as(ctx.stage_export(naming::REST_API)),
        );
        workspace.stage.outputs.insert(
            naming::REST_API_ROOT_RESOURCE.to_string(),
            Output::new(
                "API Gateway API root resource",
                get_att(naming::REST_API, "RootResourceId"),
            )
            .exported_as(ctx.stage_export(naming::REST_API_ROOT_RESOURCE)),
        );

        self.check_compatibility(deployed)?;
        self.relocate_deployment(ctx, workspace);
        self.alias_methods(ctx, workspace)?;
        self.alias_authorizers(ctx, workspace)?;
        self.carry_sibling_authorizers(workspace, deployed)?;
        self.relink_permissions(ctx, workspace);
        Ok(())
    }
}

/// True if the alias template deploys an API stage
pub fn deploys_api(template: &Template) -> bool {
    template.has_resource_of_type(&ResourceType::ApiDeployment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageSettings;
    use crate::error::ErrorCode;
    use crate::pipeline::test_support::{context, template};
    use crate::snapshot::AliasSnapshot;

    fn function_uri(function: &str) -> Value {
        json!({"Fn::Join": ["", [
            "arn:aws:apigateway:",
            {"Ref": "AWS::Region"},
            ":lambda:path/2015-03-31/functions/",
            {"Fn::GetAtt": [function, "Arn"]},
            "/invocations"
        ]]})
    }

    fn stage() -> Template {
        template(json!({
            "Resources": {
                "ApiGatewayRestApi": {"Type": "AWS::ApiGateway::RestApi", "Properties": {"Name": "myStage-testService"}},
                "ApiGatewayDeployment1": {
                    "Type": "AWS::ApiGateway::Deployment",
                    "Properties": {"RestApiId": {"Ref": "ApiGatewayRestApi"}, "StageName": "myStage"},
                    "DependsOn": ["ApiGatewayMethodFunc1Get"]
                },
                "ApiGatewayMethodFunc1Get": {
                    "Type": "AWS::ApiGateway::Method",
                    "Properties": {
                        "HttpMethod": "GET",
                        "AuthorizerId": {"Ref": "TestauthApiGatewayAuthorizer"},
                        "Integration": {"Type": "AWS_PROXY", "Uri": function_uri("Func1LambdaFunction")}
                    },
                    "DependsOn": "TestauthApiGatewayAuthorizer"
                },
                "TestauthApiGatewayAuthorizer": {
                    "Type": "AWS::ApiGateway::Authorizer",
                    "Properties": {
                        "Name": "testauth",
                        "Type": "TOKEN",
                        "AuthorizerUri": function_uri("TestauthLambdaFunction")
                    }
                },
                "ExternalApiGatewayAuthorizer": {
                    "Type": "AWS::ApiGateway::Authorizer",
                    "Properties": {
                        "Name": "external",
                        "Type": "TOKEN",
                        "AuthorizerUri": {"Fn::Join": ["", [
                            "arn:aws:apigateway:",
                            {"Ref": "AWS::Region"},
                            ":lambda:path/2015-03-31/functions/",
                            "arn:aws:lambda:us-east-1:123:function:custom-auth",
                            "/invocations"
                        ]]}
                    }
                },
                "CognitoApiGatewayAuthorizer": {
                    "Type": "AWS::ApiGateway::Authorizer",
                    "Properties": {"Name": "cognito", "Type": "COGNITO_USER_POOLS", "ProviderARNs": ["arn:pool"]}
                },
                "Func1LambdaPermissionApiGateway": {
                    "Type": "AWS::Lambda::Permission",
                    "Properties": {
                        "FunctionName": {"Fn::GetAtt": ["Func1LambdaFunction", "Arn"]},
                        "Action": "lambda:InvokeFunction",
                        "Principal": "apigateway.amazonaws.com",
                        "SourceArn": "arn:old"
                    }
                },
                "ExternalLambdaPermissionApiGateway": {
                    "Type": "AWS::Lambda::Permission",
                    "Properties": {
                        "FunctionName": "arn:aws:lambda:us-east-1:123:function:custom-auth",
                        "Principal": "apigateway.amazonaws.com"
                    }
                },
                "Pathmapping": {
                    "Type": "AWS::ApiGateway::BasePathMapping",
                    "Properties": {"BasePath": "(none)", "DomainName": "example.com", "Stage": "myStage"},
                    "DependsOn": ["ApiGatewayDeployment1"]
                }
            }
        }))
    }

    fn alias_template() -> Template {
        template(json!({
            "Resources": {
                "Func1Alias": {"Type": "AWS::Lambda::Alias", "Properties": {"Name": "myAlias"}},
                "Func1LambdaVersionXyz": {"Type": "AWS::Lambda::Version", "Properties": {}}
            }
        }))
    }

    fn run(ctx: &mut PipelineContext, deployed: &DeployedSnapshots) -> Workspace {
        let mut ws = Workspace::new(stage(), alias_template());
        ApiGatewayPass.apply(ctx, &mut ws, deployed).unwrap();
        ws
    }

    #[test]
    fn test_stage_resource_per_alias() {
        let mut ctx = context("my-alias");
        let ws = run(&mut ctx, &DeployedSnapshots::default());

        let stage = &ws.alias.resources["ApiGatewayStage"];
        assert_eq!(stage.properties["StageName"], json!("my_alias"));
        assert_eq!(stage.properties["DeploymentId"], json!({"Ref": "ApiGatewayDeployment1"}));
        assert_eq!(
            stage.properties["Variables"],
            json!({"SERVERLESS_ALIAS": "my-alias", "SERVERLESS_STAGE": "myStage"})
        );
        assert!(stage.properties.get("MethodSettings").is_none());
        assert_eq!(stage.dependencies(), vec!["ApiGatewayDeployment1"]);

        let deployment = &ws.alias.resources["ApiGatewayDeployment1"];
        assert!(deployment.properties.get("StageName").is_none());
        assert_eq!(
            deployment.properties["RestApiId"],
            json!({"Fn::ImportValue": "testService-myStage-ApiGatewayRestApi"})
        );
        assert!(deployment.depends_on.is_none());
        assert!(!ws.stage.has_resource_of_type(&ResourceType::ApiDeployment));

        assert_eq!(
            ws.stage.outputs["ApiGatewayRestApiRootResource"].export_name(),
            Some("testService-myStage-ApiGatewayRestApiRootResource")
        );
    }

    #[test]
    fn test_integration_uri_routes_through_alias() {
        let mut ctx = context("myAlias");
        let ws = run(&mut ctx, &DeployedSnapshots::default());

        let method = &ws.stage.resources["ApiGatewayMethodFunc1Get"];
        let parts = method.properties["Integration"]["Uri"]["Fn::Join"][1].as_array().unwrap();
        assert_eq!(parts[4], json!(ALIAS_PLACEHOLDER));
        assert_eq!(parts[5], json!("/invocations"));

        // A second run leaves the URI alone
        let mut again = Workspace::new(ws.stage.clone(), alias_template());
        ApiGatewayPass
            .apply(&mut context("myAlias"), &mut again, &DeployedSnapshots::default())
            .unwrap();
        assert_eq!(
            again.stage.resources["ApiGatewayMethodFunc1Get"].properties["Integration"]["Uri"],
            method.properties["Integration"]["Uri"]
        );
    }

    #[test]
    fn test_authorizers_are_alias_qualified() {
        let mut ctx = context("myAlias");
        let ws = run(&mut ctx, &DeployedSnapshots::default());

        assert!(!ws.stage.resources.contains_key("TestauthApiGatewayAuthorizer"));
        let authorizer = &ws.stage.resources["TestauthApiGatewayAuthorizermyAlias"];
        assert_eq!(authorizer.properties["Name"], json!("testauth-myAlias"));
        let parts = authorizer.properties["AuthorizerUri"]["Fn::Join"][1].as_array().unwrap();
        assert_eq!(parts[4], json!(ALIAS_PLACEHOLDER));

        let external = &ws.stage.resources["ExternalApiGatewayAuthorizermyAlias"];
        assert!(!external.properties["AuthorizerUri"]["Fn::Join"][1]
            .as_array()
            .unwrap()
            .contains(&json!(ALIAS_PLACEHOLDER)));

        let cognito = &ws.stage.resources["CognitoApiGatewayAuthorizermyAlias"];
        assert_eq!(cognito.properties["Name"], json!("cognito-myAlias"));
        assert_eq!(cognito.properties["ProviderARNs"], json!(["arn:pool"]));

        let method = &ws.stage.resources["ApiGatewayMethodFunc1Get"];
        assert_eq!(
            method.properties["AuthorizerId"],
            json!({"Ref": "TestauthApiGatewayAuthorizermyAlias"})
        );
        assert_eq!(method.dependencies(), vec!["TestauthApiGatewayAuthorizermyAlias"]);
    }

    #[test]
    fn test_user_overrides_merge_into_aliased_authorizer() {
        let mut ctx = context("myAlias");
        ctx.user_resources = template(json!({
            "Resources": {
                "TestauthApiGatewayAuthorizer": {
                    "Type": "AWS::ApiGateway::Authorizer",
                    "Properties": {"AuthorizerResultTtlInSeconds": 100}
                }
            }
        }));
        let ws = run(&mut ctx, &DeployedSnapshots::default());

        let authorizer = &ws.stage.resources["TestauthApiGatewayAuthorizermyAlias"];
        assert_eq!(authorizer.properties["AuthorizerResultTtlInSeconds"], json!(100));
        assert_eq!(authorizer.properties["Name"], json!("testauth-myAlias"));
        assert!(ctx.user_resources.resources.is_empty());
    }

    #[test]
    fn test_permissions_move_to_alias_stack() {
        let mut ctx = context("myAlias");
        let ws = run(&mut ctx, &DeployedSnapshots::default());

        let permission = &ws.alias.resources["Func1LambdaPermissionApiGateway"];
        assert_eq!(permission.properties["FunctionName"], json!({"Ref": "Func1Alias"}));
        assert_eq!(
            permission.properties["SourceArn"]["Fn::Join"][1][5],
            json!({"Fn::ImportValue": "testService-myStage-ApiGatewayRestApi"})
        );
        assert_eq!(permission.dependencies(), vec!["Func1LambdaVersionXyz", "Func1Alias"]);

        let external = &ws.alias.resources["ExternalLambdaPermissionApiGateway"];
        assert_eq!(
            external.properties["FunctionName"],
            json!("arn:aws:lambda:us-east-1:123:function:custom-auth")
        );
        assert!(external.depends_on.is_none());
        assert!(!ws.stage.has_resource_of_type(&ResourceType::LambdaPermission));
    }

    #[test]
    fn test_permission_of_unversioned_function_stays() {
        let mut stage = stage();
        stage.resources.insert(
            "TestauthLambdaPermissionApiGateway".to_string(),
            Resource::new(
                ResourceType::LambdaPermission,
                json!({
                    "FunctionName": {"Fn::GetAtt": ["TestauthLambdaFunction", "Arn"]},
                    "Action": "lambda:InvokeFunction",
                    "Principal": "apigateway.amazonaws.com",
                    "SourceArn": "arn:old"
                }),
            ),
        );
        let mut ctx = context("myAlias");
        let mut ws = Workspace::new(stage, alias_template());
        ApiGatewayPass
            .apply(&mut ctx, &mut ws, &DeployedSnapshots::default())
            .unwrap();

        assert!(!ws.alias.resources.contains_key("TestauthLambdaPermissionApiGateway"));
        let kept = &ws.stage.resources["TestauthLambdaPermissionApiGateway"];
        assert_eq!(
            kept.properties["FunctionName"],
            json!({"Fn::GetAtt": ["TestauthLambdaFunction", "Arn"]})
        );
        assert_eq!(kept.properties["SourceArn"], json!("arn:old"));
        assert!(ws.alias.resources.contains_key("Func1LambdaPermissionApiGateway"));
    }

    #[test]
    fn test_base_path_mapping_moves_with_stage() {
        let mut ctx = context("myAlias");
        let ws = run(&mut ctx, &DeployedSnapshots::default());
        assert!(!ws.stage.resources.contains_key("Pathmapping"));
        assert_eq!(
            ws.alias.resources["Pathmapping"].to_value(),
            json!({
                "Type": "AWS::ApiGateway::BasePathMapping",
                "Properties": {
                    "BasePath": "(none)",
                    "DomainName": "example.com",
                    "RestApiId": {"Fn::ImportValue": "testService-myStage-ApiGatewayRestApi"},
                    "Stage": {"Ref": "ApiGatewayStage"}
                }
            })
        );
    }

    #[test]
    fn test_stage_settings_reach_the_stage() {
        let mut ctx = context("myAlias");
        ctx.stage_settings = StageSettings {
            cache_cluster_enabled: Some(true),
            cache_cluster_size: Some(json!("0.5")),
            ..Default::default()
        };
        ctx.method_settings = vec![json!({
            "HttpMethod": "GET",
            "ResourcePath": "/~1func1",
            "LoggingLevel": "INFO"
        })];
        let ws = run(&mut ctx, &DeployedSnapshots::default());

        let stage = &ws.alias.resources["ApiGatewayStage"];
        assert_eq!(stage.properties["CacheClusterEnabled"], json!(true));
        assert_eq!(stage.properties["CacheClusterSize"], json!("0.5"));
        assert_eq!(stage.properties["MethodSettings"][0]["LoggingLevel"], json!("INFO"));
    }

    #[test]
    fn test_api_of_deployed_aliases_is_retained() {
        let deployed = DeployedSnapshots {
            stage: template(json!({
                "Resources": {
                    "ApiGatewayRestApi": {"Type": "AWS::ApiGateway::RestApi"},
                    "TestauthApiGatewayAuthorizerotherAlias": {"Type": "AWS::ApiGateway::Authorizer"}
                }
            })),
            siblings: vec![AliasSnapshot {
                stack_name: "testService-myStage-otherAlias".into(),
                template: template(json!({
                    "Resources": {"ApiGatewayDeployment9": {"Type": "AWS::ApiGateway::Deployment"}},
                    "Outputs": {"ServerlessAliasName": {"Value": "otherAlias"}}
                })),
            }],
            ..Default::default()
        };
        let mut ws = Workspace::new(template(json!({"Resources": {}})), template(json!({})));
        ApiGatewayPass
            .apply(&mut context("myAlias"), &mut ws, &deployed)
            .unwrap();

        assert!(ws.stage.resources.contains_key("ApiGatewayRestApi"));
        assert!(ws.stage.resources.contains_key("TestauthApiGatewayAuthorizerotherAlias"));
        assert!(ws.stage.outputs.contains_key("ApiGatewayRestApi"));
        assert!(!ws.alias.resources.contains_key("ApiGatewayStage"));
    }

    #[test]
    fn test_no_api_is_a_no_op() {
        let mut ws = Workspace::new(template(json!({"Resources": {}})), template(json!({})));
        ApiGatewayPass
            .apply(&mut context("myAlias"), &mut ws, &DeployedSnapshots::default())
            .unwrap();
        assert!(ws.stage.outputs.is_empty());
    }

    #[test]
    fn test_legacy_method_layout_is_rejected() {
        let deployed = DeployedSnapshots {
            current: template(json!({
                "Resources": {"ApiGatewayMethodGet": {"Type": "AWS::ApiGateway::Method"}}
            })),
            ..Default::default()
        };
        let mut ws = Workspace::new(stage(), alias_template());
        let err = ApiGatewayPass
            .apply(&mut context("myAlias"), &mut ws, &deployed)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PRECONDITION_INCOMPATIBLE_STACK);
    }
}
