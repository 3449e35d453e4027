//! Shared fixtures for the deploy and removal integration tests
#![allow(dead_code)]

use cfn_alias::config::ServiceConfig;
use cfn_alias::deploy::{DeployOutcome, Deployer};
use cfn_alias::orchestrator::MemoryOrchestrator;
use cfn_alias::remove::{AliasRemover, RemovalOutcome, StackServiceRemoval};
use cfn_alias::template::{find_all_references, Template};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tempfile::TempDir;

pub const SERVICE: &str = "testService";
pub const STAGE: &str = "myStage";
pub const STACK: &str = "testService-myStage";

pub fn config(dir: &TempDir, alias: &str) -> ServiceConfig {
    let mut config = ServiceConfig::new(SERVICE, STAGE);
    config.alias = Some(alias.to_string());
    config.service_path = dir.path().to_path_buf();
    config
}

pub fn template(value: Value) -> Template {
    Template::from_value(value).unwrap()
}

fn role(extra_statements: Vec<Value>) -> Value {
    let mut statements = vec![json!({
        "Effect": "Allow",
        "Action": ["logs:CreateLogStream", "logs:PutLogEvents"],
        "Resource": [{"Fn::Sub": "arn:${AWS::Partition}:logs:${AWS::Region}:${AWS::AccountId}:log-group:/aws/lambda/testService-myStage*:*"}]
    })];
    statements.extend(extra_statements);
    json!({
        "Type": "AWS::IAM::Role",
        "Properties": {
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": {"Service": ["lambda.amazonaws.com"]},
                    "Action": ["sts:AssumeRole"]
                }]
            },
            "Policies": [{
                "PolicyName": {"Fn::Join": ["-", ["myStage", "testService", "lambda"]]},
                "PolicyDocument": {"Version": "2012-10-17", "Statement": statements}
            }],
            "RoleName": {"Fn::Join": ["-", ["testService", "myStage", {"Ref": "AWS::Region"}, "lambdaRole"]]}
        }
    })
}

/// Compiled stage template with one function and no events
pub fn compiled_value(extra_statements: Vec<Value>) -> Value {
    json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": "The AWS CloudFormation template for this Serverless application",
        "Resources": {
            "ServerlessDeploymentBucket": {"Type": "AWS::S3::Bucket"},
            "Testfct1LogGroup": {
                "Type": "AWS::Logs::LogGroup",
                "Properties": {"LogGroupName": "/aws/lambda/testService-myStage-testfct1"}
            },
            "IamRoleLambdaExecution": role(extra_statements),
            "Testfct1LambdaFunction": {
                "Type": "AWS::Lambda::Function",
                "Properties": {
                    "Code": {
                        "S3Bucket": {"Ref": "ServerlessDeploymentBucket"},
                        "S3Key": "serverless/testService/myStage/testService.zip"
                    },
                    "FunctionName": "testService-myStage-testfct1",
                    "Handler": "handler.testfct1",
                    "Runtime": "nodejs18.x",
                    "Description": "Test function",
                    "Role": {"Fn::GetAtt": ["IamRoleLambdaExecution", "Arn"]}
                },
                "DependsOn": ["Testfct1LogGroup", "IamRoleLambdaExecution"]
            },
            "Testfct1LambdaVersionAbc": {
                "Type": "AWS::Lambda::Version",
                "DeletionPolicy": "Retain",
                "Properties": {
                    "FunctionName": {"Ref": "Testfct1LambdaFunction"},
                    "CodeSha256": "abc"
                }
            }
        },
        "Outputs": {
            "ServerlessDeploymentBucketName": {"Value": {"Ref": "ServerlessDeploymentBucket"}},
            "Testfct1LambdaFunctionQualifiedArn": {
                "Description": "Current Lambda function version",
                "Value": {"Ref": "Testfct1LambdaVersionAbc"}
            }
        }
    })
}

pub fn compiled() -> Template {
    template(compiled_value(Vec::new()))
}

/// Compiled template exposing the function through a REST API
pub fn compiled_with_api() -> Template {
    let mut value = compiled_value(Vec::new());
    let resources = value["Resources"].as_object_mut().unwrap();
    resources.insert(
        "ApiGatewayRestApi".into(),
        json!({"Type": "AWS::ApiGateway::RestApi", "Properties": {"Name": "myStage-testService"}}),
    );
    resources.insert(
        "ApiGatewayResourceFunc1".into(),
        json!({
            "Type": "AWS::ApiGateway::Resource",
            "Properties": {
                "ParentId": {"Fn::GetAtt": ["ApiGatewayRestApi", "RootResourceId"]},
                "PathPart": "func1",
                "RestApiId": {"Ref": "ApiGatewayRestApi"}
            }
        }),
    );
    resources.insert(
        "ApiGatewayMethodFunc1Get".into(),
        json!({
            "Type": "AWS::ApiGateway::Method",
            "Properties": {
                "HttpMethod": "GET",
                "AuthorizationType": "NONE",
                "ResourceId": {"Ref": "ApiGatewayResourceFunc1"},
                "RestApiId": {"Ref": "ApiGatewayRestApi"},
                "Integration": {
                    "IntegrationHttpMethod": "POST",
                    "Type": "AWS_PROXY",
                    "Uri": {"Fn::Join": ["", [
                        "arn:",
                        {"Ref": "AWS::Partition"},
                        ":apigateway:",
                        {"Ref": "AWS::Region"},
                        ":lambda:path/2015-03-31/functions/",
                        {"Fn::GetAtt": ["Testfct1LambdaFunction", "Arn"]},
                        "/invocations"
                    ]]}
                }
            }
        }),
    );
    resources.insert(
        "ApiGatewayDeployment1500000000".into(),
        json!({
            "Type": "AWS::ApiGateway::Deployment",
            "Properties": {"RestApiId": {"Ref": "ApiGatewayRestApi"}, "StageName": "myStage"},
            "DependsOn": ["ApiGatewayMethodFunc1Get"]
        }),
    );
    resources.insert(
        "Testfct1LambdaPermissionApiGateway".into(),
        json!({
            "Type": "AWS::Lambda::Permission",
            "Properties": {
                "FunctionName": {"Fn::GetAtt": ["Testfct1LambdaFunction", "Arn"]},
                "Action": "lambda:InvokeFunction",
                "Principal": "apigateway.amazonaws.com",
                "SourceArn": {"Fn::Join": ["", [
                    "arn:aws:execute-api:",
                    {"Ref": "AWS::Region"},
                    ":",
                    {"Ref": "AWS::AccountId"},
                    ":",
                    {"Ref": "ApiGatewayRestApi"},
                    "/*/*"
                ]]}
            }
        }),
    );
    value["Outputs"].as_object_mut().unwrap().insert(
        "ServiceEndpoint".into(),
        json!({
            "Description": "URL of the service endpoint",
            "Value": {"Fn::Join": ["", [
                "https://",
                {"Ref": "ApiGatewayRestApi"},
                ".execute-api.",
                {"Ref": "AWS::Region"},
                ".",
                {"Ref": "AWS::URLSuffix"},
                "/myStage"
            ]]}
        }),
    );
    template(value)
}

pub async fn deploy(
    orchestrator: &MemoryOrchestrator,
    config: &ServiceConfig,
    compiled: Template,
    user_resources: Template,
) -> DeployOutcome {
    Deployer::new(orchestrator, config)
        .deploy(compiled, user_resources, false)
        .await
        .unwrap()
}

pub async fn remove(orchestrator: &MemoryOrchestrator, config: &ServiceConfig) -> RemovalOutcome {
    let removal = StackServiceRemoval::new(orchestrator, config.stack_name());
    AliasRemover::new(orchestrator, config, &removal)
        .remove_alias()
        .await
        .unwrap()
}

/// Deployed template of a stack held by the fake provider
pub async fn deployed(orchestrator: &MemoryOrchestrator, stack_name: &str) -> Template {
    template(orchestrator.template(stack_name).await.unwrap())
}

/// Every logical id referenced through `Ref`, `Fn::GetAtt` or `DependsOn`,
/// without pseudo parameters
pub fn referenced_ids(template: &Template) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for resource in template.resources.values() {
        ids.extend(find_all_references(&resource.properties).into_iter().map(|r| r.target));
        ids.extend(resource.dependencies().into_iter().map(str::to_string));
    }
    for output in template.outputs.values() {
        ids.extend(find_all_references(&output.value).into_iter().map(|r| r.target));
    }
    ids.retain(|id| !id.starts_with("AWS::"));
    ids
}

/// Names imported anywhere in a template
pub fn imported_names(value: &Value) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect_imports(value, &mut names);
    names
}

fn collect_imports(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    ("Fn::ImportValue", Value::String(name)) => {
                        names.insert(name.clone());
                    }
                    _ => collect_imports(child, names),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_imports(item, names)),
        _ => {}
    }
}
