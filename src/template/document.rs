//! Typed CloudFormation template document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::path::Path;

/// Resource type tags the pipeline treats specially
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceType {
    LambdaFunction,
    LambdaVersion,
    LambdaAlias,
    LambdaPermission,
    LambdaEventSourceMapping,
    IamRole,
    IamPolicy,
    LogGroup,
    RestApi,
    ApiDeployment,
    ApiStage,
    ApiMethod,
    ApiResource,
    ApiAuthorizer,
    ApiBasePathMapping,
    EventsRule,
    SnsTopic,
    SnsSubscription,
    S3Bucket,
    Other(String),
}

impl ResourceType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::LambdaFunction => "AWS::Lambda::Function",
            Self::LambdaVersion => "AWS::Lambda::Version",
            Self::LambdaAlias => "AWS::Lambda::Alias",
            Self::LambdaPermission => "AWS::Lambda::Permission",
            Self::LambdaEventSourceMapping => "AWS::Lambda::EventSourceMapping",
            Self::IamRole => "AWS::IAM::Role",
            Self::IamPolicy => "AWS::IAM::Policy",
            Self::LogGroup => "AWS::Logs::LogGroup",
            Self::RestApi => "AWS::ApiGateway::RestApi",
            Self::ApiDeployment => "AWS::ApiGateway::Deployment",
            Self::ApiStage => "AWS::ApiGateway::Stage",
            Self::ApiMethod => "AWS::ApiGateway::Method",
            Self::ApiResource => "AWS::ApiGateway::Resource",
            Self::ApiAuthorizer => "AWS::ApiGateway::Authorizer",
            Self::ApiBasePathMapping => "AWS::ApiGateway::BasePathMapping",
            Self::EventsRule => "AWS::Events::Rule",
            Self::SnsTopic => "AWS::SNS::Topic",
            Self::SnsSubscription => "AWS::SNS::Subscription",
            Self::S3Bucket => "AWS::S3::Bucket",
            Self::Other(tag) => tag,
        }
    }

    pub fn is_api_gateway(&self) -> bool {
        self.as_str().starts_with("AWS::ApiGateway::")
    }
}

impl From<String> for ResourceType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "AWS::Lambda::Function" => Self::LambdaFunction,
            "AWS::Lambda::Version" => Self::LambdaVersion,
            "AWS::Lambda::Alias" => Self::LambdaAlias,
            "AWS::Lambda::Permission" => Self::LambdaPermission,
            "AWS::Lambda::EventSourceMapping" => Self::LambdaEventSourceMapping,
            "AWS::IAM::Role" => Self::IamRole,
            "AWS::IAM::Policy" => Self::IamPolicy,
            "AWS::Logs::LogGroup" => Self::LogGroup,
            "AWS::ApiGateway::RestApi" => Self::RestApi,
            "AWS::ApiGateway::Deployment" => Self::ApiDeployment,
            "AWS::ApiGateway::Stage" => Self::ApiStage,
            "AWS::ApiGateway::Method" => Self::ApiMethod,
            "AWS::ApiGateway::Resource" => Self::ApiResource,
            "AWS::ApiGateway::Authorizer" => Self::ApiAuthorizer,
            "AWS::ApiGateway::BasePathMapping" => Self::ApiBasePathMapping,
            "AWS::Events::Rule" => Self::EventsRule,
            "AWS::SNS::Topic" => Self::SnsTopic,
            "AWS::SNS::Subscription" => Self::SnsSubscription,
            "AWS::S3::Bucket" => Self::S3Bucket,
            _ => Self::Other(tag),
        }
    }
}

impl From<ResourceType> for String {
    fn from(kind: ResourceType) -> Self {
        match kind {
            ResourceType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `DependsOn` accepts a single logical id or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub kind: ResourceType,
    #[serde(default = "empty_object", skip_serializing_if = "is_empty_object")]
    pub properties: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty)
}

impl Resource {
    pub fn new(kind: ResourceType, properties: Value) -> Self {
        Self {
            kind,
            properties,
            depends_on: None,
            deletion_policy: None,
            extra: Map::new(),
        }
    }

    pub fn with_depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_dependencies(names);
        self
    }

    pub fn is(&self, kind: &ResourceType) -> bool {
        &self.kind == kind
    }

    pub fn property(&self, path: &str) -> Option<&Value> {
        Path::parse(path).ok()?.get(&self.properties)
    }

    pub fn property_str(&self, path: &str) -> Option<&str> {
        self.property(path).and_then(Value::as_str)
    }

    /// Logical ids this resource depends on, in declaration order
    pub fn dependencies(&self) -> Vec<&str> {
        match &self.depends_on {
            None => Vec::new(),
            Some(DependsOn::One(name)) => vec![name.as_str()],
            Some(DependsOn::Many(names)) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn depends_on_name(&self, name: &str) -> bool {
        self.dependencies().contains(&name)
    }

    /// Replace the dependency list. An empty list drops `DependsOn`.
    pub fn set_dependencies<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.depends_on = if names.is_empty() {
            None
        } else {
            Some(DependsOn::Many(names))
        };
    }

    /// Append a dependency unless it is already present
    pub fn add_dependency(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self.depends_on.take() {
            None => self.depends_on = Some(DependsOn::Many(vec![name])),
            Some(DependsOn::One(existing)) => {
                let mut names = vec![existing];
                if !names.contains(&name) {
                    names.push(name);
                }
                self.depends_on = Some(DependsOn::Many(names));
            }
            Some(DependsOn::Many(mut names)) => {
                if !names.contains(&name) {
                    names.push(name);
                }
                self.depends_on = Some(DependsOn::Many(names));
            }
        }
    }

    /// Remove a dependency; an emptied list drops `DependsOn`
    pub fn remove_dependency(&mut self, name: &str) {
        self.depends_on = match self.depends_on.take() {
            Some(DependsOn::One(existing)) if existing == name => None,
            Some(DependsOn::Many(mut names)) => {
                names.retain(|n| n != name);
                (!names.is_empty()).then_some(DependsOn::Many(names))
            }
            other => other,
        };
    }

    /// Point a dependency at a new logical id. A single id is replaced in
    /// place; in a list the old id is removed and the new one appended.
    pub fn rename_dependency(&mut self, old: &str, new: &str) {
        match &mut self.depends_on {
            Some(DependsOn::One(existing)) if existing == old => *existing = new.to_string(),
            Some(DependsOn::Many(names)) if names.iter().any(|n| n == old) => {
                names.retain(|n| n != old);
                if !names.iter().any(|n| n == new) {
                    names.push(new.to_string());
                }
            }
            _ => {}
        }
    }

    /// Whole resource as a JSON tree
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Export {
    pub name: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Output {
    pub fn new(description: impl Into<String>, value: Value) -> Self {
        Self {
            description: Some(description.into()),
            value,
            export: None,
            extra: Map::new(),
        }
    }

    pub fn exported_as(mut self, export_name: impl Into<String>) -> Self {
        self.export = Some(Export {
            name: Value::String(export_name.into()),
        });
        self
    }

    /// Literal export name, if the export is not an expression
    pub fn export_name(&self) -> Option<&str> {
        self.export.as_ref().and_then(|e| e.name.as_str())
    }

    pub fn value_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(
        rename = "AWSTemplateFormatVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub format_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, Resource>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Output>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Template {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Compact body submitted to the orchestrator
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn resource_mut(&mut self, logical_id: &str) -> Option<&mut Resource> {
        self.resources.get_mut(logical_id)
    }

    /// Resources of one type, ordered by logical id
    pub fn resources_of_type(&self, kind: &ResourceType) -> BTreeMap<&str, &Resource> {
        self.resources
            .iter()
            .filter(|(_, r)| r.is(kind))
            .map(|(name, r)| (name.as_str(), r))
            .collect()
    }

    pub fn ids_of_type(&self, kind: &ResourceType) -> Vec<String> {
        self.resources
            .iter()
            .filter(|(_, r)| r.is(kind))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn has_resource_of_type(&self, kind: &ResourceType) -> bool {
        self.resources.values().any(|r| r.is(kind))
    }

    /// Remove and return all resources of one type
    pub fn take_resources_of_type(&mut self, kind: &ResourceType) -> BTreeMap<String, Resource> {
        let (taken, kept) = std::mem::take(&mut self.resources)
            .into_iter()
            .partition(|(_, r)| r.is(kind));
        self.resources = kept;
        taken
    }

    /// Insert a resource unless the logical id is taken
    pub fn add_resource_if_absent(&mut self, logical_id: impl Into<String>, resource: Resource) -> bool {
        let mut inserted = false;
        self.resources.entry(logical_id.into()).or_insert_with(|| {
            inserted = true;
            resource
        });
        inserted
    }

    pub fn add_output_if_absent(&mut self, logical_id: impl Into<String>, output: Output) -> bool {
        let mut inserted = false;
        self.outputs.entry(logical_id.into()).or_insert_with(|| {
            inserted = true;
            output
        });
        inserted
    }

    /// Default-merge: entries already present win
    pub fn merge_defaults(
        &mut self,
        resources: impl IntoIterator<Item = (String, Resource)>,
        outputs: impl IntoIterator<Item = (String, Output)>,
    ) {
        for (name, resource) in resources {
            self.resources.entry(name).or_insert(resource);
        }
        for (name, output) in outputs {
            self.outputs.entry(name).or_insert(output);
        }
    }

    /// Export names published by this document
    pub fn export_names(&self) -> Vec<&str> {
        self.outputs.values().filter_map(Output::export_name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_and_preserves_unknown_sections() {
        let body = json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": "The AWS CloudFormation template for this Serverless application",
            "Conditions": {"IsProd": {"Fn::Equals": ["a", "b"]}},
            "Resources": {
                "Bucket": {"Type": "AWS::S3::Bucket", "Condition": "IsProd"},
                "Custom": {"Type": "Custom::Thing", "Properties": {"A": 1}, "DependsOn": "Bucket"}
            },
            "Outputs": {}
        });
        let template = Template::from_value(body.clone()).unwrap();
        assert_eq!(template.resources["Bucket"].kind, ResourceType::S3Bucket);
        assert_eq!(template.resources["Custom"].kind, ResourceType::Other("Custom::Thing".into()));
        assert_eq!(template.resources["Custom"].dependencies(), vec!["Bucket"]);
        assert_eq!(serde_json::to_value(&template).unwrap(), body);
    }

    #[test]
    fn test_take_resources_of_type() {
        let mut template = Template::default();
        template.resources.insert(
            "Fn1LambdaVersionX".into(),
            Resource::new(ResourceType::LambdaVersion, json!({})),
        );
        template.resources.insert(
            "Fn1LambdaFunction".into(),
            Resource::new(ResourceType::LambdaFunction, json!({})),
        );
        let versions = template.take_resources_of_type(&ResourceType::LambdaVersion);
        assert_eq!(versions.len(), 1);
        assert!(!template.has_resource_of_type(&ResourceType::LambdaVersion));
        assert!(template.resource("Fn1LambdaFunction").is_some());
    }

    #[test]
    fn test_dependency_editing() {
        let mut resource = Resource::new(ResourceType::ApiMethod, json!({}));
        resource.depends_on = Some(DependsOn::One("Auth".into()));
        resource.rename_dependency("Auth", "AuthmyAlias");
        assert_eq!(resource.depends_on, Some(DependsOn::One("AuthmyAlias".into())));

        resource.set_dependencies(["myDep1", "Auth", "myDep2"]);
        resource.rename_dependency("Auth", "AuthmyAlias");
        assert_eq!(resource.dependencies(), vec!["myDep1", "myDep2", "AuthmyAlias"]);

        resource.add_dependency("myDep1");
        assert_eq!(resource.dependencies().len(), 3);
        resource.remove_dependency("myDep1");
        resource.remove_dependency("myDep2");
        resource.remove_dependency("AuthmyAlias");
        assert!(resource.depends_on.is_none());
    }

    #[test]
    fn test_merge_defaults_keeps_existing_entries() {
        let mut template = Template::default();
        template.outputs.insert("A".into(), Output::new("mine", json!("1")));
        template.merge_defaults(
            Vec::new(),
            vec![
                ("A".to_string(), Output::new("theirs", json!("2"))),
                ("B".to_string(), Output::new("theirs", json!("3"))),
            ],
        );
        assert_eq!(template.outputs["A"].description.as_deref(), Some("mine"));
        assert_eq!(template.outputs["B"].value, json!("3"));
    }

    #[test]
    fn test_exported_output() {
        let output = Output::new("Function Arn", json!({"Ref": "X"})).exported_as("svc-dev-Fn1-LambdaFunctionArn");
        assert_eq!(output.export_name(), Some("svc-dev-Fn1-LambdaFunctionArn"));
        assert_eq!(
            output.to_value(),
            json!({
                "Description": "Function Arn",
                "Value": {"Ref": "X"},
                "Export": {"Name": "svc-dev-Fn1-LambdaFunctionArn"}
            })
        );
    }
}
