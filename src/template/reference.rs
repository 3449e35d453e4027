//! The intrinsic reference forms the pipeline has to understand.

use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `{ "Ref": name }`
    Ref(String),
    /// `{ "Fn::GetAtt": [name, attribute] }` or `{ "Fn::GetAtt": "name.attribute" }`
    GetAtt { logical_id: String, attribute: String },
    /// `{ "Fn::ImportValue": export }` with a literal export name
    ImportValue(String),
}

impl Reference {
    /// Recognize a reference node. Anything else, including an import whose
    /// name is itself an expression, yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.len() != 1 {
            return None;
        }
        if let Some(target) = map.get("Ref") {
            return target.as_str().map(|s| Self::Ref(s.to_string()));
        }
        if let Some(target) = map.get("Fn::GetAtt") {
            return match target {
                Value::Array(parts) => {
                    let logical_id = parts.first()?.as_str()?.to_string();
                    let attribute = parts.get(1).and_then(Value::as_str).unwrap_or_default();
                    Some(Self::GetAtt {
                        logical_id,
                        attribute: attribute.to_string(),
                    })
                }
                Value::String(s) => {
                    let (logical_id, attribute) = s.split_once('.').unwrap_or((s.as_str(), ""));
                    Some(Self::GetAtt {
                        logical_id: logical_id.to_string(),
                        attribute: attribute.to_string(),
                    })
                }
                _ => None,
            };
        }
        if let Some(target) = map.get("Fn::ImportValue") {
            return target.as_str().map(|s| Self::ImportValue(s.to_string()));
        }
        None
    }

    /// Logical id a `Ref`/`GetAtt` points at. Imports have none.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Ref(name) => Some(name),
            Self::GetAtt { logical_id, .. } => Some(logical_id),
            Self::ImportValue(_) => None,
        }
    }

    /// `AWS::Region`, `AWS::AccountId` and friends
    pub fn is_pseudo_parameter(&self) -> bool {
        matches!(self, Self::Ref(name) if name.starts_with("AWS::"))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Ref(name) => ref_(name),
            Self::GetAtt {
                logical_id,
                attribute,
            } => get_att(logical_id, attribute),
            Self::ImportValue(name) => import_value(name),
        }
    }
}

pub fn ref_(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn import_value(export_name: &str) -> Value {
    json!({ "Fn::ImportValue": export_name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizes_all_forms() {
        assert_eq!(
            Reference::from_value(&json!({"Ref": "MyBucket"})),
            Some(Reference::Ref("MyBucket".into()))
        );
        assert_eq!(
            Reference::from_value(&json!({"Fn::GetAtt": ["MyTable", "StreamArn"]})),
            Some(Reference::GetAtt {
                logical_id: "MyTable".into(),
                attribute: "StreamArn".into()
            })
        );
        assert_eq!(
            Reference::from_value(&json!({"Fn::GetAtt": "MyTable.Arn"})),
            Some(Reference::GetAtt {
                logical_id: "MyTable".into(),
                attribute: "Arn".into()
            })
        );
        assert_eq!(
            Reference::from_value(&json!({"Fn::ImportValue": "svc-dev-X"})),
            Some(Reference::ImportValue("svc-dev-X".into()))
        );
    }

    #[test]
    fn test_ignores_non_references() {
        assert_eq!(Reference::from_value(&json!({"Ref": "A", "Other": 1})), None);
        assert_eq!(Reference::from_value(&json!({"Fn::Join": ["", []]})), None);
        assert_eq!(
            Reference::from_value(&json!({"Fn::ImportValue": {"Fn::Sub": "${A}"}})),
            None
        );
        assert_eq!(Reference::from_value(&json!("Ref")), None);
    }

    #[test]
    fn test_pseudo_parameters() {
        assert!(Reference::Ref("AWS::Region".into()).is_pseudo_parameter());
        assert!(!Reference::Ref("ApiGatewayRestApi".into()).is_pseudo_parameter());
    }

    #[test]
    fn test_to_value_round_trips_canonical_forms() {
        let value = get_att("Fn1LambdaVersionAbc", "Version");
        assert_eq!(Reference::from_value(&value).unwrap().to_value(), value);
    }
}
