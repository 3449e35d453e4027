//! Reference discovery over template trees.
//!
//! Both walks are iterative depth-first traversals. A match records the path
//! of the object that *contains* the `Ref`/`Fn::GetAtt` key, so callers can
//! replace the whole reference node with [`Path::set`].

use serde_json::Value;

use super::path::{Path, Segment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundReference {
    pub target: String,
    pub path: Path,
}

/// Paths of every reference node pointing at one of `names`
pub fn find_references<S: AsRef<str>>(root: &Value, names: &[S]) -> Vec<Path> {
    walk(root)
        .into_iter()
        .filter(|found| names.iter().any(|n| n.as_ref() == found.target))
        .map(|found| found.path)
        .collect()
}

/// Every reference node below `root`, regardless of its target
pub fn find_all_references(root: &Value) -> Vec<FoundReference> {
    walk(root)
}

/// True if anything below `root` references `name`
pub fn references(root: &Value, name: &str) -> bool {
    !find_references(root, &[name]).is_empty()
}

/// Point every `Ref`/`Fn::GetAtt` on `old` at `new`, keeping attributes.
/// Returns the number of rewritten nodes.
pub fn rename_references(root: &mut Value, old: &str, new: &str) -> usize {
    let mut renamed = 0;
    for path in find_references(root, &[old]) {
        let Some(Value::Object(node)) = path.get_mut(root) else {
            continue;
        };
        if let Some(target) = node.get_mut("Ref") {
            *target = Value::String(new.to_string());
            renamed += 1;
            continue;
        }
        match node.get_mut("Fn::GetAtt") {
            Some(Value::Array(parts)) if !parts.is_empty() => {
                parts[0] = Value::String(new.to_string());
                renamed += 1;
            }
            Some(Value::String(dotted)) => {
                let attribute = dotted.split_once('.').map(|(_, a)| a.to_string());
                *dotted = match attribute {
                    Some(attribute) => format!("{new}.{attribute}"),
                    None => new.to_string(),
                };
                renamed += 1;
            }
            _ => {}
        }
    }
    renamed
}

fn walk(root: &Value) -> Vec<FoundReference> {
    let mut found = Vec::new();
    let mut stack = vec![(Path::root(), root)];

    while let Some((path, node)) = stack.pop() {
        match node {
            Value::Object(map) => {
                for (key, value) in map {
                    match (key.as_str(), value) {
                        ("Ref", Value::String(target)) => found.push(FoundReference {
                            target: target.clone(),
                            path: path.clone(),
                        }),
                        ("Fn::GetAtt", Value::Array(parts)) => {
                            if let Some(target) = parts.first().and_then(Value::as_str) {
                                found.push(FoundReference {
                                    target: target.to_string(),
                                    path: path.clone(),
                                });
                            }
                        }
                        ("Fn::GetAtt", Value::String(dotted)) => found.push(FoundReference {
                            target: dotted.split('.').next().unwrap_or_default().to_string(),
                            path: path.clone(),
                        }),
                        (_, Value::Object(_) | Value::Array(_)) => {
                            stack.push((path.child(Segment::Field(key.clone())), value));
                        }
                        _ => {}
                    }
                }
            }
            Value::Array(items) => {
                for (i, value) in items.iter().enumerate() {
                    if value.is_object() || value.is_array() {
                        stack.push((path.child(Segment::Index(i)), value));
                    }
                }
            }
            _ => {}
        }
    }

    found
}
