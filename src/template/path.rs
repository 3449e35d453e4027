//! Typed property paths into a template tree.
//!
//! A path is a sequence of field and index segments. It renders in the usual
//! dotted/bracket notation (`Properties.Targets[0].Arn`) and can be parsed back
//! from it. Lookups never create structure; [`Path::set`] only writes into an
//! existing parent, while [`Path::set_or_create`] builds missing objects on the
//! way down.

use serde_json::{Map, Value};
use std::fmt;

use crate::error::{AliasError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(Vec<Segment>);

impl Path {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.0.push(Segment::Field(name.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.0.push(Segment::Index(index));
        self
    }

    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// Concatenate two paths
    pub fn join(&self, other: &Path) -> Path {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// True if `prefix` is a leading part of this path
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Parse `a.b[2].c` notation. Field names may not contain `.` or `[`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = input;
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let end = after
                    .find(']')
                    .ok_or_else(|| AliasError::invalid_path(input, "unterminated index"))?;
                let index = after[..end]
                    .parse::<usize>()
                    .map_err(|e| AliasError::invalid_path(input, e))?;
                segments.push(Segment::Index(index));
                rest = &after[end + 1..];
            } else {
                let body = rest.strip_prefix('.').unwrap_or(rest);
                let end = body.find(['.', '[']).unwrap_or(body.len());
                if end == 0 {
                    return Err(AliasError::invalid_path(input, "empty field name"));
                }
                segments.push(Segment::Field(body[..end].to_string()));
                rest = &body[end..];
            }
        }
        Ok(Self(segments))
    }

    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(root, |node, segment| match segment {
            Segment::Field(name) => node.as_object()?.get(name),
            Segment::Index(i) => node.as_array()?.get(*i),
        })
    }

    pub fn get_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        self.0.iter().try_fold(root, |node, segment| match segment {
            Segment::Field(name) => node.as_object_mut()?.get_mut(name),
            Segment::Index(i) => node.as_array_mut()?.get_mut(*i),
        })
    }

    /// Replace the value at this path. The parent must already exist and have
    /// the shape the last segment expects.
    pub fn set(&self, root: &mut Value, value: Value) -> Result<()> {
        let Some((last, parent_segments)) = self.0.split_last() else {
            *root = value;
            return Ok(());
        };
        let parent = Path(parent_segments.to_vec());
        let node = parent
            .get_mut(root)
            .ok_or_else(|| AliasError::invalid_path(self, "parent does not exist"))?;
        match (last, node) {
            (Segment::Field(name), Value::Object(map)) => {
                map.insert(name.clone(), value);
                Ok(())
            }
            (Segment::Index(i), Value::Array(items)) if *i < items.len() => {
                items[*i] = value;
                Ok(())
            }
            (Segment::Index(i), Value::Array(_)) => {
                Err(AliasError::invalid_path(self, format!("index {i} out of bounds")))
            }
            (_, other) => Err(AliasError::invalid_path(
                self,
                format!("cannot descend into {}", kind_of(other)),
            )),
        }
    }

    /// Like [`Path::set`], but missing or null intermediate fields become
    /// empty objects.
    pub fn set_or_create(&self, root: &mut Value, value: Value) -> Result<()> {
        let mut node = root;
        let Some((last, parents)) = self.0.split_last() else {
            *node = value;
            return Ok(());
        };
        for segment in parents {
            node = match segment {
                Segment::Field(name) => {
                    if node.is_null() {
                        *node = Value::Object(Map::new());
                    }
                    let map = node.as_object_mut().ok_or_else(|| {
                        AliasError::invalid_path(self, format!("'{name}' is not inside an object"))
                    })?;
                    let child = map
                        .entry(name.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if child.is_null() {
                        *child = Value::Object(Map::new());
                    }
                    child
                }
                Segment::Index(i) => node
                    .as_array_mut()
                    .and_then(|items| items.get_mut(*i))
                    .ok_or_else(|| AliasError::invalid_path(self, format!("missing index {i}")))?,
            };
        }
        Path(vec![last.clone()]).set(node, value)
    }

    /// Remove the value at this path, returning it
    pub fn remove(&self, root: &mut Value) -> Option<Value> {
        let (last, parent_segments) = self.0.split_last()?;
        let parent = Path(parent_segments.to_vec()).get_mut(root)?;
        match (last, parent) {
            (Segment::Field(name), Value::Object(map)) => map.remove(name),
            (Segment::Index(i), Value::Array(items)) if *i < items.len() => Some(items.remove(*i)),
            _ => None,
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Field(name) if i == 0 => write!(f, "{name}")?,
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}
