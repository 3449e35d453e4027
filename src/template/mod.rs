//! CloudFormation template model and the reference graph helpers every pass
//! builds on.

pub mod document;
pub mod graph;
pub mod merge;
pub mod path;
pub mod query;
pub mod reference;

pub use document::{DependsOn, Export, Output, Resource, ResourceType, Template};
pub use graph::{
    find_all_references, find_references, references, rename_references, FoundReference,
};
pub use merge::{deep_merge, is_match};
pub use path::{Path, Segment};
pub use query::{
    alias_name, function_logical_id, function_prefix, function_version_name,
    has_permission_principal, referenced_function,
};
pub use reference::{get_att, import_value, ref_, Reference};

/// Literal written over references to resources that no longer exist
pub const REMOVED_SENTINEL: &str = "REMOVED";
