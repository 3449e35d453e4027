//! # cfn-alias
//!
//! Splits a compiled serverless CloudFormation template into a stage stack
//! shared by every alias and one stack per alias, and removes aliases again
//! without disturbing the others.
//!
//! ## Modules
//!
//! - `config` - Service configuration (YAML file plus environment overrides)
//! - `deploy` - Stack skeletons, pipeline run and commit of both stacks
//! - `error` - Error type and error code registry
//! - `naming` - Logical id and stack naming conventions
//! - `orchestrator` - Stack provider abstraction with memory, file and CloudFormation backends
//! - `pipeline` - The ordered template restructuring passes
//! - `remove` - Alias removal and service removal
//! - `snapshot` - Loading the deployed stage and alias templates
//! - `template` - Typed template documents, paths and reference search
pub mod config;
pub mod deploy;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod pipeline;
pub mod remove;
pub mod snapshot;
pub mod template;

pub use error::{AliasError, ErrorCode, Result};
