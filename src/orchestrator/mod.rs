//! Stack orchestrator abstraction.
//!
//! The pipeline never talks to the infrastructure provider directly. Everything
//! that reads deployed templates or applies new ones goes through
//! [`StackOrchestrator`], so the same flows run against CloudFormation, a
//! local state directory, or an in-memory fake in tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

pub mod error;
pub mod file;
pub mod memory;

#[cfg(feature = "aws")]
pub mod cloudformation;

pub use error::{OrchestratorError, OrchestratorResult};
pub use file::FileOrchestrator;
pub use memory::{MemoryOrchestrator, OrchestratorCall};

#[cfg(feature = "aws")]
pub use cloudformation::CloudFormationOrchestrator;

pub const CAPABILITY_IAM: &str = "CAPABILITY_IAM";
pub const CAPABILITY_NAMED_IAM: &str = "CAPABILITY_NAMED_IAM";

/// Which form of a deployed template to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateStage {
    /// As submitted, with intrinsic functions intact
    Original,
    /// After transforms were applied by the provider
    Processed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(kind)
    }
}

/// Handle for a stack operation that may still be running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub stack_name: String,
    pub stack_id: Option<String>,
}

impl PendingOperation {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            stack_id: None,
        }
    }

    /// Identifier to poll with; the id survives a deletion, the name does not
    pub fn poll_target(&self) -> &str {
        self.stack_id.as_deref().unwrap_or(&self.stack_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackRequest {
    pub stack_name: String,
    pub template_body: String,
    pub tags: BTreeMap<String, String>,
    pub capabilities: Vec<String>,
    pub stack_policy_body: Option<String>,
}

impl StackRequest {
    pub fn new(stack_name: impl Into<String>, template_body: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            template_body: template_body.into(),
            tags: BTreeMap::new(),
            capabilities: vec![CAPABILITY_IAM.to_string(), CAPABILITY_NAMED_IAM.to_string()],
            stack_policy_body: None,
        }
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_stack_policy(mut self, policy: Option<String>) -> Self {
        self.stack_policy_body = policy;
        self
    }
}

/// Operations the deploy and removal flows need from the provider
#[async_trait]
pub trait StackOrchestrator: Send + Sync {
    /// Fetch the template body of a deployed stack
    async fn get_template(&self, stack_name: &str, stage: TemplateStage) -> OrchestratorResult<String>;

    async fn stack_exists(&self, stack_name: &str) -> OrchestratorResult<bool>;

    async fn create_stack(&self, request: &StackRequest) -> OrchestratorResult<PendingOperation>;

    /// Fails with [`OrchestratorError::NoUpdates`] when nothing would change
    async fn update_stack(&self, request: &StackRequest) -> OrchestratorResult<PendingOperation>;

    async fn delete_stack(&self, stack_name: &str) -> OrchestratorResult<PendingOperation>;

    /// Wait until the operation reaches a terminal state
    async fn monitor_stack(
        &self,
        kind: OperationKind,
        operation: &PendingOperation,
    ) -> OrchestratorResult<()>;

    /// Names of the stacks importing an export
    async fn list_imports(&self, export_name: &str) -> OrchestratorResult<Vec<String>>;

    /// All exports of the account and region
    async fn list_exports(&self) -> OrchestratorResult<BTreeMap<String, String>>;
}
