use std::fmt::Display;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

use crate::orchestrator::OrchestratorError;

/// The unified error type for alias deployments and removals
#[derive(Error, Debug)]
pub enum AliasError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Template error: {message}")]
    Template {
        code: u16,
        message: String,
        logical_id: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Conflict: {message}")]
    Conflict {
        code: u16,
        message: String,
        logical_id: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Precondition {
        code: u16,
        message: String,
        alias: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Stack error: {message}")]
    Stack {
        code: u16,
        message: String,
        stack_name: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl AliasError {
    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::CONFIG_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a template error with specific code and logical id
    pub fn template_with_code(
        code: u16,
        message: impl Into<String>,
        logical_id: Option<String>,
    ) -> Self {
        Self::Template {
            code,
            message: message.into(),
            logical_id,
            source: None,
        }
    }

    /// Create a precondition failure with specific code and alias
    pub fn precondition_with_code(
        code: u16,
        message: impl Into<String>,
        alias: Option<String>,
    ) -> Self {
        Self::Precondition {
            code,
            message: message.into(),
            alias,
            source: None,
        }
    }

    /// Create a stack error with specific code and stack name
    pub fn stack_with_code(code: u16, message: impl Into<String>, stack_name: Option<String>) -> Self {
        Self::Stack {
            code,
            message: message.into(),
            stack_name,
            source: None,
        }
    }

    /// Create a generic other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_alias_character(alias: &str, character: char) -> Self {
        Self::precondition_with_code(
            ErrorCode::PRECONDITION_INVALID_ALIAS_CHARACTER,
            format!("Unsupported character '{character}' in alias name '{alias}'"),
            Some(alias.to_string()),
        )
    }

    pub fn invalid_stack_name(stack_name: &str) -> Self {
        Self::precondition_with_code(
            ErrorCode::PRECONDITION_INVALID_STACK_NAME,
            format!(
                "Invalid alias stack name '{stack_name}'. It must start with a letter, \
                 contain only alphanumerics and hyphens and be at most 128 characters long"
            ),
            None,
        )
    }

    pub fn corrupt_snapshot(stack_name: &str) -> Self {
        Self::template_with_code(
            ErrorCode::TEMPLATE_CORRUPT_SNAPSHOT,
            format!("Received malformed response from CloudFormation for stack {stack_name}"),
            None,
        )
    }

    pub fn resource_conflict(logical_id: &str, owner: &str) -> Self {
        Self::Conflict {
            code: ErrorCode::CONFLICT_RESOURCE,
            message: format!(
                "Resource {logical_id} is already deployed by alias {owner} with a different definition"
            ),
            logical_id: logical_id.to_string(),
            source: None,
        }
    }

    pub fn output_conflict(logical_id: &str, owner: &str) -> Self {
        Self::Conflict {
            code: ErrorCode::CONFLICT_OUTPUT,
            message: format!(
                "Output {logical_id} is already deployed by alias {owner} with a different definition"
            ),
            logical_id: logical_id.to_string(),
            source: None,
        }
    }

    pub fn unexpected_policy_shape(role: &str, count: usize) -> Self {
        Self::template_with_code(
            ErrorCode::TEMPLATE_UNEXPECTED_POLICY_SHAPE,
            format!("Policy count should be 1! Found {count} policies on {role}"),
            Some(role.to_string()),
        )
    }

    pub fn incompatible_stack(message: impl Into<String>) -> Self {
        Self::precondition_with_code(ErrorCode::PRECONDITION_INCOMPATIBLE_STACK, message, None)
    }

    pub fn other_aliases_still_deployed(aliases: &[String]) -> Self {
        Self::precondition_with_code(
            ErrorCode::PRECONDITION_OTHER_ALIASES_DEPLOYED,
            format!(
                "Remove the other deployed aliases before removing the service: {}",
                aliases.join(", ")
            ),
            None,
        )
    }

    pub fn master_stack_missing(alias: &str) -> Self {
        Self::precondition_with_code(
            ErrorCode::PRECONDITION_MASTER_STACK_MISSING,
            format!(
                "Internal error: Stack for master alias {alias} is not deployed. \
                 Try to solve the problem by manual interaction with the CloudFormation console."
            ),
            Some(alias.to_string()),
        )
    }

    pub fn cannot_remove_stage_alias(alias: &str) -> Self {
        Self::precondition_with_code(
            ErrorCode::PRECONDITION_CANNOT_REMOVE_STAGE_ALIAS,
            "Cannot delete the stage alias. Did you intend to remove the service instead?",
            Some(alias.to_string()),
        )
    }

    pub fn alias_not_deployed(alias: &str) -> Self {
        Self::precondition_with_code(
            ErrorCode::PRECONDITION_ALIAS_NOT_DEPLOYED,
            format!("Alias {alias} is not deployed."),
            Some(alias.to_string()),
        )
    }

    pub fn invalid_path(path: impl Display, reason: impl Display) -> Self {
        Self::template_with_code(
            ErrorCode::TEMPLATE_INVALID_PATH,
            format!("Cannot resolve property path '{path}': {reason}"),
            None,
        )
    }

    pub fn invalid_stage_config(message: impl Display) -> Self {
        Self::config_with_code(
            ErrorCode::CONFIG_INVALID_STAGE_SETTINGS,
            format!("Invalid stage config: {message}"),
        )
    }

    pub fn invalid_stage_value(key: &str, expected: &str) -> Self {
        Self::config_with_code(
            ErrorCode::CONFIG_INVALID_STAGE_SETTINGS,
            format!("Invalid value for {key}: expected {expected}"),
        )
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Template { source: src, .. }
            | Self::Conflict { source: src, .. }
            | Self::Precondition { source: src, .. }
            | Self::Stack { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::Template { message, .. }
            | Self::Conflict { message, .. }
            | Self::Precondition { message, .. }
            | Self::Stack { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
        }
        self
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Template { .. } => 3,
            Self::Conflict { .. } => 4,
            Self::Precondition { .. } => 5,
            Self::Stack { .. } => 6,
            Self::Other { .. } => 1,
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Template { code, .. }
            | Self::Conflict { code, .. }
            | Self::Precondition { code, .. }
            | Self::Stack { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, .. } => format!("Configuration problem: {}", message),
            Self::Template {
                message,
                logical_id,
                ..
            } => match logical_id {
                Some(id) => format!("Template error at {}: {}", id, message),
                None => format!("Template error: {}", message),
            },
            Self::Conflict { message, .. } => message.clone(),
            Self::Precondition { message, .. } => message.clone(),
            Self::Stack {
                message,
                stack_name,
                ..
            } => match stack_name {
                Some(name) => format!("Stack {} failed: {}", name, message),
                None => format!("Stack error: {}", message),
            },
            Self::Other { message, .. } => message.clone(),
        }
    }

    /// True when the orchestrator reported that an update changed nothing
    pub fn is_no_updates(&self) -> bool {
        self.code() == ErrorCode::STACK_NO_UPDATES
    }
}

/// Type alias for Results using AliasError
pub type Result<T> = std::result::Result<T, AliasError>;

impl From<std::io::Error> for AliasError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, message) = match err.kind() {
            ErrorKind::NotFound => (ErrorCode::CONFIG_NOT_FOUND, "File or directory not found"),
            _ => (ErrorCode::STACK_IO_ERROR, "IO operation failed"),
        };

        AliasError::config_with_code(code, message).with_source(err)
    }
}

impl From<serde_yaml::Error> for AliasError {
    fn from(err: serde_yaml::Error) -> Self {
        AliasError::config_with_code(ErrorCode::CONFIG_INVALID_YAML, "Invalid YAML syntax")
            .with_source(err)
    }
}

impl From<serde_json::Error> for AliasError {
    fn from(err: serde_json::Error) -> Self {
        AliasError::config_with_code(ErrorCode::CONFIG_INVALID_JSON, "Invalid JSON syntax")
            .with_source(err)
    }
}

impl From<OrchestratorError> for AliasError {
    fn from(err: OrchestratorError) -> Self {
        let (code, stack_name) = match &err {
            OrchestratorError::ExportNotFound(_) => (ErrorCode::STACK_EXPORT_NOT_FOUND, None),
            OrchestratorError::StackNotFound(name) => {
                (ErrorCode::STACK_NOT_FOUND, Some(name.clone()))
            }
            OrchestratorError::NoUpdates(name) => (ErrorCode::STACK_NO_UPDATES, Some(name.clone())),
            OrchestratorError::Request(_) => (ErrorCode::STACK_REQUEST_FAILED, None),
            OrchestratorError::OperationFailed { stack, .. } => {
                (ErrorCode::STACK_OPERATION_FAILED, Some(stack.clone()))
            }
            OrchestratorError::Io(_) | OrchestratorError::Serialization(_) => {
                (ErrorCode::STACK_IO_ERROR, None)
            }
        };
        let message = err.to_string();
        AliasError::stack_with_code(code, message, stack_name).with_source(err)
    }
}
