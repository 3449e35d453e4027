//! Error types for the stack orchestrator layer

use thiserror::Error;

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The export does not exist or nothing imports it
    #[error("Export {0} not found")]
    ExportNotFound(String),

    #[error("Stack with id {0} does not exist")]
    StackNotFound(String),

    /// The submitted update would not change the stack
    #[error("No updates are to be performed on stack {0}")]
    NoUpdates(String),

    /// The provider rejected the request
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Stack {stack} ended in status {status}")]
    OperationFailed { stack: String, status: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrchestratorError {
    pub fn request<E: std::fmt::Display>(err: E) -> Self {
        Self::Request(err.to_string())
    }

    pub fn serialization<E: std::fmt::Display>(err: E) -> Self {
        Self::Serialization(err.to_string())
    }

    /// The soft failure an update reports when nothing changed
    pub fn is_no_updates(&self) -> bool {
        matches!(self, Self::NoUpdates(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StackNotFound(_) | Self::ExportNotFound(_))
    }
}
