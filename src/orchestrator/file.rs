//! Directory-backed orchestrator.
//!
//! Keeps one `<stack>.json` per deployed stack in a state directory so the CLI
//! can run whole deploy/remove cycles offline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::{OrchestratorError, OrchestratorResult};
use super::memory::{MemoryOrchestrator, StackRecord};
use super::{OperationKind, PendingOperation, StackOrchestrator, StackRequest, TemplateStage};

/// On-disk form of a stack; the template is stored as a tree for readability
#[derive(Debug, Serialize, Deserialize)]
struct StoredStack {
    template: Value,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stack_policy: Option<Value>,
}

pub struct FileOrchestrator {
    dir: PathBuf,
    inner: MemoryOrchestrator,
}

impl FileOrchestrator {
    /// Load every stack stored in `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> OrchestratorResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut stacks = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stack_name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let stored: StoredStack = serde_json::from_slice(&tokio::fs::read(&path).await?)
                .map_err(OrchestratorError::serialization)?;
            stacks.insert(
                stack_name.to_string(),
                StackRecord {
                    template_body: stored.template.to_string(),
                    tags: stored.tags,
                    capabilities: stored.capabilities,
                    stack_policy_body: stored.stack_policy.map(|p| p.to_string()),
                },
            );
        }

        info!("Loaded {} stacks from {}", stacks.len(), dir.display());
        Ok(Self {
            dir,
            inner: MemoryOrchestrator::from_stacks(stacks),
        })
    }

    pub fn state_dir(&self) -> &Path {
        &self.dir
    }

    fn stack_path(&self, stack_name: &str) -> PathBuf {
        self.dir.join(format!("{stack_name}.json"))
    }

    async fn persist(&self, stack_name: &str) -> OrchestratorResult<()> {
        let path = self.stack_path(stack_name);
        match self.inner.stack(stack_name).await {
            Some(record) => {
                let stored = StoredStack {
                    template: serde_json::from_str(&record.template_body)
                        .map_err(OrchestratorError::serialization)?,
                    tags: record.tags,
                    capabilities: record.capabilities,
                    stack_policy: record
                        .stack_policy_body
                        .as_deref()
                        .map(serde_json::from_str::<Value>)
                        .transpose()
                        .map_err(OrchestratorError::serialization)?,
                };
                let body = serde_json::to_vec_pretty(&stored)
                    .map_err(OrchestratorError::serialization)?;
                tokio::fs::write(&path, body).await?;
                debug!("Wrote {}", path.display());
            }
            None => {
                if tokio::fs::try_exists(&path).await? {
                    tokio::fs::remove_file(&path).await?;
                    debug!("Removed {}", path.display());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StackOrchestrator for FileOrchestrator {
    async fn get_template(&self, stack_name: &str, stage: TemplateStage) -> OrchestratorResult<String> {
        self.inner.get_template(stack_name, stage).await
    }

    async fn stack_exists(&self, stack_name: &str) -> OrchestratorResult<bool> {
        self.inner.stack_exists(stack_name).await
    }

    async fn create_stack(&self, request: &StackRequest) -> OrchestratorResult<PendingOperation> {
        let operation = self.inner.create_stack(request).await?;
        self.persist(&request.stack_name).await?;
        Ok(operation)
    }

    async fn update_stack(&self, request: &StackRequest) -> OrchestratorResult<PendingOperation> {
        let operation = self.inner.update_stack(request).await?;
        self.persist(&request.stack_name).await?;
        Ok(operation)
    }

    async fn delete_stack(&self, stack_name: &str) -> OrchestratorResult<PendingOperation> {
        let operation = self.inner.delete_stack(stack_name).await?;
        self.persist(stack_name).await?;
        Ok(operation)
    }

    async fn monitor_stack(
        &self,
        kind: OperationKind,
        operation: &PendingOperation,
    ) -> OrchestratorResult<()> {
        self.inner.monitor_stack(kind, operation).await
    }

    async fn list_imports(&self, export_name: &str) -> OrchestratorResult<Vec<String>> {
        self.inner.list_imports(export_name).await
    }

    async fn list_exports(&self) -> OrchestratorResult<BTreeMap<String, String>> {
        self.inner.list_exports().await
    }
}
