//! In-memory stack orchestrator for tests and dry runs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::{OrchestratorError, OrchestratorResult};
use super::{OperationKind, PendingOperation, StackOrchestrator, StackRequest, TemplateStage};

/// A deployed stack as the fake provider keeps it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackRecord {
    pub template_body: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_policy_body: Option<String>,
}

impl StackRecord {
    fn from_request(request: &StackRequest) -> Self {
        Self {
            template_body: request.template_body.clone(),
            tags: request.tags.clone(),
            capabilities: request.capabilities.clone(),
            stack_policy_body: request.stack_policy_body.clone(),
        }
    }

    fn template(&self) -> Value {
        serde_json::from_str(&self.template_body).unwrap_or(Value::Null)
    }
}

/// Every call the orchestrator received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorCall {
    GetTemplate(String, TemplateStage),
    StackExists(String),
    Create(String),
    Update(String),
    Delete(String),
    Monitor(OperationKind, String),
    ListImports(String),
    ListExports,
}

#[derive(Clone, Default)]
pub struct MemoryOrchestrator {
    stacks: Arc<RwLock<BTreeMap<String, StackRecord>>>,
    seeded_exports: Arc<RwLock<BTreeMap<String, String>>>,
    call_history: Arc<RwLock<Vec<OrchestratorCall>>>,
}

impl MemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stacks(stacks: BTreeMap<String, StackRecord>) -> Self {
        Self {
            stacks: Arc::new(RwLock::new(stacks)),
            ..Self::default()
        }
    }

    /// Store a deployed stack directly, bypassing the call history
    pub async fn seed_stack(&self, stack_name: &str, template: &Value) {
        self.stacks.write().await.insert(
            stack_name.to_string(),
            StackRecord {
                template_body: template.to_string(),
                ..StackRecord::default()
            },
        );
    }

    /// Pin the value of an export, as a provider would after applying a stack
    pub async fn seed_export(&self, name: &str, value: &str) {
        self.seeded_exports
            .write()
            .await
            .insert(name.to_string(), value.to_string());
    }

    pub async fn stack(&self, stack_name: &str) -> Option<StackRecord> {
        self.stacks.read().await.get(stack_name).cloned()
    }

    pub async fn stack_names(&self) -> Vec<String> {
        self.stacks.read().await.keys().cloned().collect()
    }

    /// Parsed template of a stored stack
    pub async fn template(&self, stack_name: &str) -> Option<Value> {
        self.stack(stack_name).await.map(|s| s.template())
    }

    pub async fn snapshot(&self) -> BTreeMap<String, StackRecord> {
        self.stacks.read().await.clone()
    }

    pub async fn call_history(&self) -> Vec<OrchestratorCall> {
        self.call_history.read().await.clone()
    }

    pub async fn reset_history(&self) {
        self.call_history.write().await.clear();
    }

    async fn record(&self, call: OrchestratorCall) {
        debug!("Orchestrator call: {:?}", call);
        self.call_history.write().await.push(call);
    }

    async fn exports(&self) -> BTreeMap<String, String> {
        let mut exports = BTreeMap::new();
        for (stack_name, record) in self.stacks.read().await.iter() {
            let template = record.template();
            let Some(outputs) = template.get("Outputs").and_then(Value::as_object) else {
                continue;
            };
            for (output_id, output) in outputs {
                let Some(name) = output.pointer("/Export/Name").and_then(Value::as_str) else {
                    continue;
                };
                let value = match output.get("Value") {
                    Some(Value::String(literal)) => literal.clone(),
                    _ => format!("{stack_name}:{output_id}"),
                };
                exports.insert(name.to_string(), value);
            }
        }
        exports.extend(
            self.seeded_exports
                .read()
                .await
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        exports
    }

    async fn importers(&self, export_name: &str) -> Vec<String> {
        self.stacks
            .read()
            .await
            .iter()
            .filter(|(_, record)| {
                let mut imports = Vec::new();
                collect_imports(&record.template(), &mut imports);
                imports.iter().any(|i| i == export_name)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn collect_imports(value: &Value, imports: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    ("Fn::ImportValue", Value::String(name)) => imports.push(name.clone()),
                    _ => collect_imports(child, imports),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_imports(item, imports)),
        _ => {}
    }
}

#[async_trait]
impl StackOrchestrator for MemoryOrchestrator {
    async fn get_template(&self, stack_name: &str, stage: TemplateStage) -> OrchestratorResult<String> {
        self.record(OrchestratorCall::GetTemplate(stack_name.to_string(), stage))
            .await;
        self.stacks
            .read()
            .await
            .get(stack_name)
            .map(|record| record.template_body.clone())
            .ok_or_else(|| OrchestratorError::StackNotFound(stack_name.to_string()))
    }

    async fn stack_exists(&self, stack_name: &str) -> OrchestratorResult<bool> {
        self.record(OrchestratorCall::StackExists(stack_name.to_string()))
            .await;
        Ok(self.stacks.read().await.contains_key(stack_name))
    }

    async fn create_stack(&self, request: &StackRequest) -> OrchestratorResult<PendingOperation> {
        self.record(OrchestratorCall::Create(request.stack_name.clone()))
            .await;
        let mut stacks = self.stacks.write().await;
        if stacks.contains_key(&request.stack_name) {
            return Err(OrchestratorError::Request(format!(
                "Stack [{}] already exists",
                request.stack_name
            )));
        }
        stacks.insert(request.stack_name.clone(), StackRecord::from_request(request));
        Ok(PendingOperation::new(&request.stack_name))
    }

    async fn update_stack(&self, request: &StackRequest) -> OrchestratorResult<PendingOperation> {
        self.record(OrchestratorCall::Update(request.stack_name.clone()))
            .await;
        let mut stacks = self.stacks.write().await;
        let existing = stacks
            .get_mut(&request.stack_name)
            .ok_or_else(|| OrchestratorError::StackNotFound(request.stack_name.clone()))?;
        let record = StackRecord::from_request(request);
        if existing.template_body == record.template_body && existing.tags == record.tags {
            return Err(OrchestratorError::NoUpdates(request.stack_name.clone()));
        }
        *existing = record;
        Ok(PendingOperation::new(&request.stack_name))
    }

    async fn delete_stack(&self, stack_name: &str) -> OrchestratorResult<PendingOperation> {
        self.record(OrchestratorCall::Delete(stack_name.to_string()))
            .await;
        let Some(record) = self.stack(stack_name).await else {
            return Err(OrchestratorError::StackNotFound(stack_name.to_string()));
        };

        // Exports still imported elsewhere block the deletion
        let template = record.template();
        if let Some(outputs) = template.get("Outputs").and_then(Value::as_object) {
            for output in outputs.values() {
                let Some(export) = output.pointer("/Export/Name").and_then(Value::as_str) else {
                    continue;
                };
                let importers: Vec<String> = self
                    .importers(export)
                    .await
                    .into_iter()
                    .filter(|name| name != stack_name)
                    .collect();
                if !importers.is_empty() {
                    return Err(OrchestratorError::OperationFailed {
                        stack: stack_name.to_string(),
                        status: format!(
                            "DELETE_FAILED (export {export} is imported by {})",
                            importers.join(", ")
                        ),
                    });
                }
            }
        }

        self.stacks.write().await.remove(stack_name);
        Ok(PendingOperation::new(stack_name))
    }

    async fn monitor_stack(
        &self,
        kind: OperationKind,
        operation: &PendingOperation,
    ) -> OrchestratorResult<()> {
        self.record(OrchestratorCall::Monitor(kind, operation.stack_name.clone()))
            .await;
        Ok(())
    }

    async fn list_imports(&self, export_name: &str) -> OrchestratorResult<Vec<String>> {
        self.record(OrchestratorCall::ListImports(export_name.to_string()))
            .await;
        if !self.exports().await.contains_key(export_name) {
            return Err(OrchestratorError::ExportNotFound(export_name.to_string()));
        }
        Ok(self.importers(export_name).await)
    }

    async fn list_exports(&self) -> OrchestratorResult<BTreeMap<String, String>> {
        self.record(OrchestratorCall::ListExports).await;
        Ok(self.exports().await)
    }
}
