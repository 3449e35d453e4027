//! AWS CloudFormation orchestrator

use async_trait::async_trait;
use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::{Capability, OnFailure, Tag};
use aws_sdk_cloudformation::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::error::{OrchestratorError, OrchestratorResult};
use super::{OperationKind, PendingOperation, StackOrchestrator, StackRequest, TemplateStage};

const NO_UPDATES_MESSAGE: &str = "No updates are to be performed.";
const DOES_NOT_EXIST_MESSAGE: &str = "does not exist";

pub struct CloudFormationOrchestrator {
    client: Arc<Client>,
    poll_interval: Duration,
}

impl CloudFormationOrchestrator {
    pub async fn new(region: Option<&str>, poll_interval: Duration) -> Self {
        info!("Initializing CloudFormation orchestrator");

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let aws_config = loader.load().await;

        Self {
            client: Arc::new(Client::new(&aws_config)),
            poll_interval,
        }
    }

    fn tags(request: &StackRequest) -> OrchestratorResult<Vec<Tag>> {
        request
            .tags
            .iter()
            .map(|(key, value)| {
                Tag::builder()
                    .key(key)
                    .value(value)
                    .build()
                    .map_err(OrchestratorError::request)
            })
            .collect()
    }

    fn capabilities(request: &StackRequest) -> Vec<Capability> {
        request
            .capabilities
            .iter()
            .map(|c| Capability::from(c.as_str()))
            .collect()
    }

    async fn stack_status(&self, stack: &str) -> OrchestratorResult<Option<String>> {
        let output = self
            .client
            .describe_stacks()
            .stack_name(stack)
            .send()
            .await
            .map_err(|e| classify(stack, DisplayErrorContext(e).to_string()))?;
        Ok(output
            .stacks()
            .first()
            .and_then(|s| s.stack_status())
            .map(|status| status.as_str().to_string()))
    }
}

/// Translate provider error text into the orchestrator's soft cases
fn classify(stack: &str, message: String) -> OrchestratorError {
    if message.contains(NO_UPDATES_MESSAGE) {
        OrchestratorError::NoUpdates(stack.to_string())
    } else if message.contains(DOES_NOT_EXIST_MESSAGE) {
        OrchestratorError::StackNotFound(stack.to_string())
    } else {
        OrchestratorError::Request(message)
    }
}

fn is_failure(status: &str) -> bool {
    status.ends_with("_FAILED") || status.ends_with("ROLLBACK_COMPLETE")
}

fn is_success(kind: OperationKind, status: &str) -> bool {
    match kind {
        OperationKind::Create => status == "CREATE_COMPLETE",
        OperationKind::Update => status == "UPDATE_COMPLETE",
        OperationKind::Delete => status == "DELETE_COMPLETE",
    }
}

#[async_trait]
impl StackOrchestrator for CloudFormationOrchestrator {
    async fn get_template(&self, stack_name: &str, stage: TemplateStage) -> OrchestratorResult<String> {
        debug!("Fetching {:?} template of {}", stage, stack_name);
        let stage = match stage {
            TemplateStage::Original => aws_sdk_cloudformation::types::TemplateStage::Original,
            TemplateStage::Processed => aws_sdk_cloudformation::types::TemplateStage::Processed,
        };
        let output = self
            .client
            .get_template()
            .stack_name(stack_name)
            .template_stage(stage)
            .send()
            .await
            .map_err(|e| classify(stack_name, DisplayErrorContext(e).to_string()))?;
        Ok(output.template_body().unwrap_or_default().to_string())
    }

    async fn stack_exists(&self, stack_name: &str) -> OrchestratorResult<bool> {
        match self.stack_status(stack_name).await {
            Ok(status) => Ok(status.is_some_and(|s| s != "DELETE_COMPLETE")),
            Err(OrchestratorError::StackNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_stack(&self, request: &StackRequest) -> OrchestratorResult<PendingOperation> {
        info!("Creating stack {}", request.stack_name);
        let output = self
            .client
            .create_stack()
            .stack_name(&request.stack_name)
            .template_body(&request.template_body)
            .on_failure(OnFailure::Delete)
            .set_capabilities(Some(Self::capabilities(request)))
            .set_tags(Some(Self::tags(request)?))
            .set_stack_policy_body(request.stack_policy_body.clone())
            .send()
            .await
            .map_err(|e| classify(&request.stack_name, DisplayErrorContext(e).to_string()))?;
        Ok(PendingOperation {
            stack_name: request.stack_name.clone(),
            stack_id: output.stack_id().map(str::to_string),
        })
    }

    async fn update_stack(&self, request: &StackRequest) -> OrchestratorResult<PendingOperation> {
        info!("Updating stack {}", request.stack_name);
        let output = self
            .client
            .update_stack()
            .stack_name(&request.stack_name)
            .template_body(&request.template_body)
            .set_capabilities(Some(Self::capabilities(request)))
            .set_tags(Some(Self::tags(request)?))
            .set_stack_policy_body(request.stack_policy_body.clone())
            .send()
            .await
            .map_err(|e| classify(&request.stack_name, DisplayErrorContext(e).to_string()))?;
        Ok(PendingOperation {
            stack_name: request.stack_name.clone(),
            stack_id: output.stack_id().map(str::to_string),
        })
    }

    async fn delete_stack(&self, stack_name: &str) -> OrchestratorResult<PendingOperation> {
        info!("Deleting stack {}", stack_name);
        // Deleting an unknown stack succeeds silently, so look it up first
        let stack_id = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| classify(stack_name, DisplayErrorContext(e).to_string()))?
            .stacks()
            .first()
            .and_then(|s| s.stack_id())
            .map(str::to_string);

        self.client
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| classify(stack_name, DisplayErrorContext(e).to_string()))?;
        Ok(PendingOperation {
            stack_name: stack_name.to_string(),
            stack_id,
        })
    }

    async fn monitor_stack(
        &self,
        kind: OperationKind,
        operation: &PendingOperation,
    ) -> OrchestratorResult<()> {
        let target = operation.poll_target();
        loop {
            let status = match self.stack_status(target).await {
                Ok(status) => status,
                Err(OrchestratorError::StackNotFound(_)) if kind == OperationKind::Delete => {
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let Some(status) = status else {
                return Err(OrchestratorError::StackNotFound(operation.stack_name.clone()));
            };
            debug!("Stack {} is {}", operation.stack_name, status);

            if is_success(kind, &status) {
                info!("Stack {} {} finished", operation.stack_name, kind);
                return Ok(());
            }
            if is_failure(&status) {
                return Err(OrchestratorError::OperationFailed {
                    stack: operation.stack_name.clone(),
                    status,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn list_imports(&self, export_name: &str) -> OrchestratorResult<Vec<String>> {
        let mut imports = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_imports()
                .export_name(export_name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| {
                    let message = DisplayErrorContext(e).to_string();
                    if message.contains("is not imported by any stack")
                        || message.contains("not exported")
                        || message.contains(DOES_NOT_EXIST_MESSAGE)
                    {
                        OrchestratorError::ExportNotFound(export_name.to_string())
                    } else {
                        OrchestratorError::Request(message)
                    }
                })?;
            imports.extend(output.imports().iter().cloned());
            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(imports)
    }

    async fn list_exports(&self) -> OrchestratorResult<BTreeMap<String, String>> {
        let mut exports = BTreeMap::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_exports()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| OrchestratorError::Request(DisplayErrorContext(e).to_string()))?;
            for export in output.exports() {
                if let (Some(name), Some(value)) = (export.name(), export.value()) {
                    exports.insert(name.to_string(), value.to_string());
                }
            }
            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(exports)
    }
}
