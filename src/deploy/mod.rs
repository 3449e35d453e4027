//! Alias deployment.
//!
//! A deploy runs in two phases. [`Deployer::plan`] loads the deployed state
//! and restructures the compiled stage template into the stage and alias
//! documents without touching the provider. [`Deployer::commit`] applies the
//! stage stack, resolves deferred outputs against the fresh exports, writes
//! the alias template next to the service and applies the alias stack.

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

pub mod configure;

pub use configure::{alias_skeleton, configure_stage};

use crate::config::ServiceConfig;
use crate::error::{AliasError, Result};
use crate::orchestrator::{OperationKind, StackOrchestrator, StackRequest};
use crate::pipeline::{DeferredOutputs, Pipeline, PipelineContext, Workspace};
use crate::snapshot::SnapshotLoader;
use crate::template::Template;

pub const STAGE_TAG: &str = "STAGE";
pub const ALIAS_TAG: &str = "ALIAS";

/// Restructured documents ready to be applied
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub stage: Template,
    pub alias: Template,
    pub deferred: DeferredOutputs,
}

/// What happened to a stack during a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAction {
    Created,
    Updated,
    /// The provider reported nothing to change
    Unchanged,
    /// Not applied because of `no_deploy`
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub stage: StackAction,
    pub alias: StackAction,
    pub alias_template_path: PathBuf,
    /// Properties written from deferred outputs
    pub resolved_outputs: usize,
}

pub struct Deployer<'a> {
    orchestrator: &'a dyn StackOrchestrator,
    config: &'a ServiceConfig,
    pipeline: Pipeline,
}

impl<'a> Deployer<'a> {
    pub fn new(orchestrator: &'a dyn StackOrchestrator, config: &'a ServiceConfig) -> Self {
        Self {
            orchestrator,
            config,
            pipeline: Pipeline::standard(),
        }
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Plan and commit in one go
    pub async fn deploy(
        &self,
        compiled: Template,
        user_resources: Template,
        no_deploy: bool,
    ) -> Result<DeployOutcome> {
        let plan = self.plan(compiled, user_resources).await?;
        self.commit(plan, no_deploy).await
    }

    /// Restructure `compiled` for the configured alias.
    ///
    /// Nothing is written to the provider; a failing pass leaves the deployed
    /// state untouched.
    pub async fn plan(&self, compiled: Template, user_resources: Template) -> Result<DeployPlan> {
        self.config.validate()?;
        let stack_name = self.config.stack_name();
        let alias = self.config.alias();
        info!("Preparing alias {} of {}", alias, stack_name);

        let deployed = SnapshotLoader::new(self.orchestrator, &stack_name)
            .load(alias)
            .await?;
        let master_alias = deployed
            .master_alias()
            .unwrap_or(&self.config.stage)
            .to_string();

        let mut stage = compiled;
        configure_stage(&mut stage, &stack_name, &master_alias);
        let mut workspace = Workspace::new(stage, alias_skeleton(&stack_name, alias)?);

        let mut ctx = PipelineContext::new(self.config, user_resources, master_alias)?;
        self.pipeline.run(&mut ctx, &mut workspace, &deployed)?;

        Ok(DeployPlan {
            stage: workspace.stage,
            alias: workspace.alias,
            deferred: ctx.deferred,
        })
    }

    pub async fn commit(&self, plan: DeployPlan, no_deploy: bool) -> Result<DeployOutcome> {
        let DeployPlan {
            stage,
            mut alias,
            deferred,
        } = plan;
        let stack_name = self.config.stack_name();
        let alias_stack = self.config.alias_stack_name();

        if no_deploy {
            let create = !self.orchestrator.stack_exists(&alias_stack).await?;
            let path = self.write_alias_template(&alias, create).await?;
            info!("Skipping deployment, alias template written to {}", path.display());
            return Ok(DeployOutcome {
                stage: StackAction::Skipped,
                alias: StackAction::Skipped,
                alias_template_path: path,
                resolved_outputs: 0,
            });
        }

        info!("Updating stage stack {}", stack_name);
        let stage_request = StackRequest::new(&stack_name, stage.to_json()?)
            .with_tags(self.tags(false))
            .with_stack_policy(self.config.stack_policy_body());
        let stage_action = self.apply_stack(&stage_request).await?;

        let resolved_outputs = if deferred.is_empty() {
            0
        } else {
            debug!("Resolving deferred outputs");
            let exports = self.orchestrator.list_exports().await?;
            deferred.resolve(&mut alias, &exports)?
        };

        let create = !self.orchestrator.stack_exists(&alias_stack).await?;
        let path = self.write_alias_template(&alias, create).await?;

        info!("Updating alias stack {}", alias_stack);
        let alias_request =
            StackRequest::new(&alias_stack, alias.to_json()?).with_tags(self.tags(true));
        let alias_action = self.apply_stack(&alias_request).await?;

        Ok(DeployOutcome {
            stage: stage_action,
            alias: alias_action,
            alias_template_path: path,
            resolved_outputs,
        })
    }

    fn tags(&self, with_alias: bool) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::from([(STAGE_TAG.to_string(), self.config.stage.clone())]);
        if with_alias {
            tags.insert(ALIAS_TAG.to_string(), self.config.alias().to_string());
        }
        tags.extend(self.config.stack_tags.clone());
        tags
    }

    /// Create or update a stack and wait for it
    async fn apply_stack(&self, request: &StackRequest) -> Result<StackAction> {
        let exists = self.orchestrator.stack_exists(&request.stack_name).await?;
        let (kind, submitted) = if exists {
            (OperationKind::Update, self.orchestrator.update_stack(request).await)
        } else {
            (OperationKind::Create, self.orchestrator.create_stack(request).await)
        };
        let operation = match submitted {
            Ok(operation) => operation,
            Err(e) if e.is_no_updates() => {
                info!("Stack {} is up to date", request.stack_name);
                return Ok(StackAction::Unchanged);
            }
            Err(e) => {
                return Err(AliasError::from(e)
                    .with_context(format!("Could not {kind} stack {}", request.stack_name)))
            }
        };
        self.orchestrator.monitor_stack(kind, &operation).await?;
        Ok(match kind {
            OperationKind::Create => StackAction::Created,
            _ => StackAction::Updated,
        })
    }

    async fn write_alias_template(&self, alias: &Template, create: bool) -> Result<PathBuf> {
        let path = self.config.alias_template_path(create);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, alias.to_json_pretty()?).await?;
        debug!("Wrote alias template {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{MemoryOrchestrator, OrchestratorCall};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn compiled() -> Template {
        Template::from_value(json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Resources": {
                "Testfct1LambdaFunction": {
                    "Type": "AWS::Lambda::Function",
                    "Properties": {"FunctionName": "testService-myStage-testfct1"}
                },
                "Testfct1LambdaVersionAbc": {
                    "Type": "AWS::Lambda::Version",
                    "Properties": {"FunctionName": {"Ref": "Testfct1LambdaFunction"}}
                }
            },
            "Outputs": {}
        }))
        .unwrap()
    }

    fn config(dir: &TempDir, alias: &str) -> ServiceConfig {
        let mut config = ServiceConfig::new("testService", "myStage");
        config.alias = Some(alias.to_string());
        config.service_path = dir.path().to_path_buf();
        config.stack_tags.insert("team".into(), "platform".into());
        config
    }

    #[tokio::test]
    async fn test_first_deploy_creates_both_stacks() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "myAlias");
        let orchestrator = MemoryOrchestrator::new();

        let outcome = Deployer::new(&orchestrator, &config)
            .deploy(compiled(), Template::default(), false)
            .await
            .unwrap();

        assert_eq!(outcome.stage, StackAction::Created);
        assert_eq!(outcome.alias, StackAction::Created);
        assert!(outcome
            .alias_template_path
            .ends_with(".serverless/cloudformation-template-create-alias-stack.json"));
        assert!(outcome.alias_template_path.exists());

        let alias = orchestrator.stack("testService-myStage-myAlias").await.unwrap();
        assert_eq!(alias.tags["ALIAS"], "myAlias");
        assert_eq!(alias.tags["STAGE"], "myStage");
        assert_eq!(alias.tags["team"], "platform");
        let stage: Value = orchestrator.template("testService-myStage").await.unwrap();
        assert_eq!(stage["Outputs"]["MasterAliasName"]["Value"], json!("myStage"));
        assert!(stage["Resources"].get("Testfct1LambdaVersionAbc").is_none());
    }

    #[tokio::test]
    async fn test_redeploy_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "myAlias");
        let orchestrator = MemoryOrchestrator::new();
        let deployer = Deployer::new(&orchestrator, &config);

        deployer
            .deploy(compiled(), Template::default(), false)
            .await
            .unwrap();
        let outcome = deployer
            .deploy(compiled(), Template::default(), false)
            .await
            .unwrap();

        assert_eq!(outcome.stage, StackAction::Unchanged);
        assert_eq!(outcome.alias, StackAction::Unchanged);
        assert!(outcome
            .alias_template_path
            .ends_with("cloudformation-template-update-alias-stack.json"));
    }

    #[tokio::test]
    async fn test_no_deploy_only_writes_files() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "myAlias");
        let orchestrator = MemoryOrchestrator::new();

        let outcome = Deployer::new(&orchestrator, &config)
            .deploy(compiled(), Template::default(), true)
            .await
            .unwrap();

        assert_eq!(outcome.stage, StackAction::Skipped);
        assert!(outcome.alias_template_path.exists());
        assert!(orchestrator.stack_names().await.is_empty());
        assert!(!orchestrator
            .call_history()
            .await
            .iter()
            .any(|c| matches!(c, OrchestratorCall::Create(_) | OrchestratorCall::Update(_))));
    }

    #[tokio::test]
    async fn test_invalid_alias_fails_before_provider_calls() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "my.alias");
        let orchestrator = MemoryOrchestrator::new();

        let result = Deployer::new(&orchestrator, &config)
            .plan(compiled(), Template::default())
            .await;

        assert!(result.is_err());
        assert!(orchestrator.call_history().await.is_empty());
    }
}
