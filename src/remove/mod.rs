//! Alias and service removal.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub mod changes;

pub use changes::{compute_stack_changes, StackChanges};

use crate::config::ServiceConfig;
use crate::deploy::STAGE_TAG;
use crate::error::{AliasError, Result};
use crate::naming;
use crate::orchestrator::{OperationKind, OrchestratorError, StackOrchestrator, StackRequest};
use crate::snapshot::{DeployedSnapshots, SnapshotLoader};

/// Removal of everything the deployment tool created for a stage
#[async_trait]
pub trait ServiceRemoval: Send + Sync {
    async fn trigger_service_removal(&self) -> Result<()>;
}

/// Deletes the stage stack and waits for it to go away
pub struct StackServiceRemoval<'a> {
    orchestrator: &'a dyn StackOrchestrator,
    stack_name: String,
}

impl<'a> StackServiceRemoval<'a> {
    pub fn new(orchestrator: &'a dyn StackOrchestrator, stack_name: impl Into<String>) -> Self {
        Self {
            orchestrator,
            stack_name: stack_name.into(),
        }
    }
}

#[async_trait]
impl ServiceRemoval for StackServiceRemoval<'_> {
    async fn trigger_service_removal(&self) -> Result<()> {
        info!("Removing stage stack {}", self.stack_name);
        let operation = self.orchestrator.delete_stack(&self.stack_name).await?;
        self.orchestrator
            .monitor_stack(OperationKind::Delete, &operation)
            .await?;
        Ok(())
    }
}

/// How a removal ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// An alias stack was deleted and the stage stack updated
    Alias(StackChanges),
    /// The master alias went and the service removal ran
    Service,
    /// `no_deploy` was set
    Skipped,
}

pub struct AliasRemover<'a> {
    orchestrator: &'a dyn StackOrchestrator,
    config: &'a ServiceConfig,
    service_removal: &'a dyn ServiceRemoval,
    no_deploy: bool,
}

impl<'a> AliasRemover<'a> {
    pub fn new(
        orchestrator: &'a dyn StackOrchestrator,
        config: &'a ServiceConfig,
        service_removal: &'a dyn ServiceRemoval,
    ) -> Self {
        Self {
            orchestrator,
            config,
            service_removal,
            no_deploy: false,
        }
    }

    pub fn with_no_deploy(mut self, no_deploy: bool) -> Self {
        self.no_deploy = no_deploy;
        self
    }

    /// Remove the configured alias. The stage alias can only go with the
    /// whole service.
    pub async fn remove_alias(&self) -> Result<RemovalOutcome> {
        let alias = self.config.alias();
        if self.config.is_stage_alias() {
            return Err(AliasError::cannot_remove_stage_alias(alias));
        }
        self.remove(alias).await
    }

    /// Remove the stage alias and with it the service
    pub async fn remove_service(&self) -> Result<RemovalOutcome> {
        self.remove(&self.config.stage).await
    }

    async fn remove(&self, alias: &str) -> Result<RemovalOutcome> {
        self.config.validate()?;
        if self.no_deploy {
            info!("noDeploy option active - will do nothing");
            return Ok(RemovalOutcome::Skipped);
        }

        let stack_name = self.config.stack_name();
        let deployed = SnapshotLoader::new(self.orchestrator, &stack_name)
            .load(alias)
            .await?;
        let master_alias = deployed
            .master_alias()
            .unwrap_or(&self.config.stage)
            .to_string();

        if alias == master_alias {
            self.remove_master(alias, &deployed).await?;
            return Ok(RemovalOutcome::Service);
        }

        info!("Removing alias {} ...", alias);
        let mut stage = deployed.stage.clone();
        let changes = compute_stack_changes(
            &mut stage,
            &deployed.siblings,
            &deployed.current,
            &stack_name,
            alias,
        )?;
        self.delete_alias_stack(alias).await?;

        let request = StackRequest::new(&stack_name, stage.to_json()?)
            .with_tags(self.stage_tags())
            .with_stack_policy(self.config.stack_policy_body());
        debug!("Apply changes for {}", stack_name);
        match self.orchestrator.update_stack(&request).await {
            Ok(operation) => {
                self.orchestrator
                    .monitor_stack(OperationKind::Update, &operation)
                    .await?
            }
            Err(e) if e.is_no_updates() => debug!("Stage stack {} is unchanged", stack_name),
            Err(e) => return Err(e.into()),
        }
        Ok(RemovalOutcome::Alias(changes))
    }

    async fn remove_master(&self, alias: &str, deployed: &DeployedSnapshots) -> Result<()> {
        let others = deployed.sibling_alias_names();
        if !others.is_empty() {
            return Err(AliasError::other_aliases_still_deployed(&others));
        }
        if deployed.current.is_empty() {
            return Err(AliasError::master_stack_missing(alias));
        }

        info!("Removing master alias and stage {} ...", alias);
        self.delete_alias_stack(alias).await?;
        // The alias stack stays deleted if this fails
        self.service_removal.trigger_service_removal().await
    }

    async fn delete_alias_stack(&self, alias: &str) -> Result<()> {
        let stack_name = naming::alias_stack_name(&self.config.stack_name(), alias);
        debug!("Removing CF stack {}", stack_name);
        let operation = match self.orchestrator.delete_stack(&stack_name).await {
            Ok(operation) => operation,
            Err(OrchestratorError::StackNotFound(_)) => {
                return Err(AliasError::alias_not_deployed(alias))
            }
            Err(e) => return Err(e.into()),
        };
        self.orchestrator
            .monitor_stack(OperationKind::Delete, &operation)
            .await?;
        Ok(())
    }

    fn stage_tags(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::from([(STAGE_TAG.to_string(), self.config.stage.clone())]);
        tags.extend(self.config.stack_tags.clone());
        tags
    }
}
