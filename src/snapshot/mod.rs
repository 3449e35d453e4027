//! Loading the deployed state a deploy or removal reconciles against.
//!
//! The live stage template is fetched in processed form. Alias stacks are
//! discovered through the stacks importing `<stack>-ServerlessAliasReference`
//! and fetched in original form so their references stay visible.

use futures::future::{try_join, try_join_all};
use tracing::{debug, info};

use crate::error::{AliasError, Result};
use crate::naming;
use crate::orchestrator::{OrchestratorError, StackOrchestrator, TemplateStage};
use crate::template::Template;

/// A deployed alias stack
#[derive(Debug, Clone, PartialEq)]
pub struct AliasSnapshot {
    pub stack_name: String,
    pub template: Template,
}

impl AliasSnapshot {
    /// Alias recorded in the stack's `ServerlessAliasName` output
    pub fn alias_name(&self) -> Option<&str> {
        self.template
            .outputs
            .get(naming::ALIAS_NAME_OUTPUT)
            .and_then(|o| o.value_str())
    }

    fn is_alias(&self, stack_name: &str, alias: &str) -> bool {
        match self.alias_name() {
            Some(name) => name == alias,
            None => self.stack_name == naming::alias_stack_name(stack_name, alias),
        }
    }
}

/// Read-only view of what is currently deployed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployedSnapshots {
    /// Live stage template; empty before the first deploy
    pub stage: Template,
    /// Every other deployed alias
    pub siblings: Vec<AliasSnapshot>,
    /// Previous deployment of the alias being processed; empty if none
    pub current: Template,
}

impl DeployedSnapshots {
    /// Split loaded alias stacks into siblings and the one for `alias`
    pub fn partition(
        stack_name: &str,
        alias: &str,
        stage: Template,
        aliases: Vec<AliasSnapshot>,
    ) -> Self {
        let (current, siblings): (Vec<_>, Vec<_>) = aliases
            .into_iter()
            .partition(|snapshot| snapshot.is_alias(stack_name, alias));
        let current = current
            .into_iter()
            .next()
            .map(|snapshot| snapshot.template)
            .unwrap_or_default();
        Self {
            stage,
            siblings,
            current,
        }
    }

    pub fn sibling_alias_names(&self) -> Vec<String> {
        self.siblings
            .iter()
            .map(|s| s.alias_name().unwrap_or(&s.stack_name).to_string())
            .collect()
    }

    /// Master alias recorded by the live stage template
    pub fn master_alias(&self) -> Option<&str> {
        self.stage
            .outputs
            .get(naming::MASTER_ALIAS_OUTPUT)
            .and_then(|o| o.value_str())
    }

    /// Sibling templates followed by the current snapshot
    pub fn all_alias_templates(&self) -> impl Iterator<Item = &Template> {
        self.siblings
            .iter()
            .map(|s| &s.template)
            .chain(std::iter::once(&self.current))
    }
}

pub struct SnapshotLoader<'a> {
    orchestrator: &'a dyn StackOrchestrator,
    stack_name: &'a str,
}

impl<'a> SnapshotLoader<'a> {
    pub fn new(orchestrator: &'a dyn StackOrchestrator, stack_name: &'a str) -> Self {
        Self {
            orchestrator,
            stack_name,
        }
    }

    /// Load the stage template and all alias stacks, separating `alias`
    pub async fn load(&self, alias: &str) -> Result<DeployedSnapshots> {
        let (stage, aliases) = try_join(self.load_stage_template(), self.load_alias_templates()).await?;
        let snapshots = DeployedSnapshots::partition(self.stack_name, alias, stage, aliases);
        info!(
            "Loaded deployed state of {}: {} sibling aliases, current alias {}",
            self.stack_name,
            snapshots.siblings.len(),
            if snapshots.current.is_empty() { "not deployed" } else { "deployed" }
        );
        Ok(snapshots)
    }

    /// Live stage template; a missing stage stack is an empty template
    pub async fn load_stage_template(&self) -> Result<Template> {
        match self
            .orchestrator
            .get_template(self.stack_name, TemplateStage::Processed)
            .await
        {
            Ok(body) => parse_snapshot(self.stack_name, &body),
            Err(OrchestratorError::StackNotFound(_)) => {
                debug!("Stage stack {} is not deployed yet", self.stack_name);
                Ok(Template::default())
            }
            Err(e) => Err(AliasError::from(e)
                .with_context("Unable to retrieve current stack information")),
        }
    }

    /// Names of all deployed alias stacks
    pub async fn alias_stack_names(&self) -> Result<Vec<String>> {
        let export = naming::alias_reference_export(self.stack_name);
        match self.orchestrator.list_imports(&export).await {
            Ok(stacks) => Ok(stacks),
            Err(OrchestratorError::ExportNotFound(_)) => {
                debug!("No alias stacks import {}", export);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn load_alias_templates(&self) -> Result<Vec<AliasSnapshot>> {
        let stack_names = self.alias_stack_names().await?;
        try_join_all(stack_names.into_iter().map(|stack_name| async move {
            let body = self
                .orchestrator
                .get_template(&stack_name, TemplateStage::Original)
                .await?;
            let template = parse_snapshot(&stack_name, &body)?;
            Ok::<_, AliasError>(AliasSnapshot {
                stack_name,
                template,
            })
        }))
        .await
    }
}

impl SnapshotLoader<'_> {
    /// Names of all deployed aliases, sorted
    pub async fn deployed_aliases(&self) -> Result<Vec<String>> {
        let prefix = format!("{}-", self.stack_name);
        let mut aliases: Vec<String> = self
            .load_alias_templates()
            .await?
            .iter()
            .map(|snapshot| match snapshot.alias_name() {
                Some(name) => name.to_string(),
                None => snapshot
                    .stack_name
                    .strip_prefix(&prefix)
                    .unwrap_or(&snapshot.stack_name)
                    .to_string(),
            })
            .collect();
        aliases.sort();
        Ok(aliases)
    }
}

fn parse_snapshot(stack_name: &str, body: &str) -> Result<Template> {
    Template::parse(body).map_err(|e| AliasError::corrupt_snapshot(stack_name).with_source(e))
}
