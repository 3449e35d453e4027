//! Template restructuring pipeline.
//!
//! Each pass rewrites the stage and alias documents of a [`Workspace`] in
//! place, reading the deployed snapshots and recording what later passes need
//! in the [`PipelineContext`]. Passes run strictly in order: every pass relies
//! on the relocations and renames of the ones before it.

use std::fmt;
use tracing::{debug, info};

pub mod api_gateway;
pub mod context;
pub mod cw_events;
pub mod deferred;
pub mod events;
pub mod finalize;
pub mod functions;
pub mod init;
pub mod lambda_role;
pub mod s3_events;
pub mod sns_events;
pub mod user_resources;

pub use context::{parse_flags, AliasFlags, PipelineContext, Workspace};
pub use deferred::{DeferredOutputs, DeferredTarget};

use crate::error::Result;
use crate::snapshot::DeployedSnapshots;

/// One restructuring step
pub trait StackPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        deployed: &DeployedSnapshots,
    ) -> Result<()>;
}

pub struct Pipeline {
    passes: Vec<Box<dyn StackPass>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.passes.iter().map(|p| p.name()))
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl Pipeline {
    /// The full deploy sequence
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(init::InitPass),
            Box::new(user_resources::UserResourcesPass),
            Box::new(lambda_role::LambdaRolePass),
            Box::new(functions::FunctionsPass),
            Box::new(api_gateway::ApiGatewayPass),
            Box::new(events::StreamEventsPass),
            Box::new(cw_events::CloudWatchEventsPass),
            Box::new(sns_events::SnsEventsPass),
            Box::new(s3_events::S3EventsPass),
            Box::new(finalize::FinalizePass),
        ])
    }

    pub fn new(passes: Vec<Box<dyn StackPass>>) -> Self {
        Self { passes }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        deployed: &DeployedSnapshots,
    ) -> Result<()> {
        info!("Restructuring {} for alias {}", ctx.stack_name, ctx.alias);
        for pass in &self.passes {
            debug!("Running pass {}", pass.name());
            pass.apply(ctx, workspace, deployed)?;
        }
        debug!(
            "Stage template has {} resources, alias template has {}",
            workspace.stage.resources.len(),
            workspace.alias.resources.len()
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_pass_order() {
        assert_eq!(
            Pipeline::standard().pass_names(),
            vec![
                "init",
                "user-resources",
                "lambda-role",
                "functions",
                "api-gateway",
                "stream-events",
                "cw-events",
                "sns-events",
                "s3-events",
                "finalize",
            ]
        );
    }
}
