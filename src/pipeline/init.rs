//! Seeds the alias flags and reads those of every sibling.

use tracing::debug;

use super::{AliasFlags, PipelineContext, StackPass, Workspace};
use crate::error::Result;
use crate::snapshot::DeployedSnapshots;

pub struct InitPass;

impl StackPass for InitPass {
    fn name(&self) -> &'static str {
        "init"
    }

    fn apply(
        &self,
        ctx: &mut PipelineContext,
        _workspace: &mut Workspace,
        deployed: &DeployedSnapshots,
    ) -> Result<()> {
        ctx.flags = AliasFlags::default();
        ctx.sibling_flags = deployed
            .siblings
            .iter()
            .map(|sibling| AliasFlags::of_template(&sibling.template))
            .collect();
        debug!("Sibling flags: {:?}", ctx.sibling_flags);
        Ok(())
    }
}
