//! Publishes the alias flags and restores stage dependencies that earlier
//! passes left dangling.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

use super::{PipelineContext, StackPass, Workspace};
use crate::error::Result;
use crate::naming;
use crate::snapshot::DeployedSnapshots;
use crate::template::{Output, Template};

const FLAGS_DESCRIPTION: &str = "Alias flags.";

/// Copy resources the stage template depends on from the live stage until no
/// dependency is missing. Returns the restored logical ids.
pub fn backfill_dependencies(stage: &mut Template, live: &Template) -> Vec<String> {
    let mut restored = Vec::new();
    loop {
        let missing: BTreeSet<String> = stage
            .resources
            .values()
            .flat_map(|r| r.dependencies())
            .filter(|d| !stage.resources.contains_key(*d) && live.resources.contains_key(*d))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            return restored;
        }
        for id in missing {
            if let Some(resource) = live.resources.get(&id) {
                debug!("Restoring dependency {}", id);
                stage.resources.insert(id.clone(), resource.clone());
                restored.push(id);
            }
        }
    }
}

pub struct FinalizePass;

impl StackPass for FinalizePass {
    fn name(&self) -> &'static str {
        "finalize"
    }

    fn apply(
        &self,
        ctx: &mut PipelineContext,
        workspace: &mut Workspace,
        deployed: &DeployedSnapshots,
    ) -> Result<()> {
        workspace.alias.outputs.insert(
            naming::ALIAS_FLAGS_OUTPUT.to_string(),
            Output::new(FLAGS_DESCRIPTION, Value::String(ctx.flags.to_wire())),
        );
        backfill_dependencies(&mut workspace.stage, &deployed.stage);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{context, empty_alias, template};
    use serde_json::json;

    #[test]
    fn test_flags_and_dependency_backfill() {
        let deployed = DeployedSnapshots {
            stage: template(json!({
                "Resources": {
                    "Queue": {"Type": "AWS::SQS::Queue", "DependsOn": "Key"},
                    "Key": {"Type": "AWS::KMS::Key"},
                    "Unrelated": {"Type": "AWS::SNS::Topic"}
                }
            })),
            ..Default::default()
        };
        let stage = template(json!({
            "Resources": {
                "Consumer": {"Type": "AWS::SQS::QueuePolicy", "DependsOn": ["Queue", "NotDeployed"]}
            }
        }));
        let mut ctx = context("myAlias");
        ctx.flags.has_role = true;
        let mut ws = Workspace::new(stage, empty_alias());

        FinalizePass.apply(&mut ctx, &mut ws, &deployed).unwrap();

        assert_eq!(ws.alias.outputs["AliasFlags"].value, json!(r#"{"hasRole":true}"#));
        assert!(ws.stage.resources.contains_key("Queue"));
        assert!(ws.stage.resources.contains_key("Key"));
        assert!(!ws.stage.resources.contains_key("Unrelated"));
        assert!(!ws.stage.resources.contains_key("NotDeployed"));
    }
}
