//! Values written into the alias template after the stage stack is applied.
//!
//! Some source ARNs change on every stage deployment and cannot be imported.
//! Passes register the export and the property that needs it; the deploy
//! resolves them against the live export list right before the alias stack
//! is submitted.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::template::{Path, Template};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredTarget {
    pub logical_id: String,
    /// Location inside the resource's `Properties`
    pub property: Path,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeferredOutputs {
    targets: BTreeMap<String, Vec<DeferredTarget>>,
}

impl DeferredOutputs {
    pub fn register(&mut self, export_name: impl Into<String>, logical_id: impl Into<String>, property: Path) {
        let export_name = export_name.into();
        let target = DeferredTarget {
            logical_id: logical_id.into(),
            property,
        };
        debug!(
            "Register deferred output {} -> {}.{}",
            export_name, target.logical_id, target.property
        );
        self.targets.entry(export_name).or_default().push(target);
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Write resolved export values into `alias`. Exports missing from
    /// `exports` are logged and leave their targets unchanged. Returns the
    /// number of written properties.
    pub fn resolve(&self, alias: &mut Template, exports: &BTreeMap<String, String>) -> Result<usize> {
        let mut written = 0;
        for (export_name, targets) in &self.targets {
            let Some(value) = exports.get(export_name) else {
                warn!("Output {} not found, deferred references keep their import", export_name);
                continue;
            };
            debug!("  {} -> {}", export_name, value);
            for target in targets {
                let Some(resource) = alias.resources.get_mut(&target.logical_id) else {
                    warn!("Deferred target {} is not part of the alias stack", target.logical_id);
                    continue;
                };
                target
                    .property
                    .set_or_create(&mut resource.properties, Value::String(value.clone()))?;
                written += 1;
            }
        }
        Ok(written)
    }
}
