//! Hook Runner (§4.6): invokes one hook with prepared values and binding
//! context, applies whatever patches it emits, and signals re-reconciliation
//! when an event-driven binding moved the values checksum.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collaborators::{BindingContext, HookExecutor, HookInvocation};
use crate::errors::ReconcileError;
use crate::module::Binding;
use crate::values::{Scope, ValuesStore};

/// What happened to the values tree as a result of running a hook, and
/// whether that change should wake the event loop (§4.6 step 5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValuesDelta {
    Unchanged,
    /// Values moved but the binding is not event-driven — already inside a
    /// reconciliation, must not re-enter (§4.6 rationale).
    ChangedNoReconcile,
    ChangedGlobal,
    ChangedModule(String),
}

pub struct HookRunner {
    values: Arc<ValuesStore>,
    executor: Arc<dyn HookExecutor>,
    work_dir: PathBuf,
}

impl HookRunner {
    pub fn new(values: Arc<ValuesStore>, executor: Arc<dyn HookExecutor>, work_dir: PathBuf) -> Self {
        Self {
            values,
            executor,
            work_dir,
        }
    }

    /// `Run(hook, binding, bindingContexts, labels)` (§4.6).
    pub async fn run(
        &self,
        hook_path: &std::path::Path,
        hook_name: &str,
        binding: Binding,
        scope: Scope,
        contexts: Vec<serde_json::Value>,
        labels: HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<ValuesDelta, ReconcileError> {
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        let old = self
            .values
            .checksum(&scope)
            .map_err(|source| ReconcileError::PatchInvalid {
                scope: scope.label(),
                reason: source.to_string(),
            })?;

        let values_snapshot = match &scope {
            Scope::Global => self.values.global_values(),
            Scope::Module(name) => self.values.module_values(name),
        };
        let binding_context = BindingContext {
            binding,
            values: values_snapshot,
            contexts,
        };

        let invocation_dir = self.work_dir.join(hook_name);
        let patch_output_dir = invocation_dir.join("patches");
        let context_path = invocation_dir.join("binding-context.json");
        let invocation = HookInvocation {
            working_dir: invocation_dir,
            env: HashMap::new(),
            binding_context,
            binding_context_path: context_path,
            patch_output_dir,
            labels,
        };

        debug!(hook = hook_name, ?binding, "dispatching hook");
        let outcome = tokio::select! {
            result = self.executor.execute(hook_path, &invocation, cancel.clone()) => {
                result.map_err(|source| ReconcileError::PackageManagerError {
                    op: "HookExecutor::execute".into(),
                    release: hook_name.to_string(),
                    source,
                })?
            }
            _ = cancel.cancelled() => return Err(ReconcileError::Cancelled),
        };

        if outcome.exit_status != 0 {
            warn!(
                hook = hook_name,
                exit_status = outcome.exit_status,
                "hook exited non-zero"
            );
        }

        for patch_file in &outcome.patch_files {
            let patch = read_patch(patch_file).with_context(|| {
                format!("failed to read patch emitted by hook `{hook_name}`")
            })
            .map_err(|source| ReconcileError::PatchInvalid {
                scope: scope.label(),
                reason: source.to_string(),
            })?;
            self.values.apply_patch(scope.clone(), patch)?;
        }

        let new = self
            .values
            .checksum(&scope)
            .map_err(|source| ReconcileError::PatchInvalid {
                scope: scope.label(),
                reason: source.to_string(),
            })?;

        if new == old {
            return Ok(ValuesDelta::Unchanged);
        }

        if !binding.triggers_reconciliation() {
            return Ok(ValuesDelta::ChangedNoReconcile);
        }

        info!(hook = hook_name, ?binding, "hook moved values, triggering reconciliation");
        Ok(match scope {
            Scope::Global => ValuesDelta::ChangedGlobal,
            Scope::Module(name) => ValuesDelta::ChangedModule(name),
        })
    }
}

fn read_patch(path: &std::path::Path) -> anyhow::Result<json_patch::Patch> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read patch file {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("failed to parse patch file {}", path.display()))
}
