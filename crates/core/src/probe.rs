//! `ScriptProbe` (§4.3): the concrete `EnableProbe` for catalog modules that
//! declare an `enable_probe` script. Reuses the same `HookExecutor` seam the
//! Hook Runner shells out through — a probe is just a zero-patch hook run
//! whose exit code, not its emitted patches, is the answer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::collaborators::{BindingContext, HookExecutor, HookInvocation};
use crate::module::Binding;
use crate::resolver::{AlwaysEnabled, EnableProbe};

/// Builds the `EnableProbe` for a given module name: `ScriptProbe` when the
/// catalog entry declares an `enable_probe` path, `AlwaysEnabled` otherwise.
/// This is the `probes: &dyn Fn(&str) -> Arc<dyn EnableProbe>` the resolver
/// expects.
pub struct ProbeBuilder {
    catalog: Arc<Catalog>,
    executor: Arc<dyn HookExecutor>,
    work_dir: PathBuf,
}

impl ProbeBuilder {
    pub fn new(catalog: Arc<Catalog>, executor: Arc<dyn HookExecutor>, work_dir: PathBuf) -> Self {
        Self {
            catalog,
            executor,
            work_dir,
        }
    }

    pub fn build(&self, module: &str) -> Arc<dyn EnableProbe> {
        match self.catalog.get(module).and_then(|m| m.enable_probe.clone()) {
            Some(probe_path) => Arc::new(ScriptProbe {
                probe_path,
                executor: self.executor.clone(),
                work_dir: self.work_dir.join(module).join("enable-probe"),
            }),
            None => Arc::new(AlwaysEnabled),
        }
    }

    /// Adapts to the `&dyn Fn(&str) -> Arc<dyn EnableProbe>` shape the
    /// resolver's `resolve` takes, without pinning callers to `ProbeBuilder`
    /// itself.
    pub fn as_fn(self: &Arc<Self>) -> impl Fn(&str) -> Arc<dyn EnableProbe> + '_ {
        move |module: &str| self.build(module)
    }
}

struct ScriptProbe {
    probe_path: PathBuf,
    executor: Arc<dyn HookExecutor>,
    work_dir: PathBuf,
}

#[async_trait]
impl EnableProbe for ScriptProbe {
    async fn probe(
        &self,
        module: &str,
        enabled_prefix: &[String],
        values: &serde_json::Value,
        cancel: CancellationToken,
    ) -> anyhow::Result<bool> {
        let mut env = HashMap::new();
        env.insert("MODULE_NAME".to_string(), module.to_string());
        env.insert(
            "ENABLED_PREFIX".to_string(),
            serde_json::to_string(enabled_prefix)?,
        );

        let context_path = self.work_dir.join("values.json");
        // Probes are not hooks and have no binding of their own; `OnStartup`
        // is a harmless placeholder since a probe script only reads `values`.
        let invocation = HookInvocation {
            working_dir: self.work_dir.clone(),
            env,
            binding_context: BindingContext {
                binding: Binding::OnStartup,
                values: values.clone(),
                contexts: Vec::new(),
            },
            binding_context_path: context_path,
            patch_output_dir: self.work_dir.join("patches"),
            labels: HashMap::new(),
        };

        let outcome = self
            .executor
            .execute(&self.probe_path, &invocation, cancel)
            .await?;
        Ok(outcome.exit_status == 0)
    }
}
