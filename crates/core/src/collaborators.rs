//! Pluggable collaborators the core is built against (§6, §9 "deep
//! inheritance" note): the cluster config watcher, the package-manager
//! client, and the hook execution framework. The core only ever sees these
//! traits; concrete transports live outside this crate.

use async_trait::async_trait;
use modctl_common::TriState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::module::{Binding, ModuleHook};

/// One module's entry in the cluster config document (§6).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfigEntry {
    #[serde(default)]
    pub values: serde_json::Value,
    #[serde(default)]
    pub is_enabled: TriState,
    #[serde(default)]
    pub is_updated: bool,
}

/// The initial read from the config source: the full document, decomposed
/// into the global subtree and per-module sections.
#[derive(Clone, Debug, Default)]
pub struct InitialConfig {
    pub global_values: serde_json::Value,
    pub module_configs: HashMap<String, ModuleConfigEntry>,
}

/// A *full replace* delta: the entire document, same shape as `InitialConfig`.
#[derive(Clone, Debug, Default)]
pub struct FullConfig {
    pub global_values: serde_json::Value,
    pub module_configs: HashMap<String, ModuleConfigEntry>,
}

/// A *module sections changed* delta: a subset of `ModuleConfigs`.
#[derive(Clone, Debug, Default)]
pub struct ModuleSectionsDelta {
    pub module_configs: HashMap<String, ModuleConfigEntry>,
}

/// The external config-document watcher (§6). The core only reads the
/// initial snapshot here; the two delta streams are handed to the event
/// loop directly as channel endpoints (see `ConfigStreams`).
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn initial(&self, cancel: CancellationToken) -> anyhow::Result<InitialConfig>;
}

/// Release status as recognized by §6: `Failed` and `Superseded` are acted
/// on by the design-note policies in §9; everything else is opaque.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleaseStatus {
    Failed,
    Superseded,
    Deployed,
    Other(String),
    /// No revision on record, or an error shape indistinguishable from
    /// absence. Per §9's open question, absence is `(revision=0, Unknown)`;
    /// real errors are surfaced as `Err` from `history`, never folded in here.
    Unknown,
}

impl ReleaseStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "FAILED" => Self::Failed,
            "SUPERSEDED" => Self::Superseded,
            "DEPLOYED" => Self::Deployed,
            "" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Parameters for a package-manager upgrade (§6). Release identity is the
/// module name; storage uses per-revision records named `<release>.v<n>`,
/// which is the package manager's concern, not this crate's.
#[derive(Clone, Debug)]
pub struct UpgradeRequest {
    pub release: String,
    pub chart: PathBuf,
    pub value_files: Vec<PathBuf>,
    pub set_args: Vec<String>,
    pub namespace: String,
}

/// The external package-manager client (§6), treated as a black box. Every
/// method takes a cancellation token (§5): on shutdown the loop signals it
/// and discards the in-flight result rather than waiting the call out.
#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn list_release_names(&self, cancel: CancellationToken) -> anyhow::Result<Vec<String>>;
    async fn history(
        &self,
        release: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<(u64, ReleaseStatus)>;
    async fn upgrade(&self, request: &UpgradeRequest, cancel: CancellationToken) -> anyhow::Result<()>;
    async fn delete(&self, release: &str, cancel: CancellationToken) -> anyhow::Result<()>;
    async fn get_values(&self, release: &str, cancel: CancellationToken) -> anyhow::Result<serde_json::Value>;
}

/// §9's open question on revision bookkeeping: `DeleteSingleFailedRevision`
/// only purges when revision is exactly 1 and `FAILED`; `DeleteOldFailedRevisions`
/// always keeps the most recent `FAILED` record as operator evidence.
pub fn should_delete_single_failed_revision(revision: u64, status: &ReleaseStatus) -> bool {
    revision == 1 && matches!(status, ReleaseStatus::Failed)
}

/// Given revisions in ascending order paired with their status, return the
/// revisions to delete under `DeleteOldFailedRevisions`'s "keep the last
/// FAILED record" policy.
pub fn old_failed_revisions_to_delete(revisions: &[(u64, ReleaseStatus)]) -> Vec<u64> {
    let last_failed = revisions
        .iter()
        .filter(|(_, status)| matches!(status, ReleaseStatus::Failed))
        .map(|(rev, _)| *rev)
        .max();
    revisions
        .iter()
        .filter(|(rev, status)| {
            matches!(status, ReleaseStatus::Failed) && Some(*rev) != last_failed
        })
        .map(|(rev, _)| *rev)
        .collect()
}

/// One binding-context document handed to a hook invocation: the binding it
/// fired for, the merged values for its scope, and any event payloads
/// (cluster-event objects, schedule ticks) the execution framework supplies.
#[derive(Clone, Debug, Serialize)]
pub struct BindingContext {
    pub binding: Binding,
    pub values: serde_json::Value,
    #[serde(default)]
    pub contexts: Vec<serde_json::Value>,
}

/// Everything the hook execution framework needs to spawn one hook (§6).
#[derive(Clone, Debug)]
pub struct HookInvocation {
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub binding_context: BindingContext,
    pub binding_context_path: PathBuf,
    pub patch_output_dir: PathBuf,
    pub labels: HashMap<String, String>,
}

/// What a hook run produced.
#[derive(Clone, Debug, Default)]
pub struct HookOutcome {
    pub exit_status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub patch_files: Vec<PathBuf>,
}

/// The external hook execution framework (§6): process spawn plus the
/// schedule/cluster-event subscription mechanisms, out of scope here.
#[async_trait]
pub trait HookExecutor: Send + Sync {
    async fn execute(
        &self,
        hook_path: &std::path::Path,
        invocation: &HookInvocation,
        cancel: CancellationToken,
    ) -> anyhow::Result<HookOutcome>;
}

/// On-disk hook discovery (§4.4 step 5, "register hooks for newly-effective
/// modules"). The mechanics of finding a module's hook scripts are out of
/// scope (§1); the core only needs the resulting `ModuleHook` records to
/// index.
#[async_trait]
pub trait HookDiscovery: Send + Sync {
    async fn discover_module_hooks(
        &self,
        module: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<ModuleHook>>;

    /// Global (non-module-scoped) hooks, scanned once at startup (§4.2).
    async fn discover_global_hooks(
        &self,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<crate::module::GlobalHook>>;
}
