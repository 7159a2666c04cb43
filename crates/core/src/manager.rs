//! `ModuleManager` (§4.7, §4.7.2, §9's "deep inheritance" replacement): the
//! single owning task that runs the event loop, plus the read-only and
//! hook-dispatch methods the outer operator calls directly.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::collaborators::{
    FullConfig, HookDiscovery, ModuleConfigEntry, ModuleSectionsDelta, PackageManager,
    UpgradeRequest,
};
use crate::config::{compute_enabled_by_config, update_after_removal};
use crate::discoverer::{ModulesState, StateDiscoverer};
use crate::errors::ReconcileError;
use crate::events::{ChangeType, Event, EventPublisher, ModuleChange};
use crate::hook_runner::{HookRunner, ValuesDelta};
use crate::hooks::HookRegistry;
use crate::module::{Binding, GlobalHook, ModuleHook};
use crate::probe::ProbeBuilder;
use crate::resolver::EnablementResolver;
use crate::values::{Scope, ValuesStore};

/// Signals accumulated between loop iterations by `Hook Runner` results
/// (§4.6 step 5): coalesced so a burst of event-driven hook runs produces at
/// most one drain per wakeup, matching the depth-1 channel policy in §5.
#[derive(Default)]
struct PendingSignals {
    global_changed: bool,
    module_changed: HashSet<String>,
}

/// Mutated only from within the event-loop task (`run`) or a hook-dispatch
/// method awaited directly by a caller — both paths take this lock for the
/// duration of the mutation, which is how §5's "single owning task" rule is
/// enforced without committing to a literal actor thread.
struct ReconcileState {
    enabled_by_config: Vec<String>,
    module_configs: HashMap<String, ModuleConfigEntry>,
    effective: Vec<String>,
    retry_buffer: Option<ModuleSectionsDelta>,
}

pub struct ModuleManager {
    catalog: Arc<Catalog>,
    values: Arc<ValuesStore>,
    resolver: EnablementResolver,
    probes: Arc<ProbeBuilder>,
    package_manager: Arc<dyn PackageManager>,
    hook_discovery: Arc<dyn HookDiscovery>,
    hook_runner: HookRunner,
    hooks: Mutex<HookRegistry>,
    state: Mutex<ReconcileState>,
    discoverer: Mutex<StateDiscoverer>,
    events: EventPublisher,
    signals: StdMutex<PendingSignals>,
    notify: Notify,
    modules_dir: PathBuf,
    global_hooks_dir: PathBuf,
    retry_tx: mpsc::Sender<()>,
}

/// Channel endpoints the outer operator holds to drive the loop and to
/// receive published events; returned alongside the manager by `new`.
pub struct ManagerHandles {
    pub config_replaced_tx: watch::Sender<Option<FullConfig>>,
    pub module_sections_tx: watch::Sender<Option<ModuleSectionsDelta>>,
    pub retry_tx: mpsc::Sender<()>,
    pub events_rx: mpsc::Receiver<Event>,
}

impl ModuleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<Catalog>,
        values: Arc<ValuesStore>,
        package_manager: Arc<dyn PackageManager>,
        hook_discovery: Arc<dyn HookDiscovery>,
        probes: Arc<ProbeBuilder>,
        hook_runner: HookRunner,
        modules_dir: PathBuf,
        global_hooks_dir: PathBuf,
        events_depth: usize,
    ) -> (Arc<Self>, ManagerHandles) {
        let resolver = EnablementResolver::new(catalog.clone(), values.clone());
        let discoverer = StateDiscoverer::new(
            catalog.clone(),
            EnablementResolver::new(catalog.clone(), values.clone()),
            package_manager.clone(),
        );

        let (events_tx, events_rx) = crate::events::channel(events_depth);
        let (config_replaced_tx, config_replaced_rx) = watch::channel(None);
        let (module_sections_tx, module_sections_rx) = watch::channel(None);
        let (retry_tx, retry_rx) = mpsc::channel(1);

        let manager = Arc::new(Self {
            catalog,
            values,
            resolver,
            probes,
            package_manager,
            hook_discovery,
            hook_runner,
            hooks: Mutex::new(HookRegistry::new()),
            state: Mutex::new(ReconcileState {
                enabled_by_config: Vec::new(),
                module_configs: HashMap::new(),
                effective: Vec::new(),
                retry_buffer: None,
            }),
            discoverer: Mutex::new(discoverer),
            events: EventPublisher::new(events_tx),
            signals: StdMutex::new(PendingSignals::default()),
            notify: Notify::new(),
            modules_dir,
            global_hooks_dir,
            retry_tx: retry_tx.clone(),
        });

        let loop_manager = manager.clone();
        tokio::spawn(async move {
            loop_manager
                .run(config_replaced_rx, module_sections_rx, retry_rx)
                .await;
        });

        (
            manager,
            ManagerHandles {
                config_replaced_tx,
                module_sections_tx,
                retry_tx,
                events_rx,
            },
        )
    }

    fn signal_global_changed(&self) {
        self.signals.lock().expect("signals lock poisoned").global_changed = true;
        self.notify.notify_one();
    }

    fn signal_module_changed(&self, module: String) {
        self.signals
            .lock()
            .expect("signals lock poisoned")
            .module_changed
            .insert(module);
        self.notify.notify_one();
    }

    fn apply_values_delta(&self, delta: ValuesDelta) {
        match delta {
            ValuesDelta::Unchanged | ValuesDelta::ChangedNoReconcile => {}
            ValuesDelta::ChangedGlobal => self.signal_global_changed(),
            ValuesDelta::ChangedModule(name) => self.signal_module_changed(name),
        }
    }

    /// The event loop (§4.7): a single consumer over the config streams, the
    /// retry channel, and the internal values-changed accumulator. Runs
    /// until `cancel` fires.
    pub async fn run(
        self: Arc<Self>,
        mut config_replaced_rx: watch::Receiver<Option<FullConfig>>,
        mut module_sections_rx: watch::Receiver<Option<ModuleSectionsDelta>>,
        mut retry_rx: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = self.notify.notified() => {
                    self.drain_pending_signals().await;
                }
                Ok(()) = config_replaced_rx.changed() => {
                    if let Some(cfg) = config_replaced_rx.borrow_and_update().clone() {
                        self.handle_config_replaced(cfg, CancellationToken::new()).await;
                    }
                }
                Ok(()) = module_sections_rx.changed() => {
                    if let Some(delta) = module_sections_rx.borrow_and_update().clone() {
                        self.handle_module_sections_changed(delta, CancellationToken::new()).await;
                    }
                }
                Some(()) = retry_rx.recv() => {
                    self.handle_retry(CancellationToken::new()).await;
                }
                else => break,
            }
        }
    }

    async fn drain_pending_signals(&self) {
        let (global_changed, module_changed) = {
            let mut signals = self.signals.lock().expect("signals lock poisoned");
            let global_changed = std::mem::take(&mut signals.global_changed);
            let module_changed = std::mem::take(&mut signals.module_changed);
            (global_changed, module_changed)
        };
        if global_changed {
            self.events.publish(Event::GlobalChanged);
        }
        if !module_changed.is_empty() {
            let changes = module_changed
                .into_iter()
                .map(|name| ModuleChange {
                    name,
                    change_type: ChangeType::Changed,
                })
                .collect();
            self.events.publish(Event::ModulesChanged(changes));
        }
    }

    async fn handle_config_replaced(&self, cfg: FullConfig, cancel: CancellationToken) {
        let (enabled_by_config, unknown) = compute_enabled_by_config(&self.catalog, &cfg.module_configs);
        for name in &unknown {
            warn!(module = %name, "cluster config references unknown module");
        }

        let probes = self.probes.clone();
        let resolve_fn = move |name: &str| probes.build(name);
        match self
            .resolver
            .resolve(&enabled_by_config, &resolve_fn, cancel)
            .await
        {
            Ok(effective) => {
                self.values.set_cluster_global(cfg.global_values.clone());
                for (name, entry) in &cfg.module_configs {
                    self.values.set_cluster_module(name, entry.values.clone());
                }
                let mut state = self.state.lock().await;
                state.enabled_by_config = enabled_by_config;
                state.module_configs = cfg.module_configs;
                state.effective = effective;
                state.retry_buffer = None;
                drop(state);
                info!("full config replace applied");
                self.events.publish(Event::GlobalChanged);
            }
            Err(err) => {
                warn!(error = %err, "enablement resolution failed on full config replace");
                self.events.publish(Event::AmbigousState);
            }
        }
    }

    /// §4.7.1, steps 1-7. Only reads/writes `state` long enough to snapshot
    /// or commit; the resolver call — the only suspension point — runs with
    /// no lock held (§5).
    async fn handle_module_sections_changed(&self, delta: ModuleSectionsDelta, cancel: CancellationToken) {
        let (previous_module_configs, previous_effective, candidate_configs) = {
            let state = self.state.lock().await;
            let mut candidate_configs = state.module_configs.clone();
            for (name, entry) in &delta.module_configs {
                candidate_configs.insert(name.clone(), entry.clone());
            }
            (state.module_configs.clone(), state.effective.clone(), candidate_configs)
        };

        let (candidate_enabled_by_config, unknown) =
            compute_enabled_by_config(&self.catalog, &candidate_configs);
        for name in &unknown {
            warn!(module = %name, "cluster config references unknown module");
        }
        let update_after_removal_set =
            update_after_removal(&self.catalog, &previous_module_configs, &delta.module_configs);

        let probes = self.probes.clone();
        let resolve_fn = move |name: &str| probes.build(name);
        let resolved = self
            .resolver
            .resolve(&candidate_enabled_by_config, &resolve_fn, cancel)
            .await;

        let new_effective = match resolved {
            Ok(effective) => effective,
            Err(err) => {
                warn!(error = %err, "enablement resolution failed on module sections change; buffering for retry");
                let mut state = self.state.lock().await;
                state.retry_buffer = Some(delta);
                drop(state);
                self.events.publish(Event::AmbigousState);
                return;
            }
        };

        for (name, entry) in &delta.module_configs {
            self.values.set_cluster_module(name, entry.values.clone());
        }

        {
            let mut state = self.state.lock().await;
            state.module_configs = candidate_configs.clone();
            state.enabled_by_config = candidate_enabled_by_config;
            state.effective = new_effective.clone();
            state.retry_buffer = None;
        }

        if new_effective != previous_effective {
            info!("effective enabled set changed on module sections change");
            self.events.publish(Event::GlobalChanged);
            return;
        }

        let changes: Vec<ModuleChange> = new_effective
            .iter()
            .filter(|name| {
                let updated = candidate_configs
                    .get(name.as_str())
                    .map(|entry| entry.is_updated)
                    .unwrap_or(false);
                updated || update_after_removal_set.contains(name.as_str())
            })
            .map(|name| ModuleChange {
                name: name.clone(),
                change_type: ChangeType::Changed,
            })
            .collect();

        if !changes.is_empty() {
            self.events.publish(Event::ModulesChanged(changes));
        }
    }

    async fn handle_retry(&self, cancel: CancellationToken) {
        let pending = {
            let state = self.state.lock().await;
            state.retry_buffer.clone()
        };
        if let Some(delta) = pending {
            self.handle_module_sections_changed(delta, cancel).await;
        }
    }

    // ---- Public API (§4.7.2) ----

    pub async fn get_module(&self, name: &str) -> Result<crate::module::Module, ReconcileError> {
        self.catalog
            .get(name)
            .cloned()
            .ok_or_else(|| ReconcileError::ModuleNotFound(name.to_string()))
    }

    pub async fn get_global_hook(&self, name: &str) -> Result<GlobalHook, ReconcileError> {
        self.hooks
            .lock()
            .await
            .global_hook(name)
            .cloned()
            .ok_or_else(|| ReconcileError::HookNotFound {
                hook: name.to_string(),
                binding: "global".to_string(),
            })
    }

    pub async fn get_module_hook(&self, name: &str) -> Result<ModuleHook, ReconcileError> {
        self.hooks
            .lock()
            .await
            .module_hook(name)
            .cloned()
            .ok_or_else(|| ReconcileError::HookNotFound {
                hook: name.to_string(),
                binding: "module".to_string(),
            })
    }

    pub async fn get_module_names_in_order(&self) -> Vec<String> {
        self.state.lock().await.effective.clone()
    }

    pub async fn run_global_hook(
        &self,
        hook_name: &str,
        binding: Binding,
        contexts: Vec<serde_json::Value>,
        labels: HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<(), ReconcileError> {
        let hook_path = self.global_hooks_dir.join(hook_name);
        let delta = self
            .hook_runner
            .run(
                &hook_path,
                hook_name,
                binding,
                Scope::Global,
                contexts,
                labels,
                cancel,
            )
            .await?;
        self.apply_values_delta(delta);
        Ok(())
    }

    pub async fn run_module_hook(
        &self,
        hook_name: &str,
        binding: Binding,
        contexts: Vec<serde_json::Value>,
        labels: HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<(), ReconcileError> {
        let hook = self.get_module_hook(hook_name).await?;
        let module = self.get_module(&hook.module).await?;
        let hook_path = module
            .hooks_dir
            .clone()
            .unwrap_or_else(|| self.modules_dir.join(&hook.module).join("hooks"))
            .join(hook_name);
        let delta = self
            .hook_runner
            .run(
                &hook_path,
                hook_name,
                binding,
                Scope::Module(hook.module.clone()),
                contexts,
                labels,
                cancel,
            )
            .await?;
        self.apply_values_delta(delta);
        Ok(())
    }

    /// `RunModule(name, onStartup, labels)` (§4.7.2): `BeforeHelm` precedes
    /// the package-manager upgrade, which precedes `AfterHelm` (§5).
    pub async fn run_module(
        &self,
        name: &str,
        request: &UpgradeRequest,
        on_startup: bool,
        labels: HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<(), ReconcileError> {
        self.get_module(name).await?;

        if on_startup {
            let hook_names = self.hooks.lock().await.module_hooks_in_order(name, Binding::OnStartup);
            for hook_name in hook_names {
                self.run_module_hook(&hook_name, Binding::OnStartup, Vec::new(), labels.clone(), cancel.clone())
                    .await?;
            }
        }

        let before_helm_hooks = self.hooks.lock().await.module_hooks_in_order(name, Binding::BeforeHelm);
        for hook_name in before_helm_hooks {
            self.run_module_hook(&hook_name, Binding::BeforeHelm, Vec::new(), labels.clone(), cancel.clone())
                .await?;
        }

        self.package_manager
            .upgrade(request, cancel.clone())
            .await
            .map_err(|source| ReconcileError::PackageManagerError {
                op: "Upgrade".into(),
                release: name.to_string(),
                source,
            })?;

        let after_helm_hooks = self.hooks.lock().await.module_hooks_in_order(name, Binding::AfterHelm);
        for hook_name in after_helm_hooks {
            self.run_module_hook(&hook_name, Binding::AfterHelm, Vec::new(), labels.clone(), cancel.clone())
                .await?;
        }

        Ok(())
    }

    /// `DeleteModule(name, labels)` (§4.7.2): hook index entries are removed
    /// only after the external lifecycle delete completes.
    pub async fn delete_module(
        &self,
        name: &str,
        labels: HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<(), ReconcileError> {
        self.package_manager
            .delete(name, cancel.clone())
            .await
            .map_err(|source| ReconcileError::PackageManagerError {
                op: "Delete".into(),
                release: name.to_string(),
                source,
            })?;

        let after_delete_hooks = self.hooks.lock().await.module_hooks_in_order(name, Binding::AfterDeleteHelm);
        for hook_name in after_delete_hooks {
            self.run_module_hook(
                &hook_name,
                Binding::AfterDeleteHelm,
                Vec::new(),
                labels.clone(),
                cancel.clone(),
            )
            .await?;
        }

        self.hooks.lock().await.remove_module(name);
        Ok(())
    }

    /// Non-blocking, coalescing push to the retry channel (§4.7.2).
    pub fn retry(&self) {
        let _ = self.retry_tx.try_send(());
    }

    /// Loads and indexes global hooks (§4.2): unlike per-module hooks, these
    /// are not tied to a module's enablement, so discovery happens once at
    /// startup rather than per `Discover()` pass.
    pub async fn load_global_hooks(&self, cancel: CancellationToken) -> Result<(), ReconcileError> {
        let global_hooks = self
            .hook_discovery
            .discover_global_hooks(cancel)
            .await
            .map_err(|source| ReconcileError::CatalogInvalid {
                path: self.global_hooks_dir.clone(),
                source,
            })?;

        let mut hooks = self.hooks.lock().await;
        for hook in global_hooks {
            let name = hook.name.clone();
            if let Err(err) = hooks.register_global(hook) {
                warn!(hook = %name, error = %err, "failed to register discovered global hook");
            }
        }
        Ok(())
    }

    /// `Discover()` (§4.4): the full reconciliation pass, including the
    /// package-manager release diff and hook registration for
    /// newly-effective modules — distinct from the lighter-weight
    /// cluster-config-driven re-resolution in §4.7.1, which never touches
    /// release management.
    pub async fn discover(&self, cancel: CancellationToken) -> Result<ModulesState, ReconcileError> {
        let enabled_by_config = {
            let state = self.state.lock().await;
            state.enabled_by_config.clone()
        };
        let probes = self.probes.clone();
        let resolve_fn = move |name: &str| probes.build(name);

        let modules_state = self
            .discoverer
            .lock()
            .await
            .discover(&enabled_by_config, &resolve_fn, cancel.clone())
            .await?;

        for module in &modules_state.newly_enabled_modules {
            match self
                .hook_discovery
                .discover_module_hooks(module, cancel.clone())
                .await
            {
                Ok(module_hooks) => {
                    let mut hooks = self.hooks.lock().await;
                    for hook in module_hooks {
                        if let Err(err) = hooks.register_module(hook) {
                            warn!(module = %module, error = %err, "failed to register discovered hook");
                        }
                    }
                }
                Err(err) => warn!(module = %module, error = %err, "hook discovery failed for newly-enabled module"),
            }
        }

        Ok(modules_state)
    }

    pub fn notify_config_replaced(tx: &watch::Sender<Option<FullConfig>>, cfg: FullConfig) {
        let _ = tx.send(Some(cfg));
    }

    pub fn notify_module_sections_changed(
        tx: &watch::Sender<Option<ModuleSectionsDelta>>,
        delta: ModuleSectionsDelta,
    ) {
        let _ = tx.send(Some(delta));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{HookOutcome, ReleaseStatus};
    use modctl_common::TriState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::timeout;

    /// Reports no releases and never mutates anything; the manager tests
    /// below only exercise enablement, not the package-manager call sites.
    #[derive(Default)]
    struct FakePackageManager;

    #[async_trait::async_trait]
    impl PackageManager for FakePackageManager {
        async fn list_release_names(&self, _cancel: CancellationToken) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn history(
            &self,
            _release: &str,
            _cancel: CancellationToken,
        ) -> anyhow::Result<(u64, ReleaseStatus)> {
            Ok((0, ReleaseStatus::Unknown))
        }
        async fn upgrade(&self, _request: &UpgradeRequest, _cancel: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete(&self, _release: &str, _cancel: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_values(&self, _release: &str, _cancel: CancellationToken) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
    }

    struct FakeHookDiscovery;

    #[async_trait::async_trait]
    impl HookDiscovery for FakeHookDiscovery {
        async fn discover_module_hooks(
            &self,
            _module: &str,
            _cancel: CancellationToken,
        ) -> anyhow::Result<Vec<ModuleHook>> {
            Ok(Vec::new())
        }
        async fn discover_global_hooks(&self, _cancel: CancellationToken) -> anyhow::Result<Vec<GlobalHook>> {
            Ok(Vec::new())
        }
    }

    /// A `HookExecutor` whose first `execute` call fails and every
    /// subsequent call succeeds, used to drive the probe-failure-then-retry
    /// scenario in §8 without touching the filesystem.
    #[derive(Default)]
    struct FlakyOnceExecutor {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl crate::collaborators::HookExecutor for FlakyOnceExecutor {
        async fn execute(
            &self,
            _hook_path: &std::path::Path,
            _invocation: &crate::collaborators::HookInvocation,
            _cancel: CancellationToken,
        ) -> anyhow::Result<HookOutcome> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("transient probe failure");
            }
            Ok(HookOutcome {
                exit_status: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
                patch_files: Vec::new(),
            })
        }
    }

    /// Builds a catalog of `(name, order, common_static, static, enable_probe)`
    /// entries, the same YAML-through-`Catalog::discover` path the rest of
    /// the crate's own tests use — there's no constructor from a raw `Vec<Module>`.
    fn build_catalog(entries: &[(&str, u16, TriState, TriState, Option<&str>)]) -> Catalog {
        let yaml: String = entries
            .iter()
            .map(|(name, order, common, static_, probe)| {
                let mut entry = format!(
                    "  - name: {name}\n    order: {order}\n    common_static_enabled: {common}\n    static_enabled: {static_}\n"
                );
                if let Some(probe_path) = probe {
                    entry.push_str(&format!("    enable_probe: {probe_path}\n"));
                }
                entry
            })
            .collect();
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, format!("version: 1\nmodules:\n{yaml}")).unwrap();
        Catalog::discover(&path, &[]).unwrap()
    }

    fn build_manager(
        catalog: Catalog,
        executor: Arc<dyn crate::collaborators::HookExecutor>,
    ) -> (Arc<ModuleManager>, ManagerHandles) {
        let catalog = Arc::new(catalog);
        let values = Arc::new(ValuesStore::new());
        let package_manager: Arc<dyn PackageManager> = Arc::new(FakePackageManager);
        let hook_discovery: Arc<dyn HookDiscovery> = Arc::new(FakeHookDiscovery);
        let probes = Arc::new(ProbeBuilder::new(
            catalog.clone(),
            executor.clone(),
            PathBuf::from("/tmp/modctl-manager-test/work"),
        ));
        let hook_runner = HookRunner::new(
            values.clone(),
            executor,
            PathBuf::from("/tmp/modctl-manager-test/hooks"),
        );
        ModuleManager::new(
            catalog,
            values,
            package_manager,
            hook_discovery,
            probes,
            hook_runner,
            PathBuf::from("/tmp/modctl-manager-test/modules"),
            PathBuf::from("/tmp/modctl-manager-test/global-hooks"),
            1,
        )
    }

    #[tokio::test]
    async fn cold_start_enables_only_the_statically_true_module() {
        let catalog = build_catalog(&[
            ("a", 0, TriState::Unset, TriState::True, None),
            ("b", 1, TriState::Unset, TriState::Unset, None),
            ("c", 2, TriState::Unset, TriState::False, None),
        ]);
        let (manager, mut handles) = build_manager(catalog, Arc::new(FlakyOnceExecutor::default()));

        ModuleManager::notify_config_replaced(&handles.config_replaced_tx, FullConfig::default());

        let event = timeout(Duration::from_secs(1), handles.events_rx.recv())
            .await
            .expect("event published")
            .expect("channel open");
        assert_eq!(event, Event::GlobalChanged);
        assert_eq!(manager.get_module_names_in_order().await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn toggling_a_module_on_through_cluster_config_changes_the_effective_set() {
        let catalog = build_catalog(&[
            ("a", 0, TriState::Unset, TriState::True, None),
            ("c", 1, TriState::Unset, TriState::False, None),
        ]);
        let (manager, mut handles) = build_manager(catalog, Arc::new(FlakyOnceExecutor::default()));

        ModuleManager::notify_config_replaced(&handles.config_replaced_tx, FullConfig::default());
        timeout(Duration::from_secs(1), handles.events_rx.recv())
            .await
            .expect("cold start event")
            .expect("channel open");
        assert_eq!(manager.get_module_names_in_order().await, vec!["a".to_string()]);

        let mut module_configs = HashMap::new();
        module_configs.insert(
            "c".to_string(),
            ModuleConfigEntry {
                values: serde_json::json!({}),
                is_enabled: TriState::True,
                is_updated: true,
            },
        );
        ModuleManager::notify_module_sections_changed(
            &handles.module_sections_tx,
            ModuleSectionsDelta { module_configs },
        );

        let event = timeout(Duration::from_secs(1), handles.events_rx.recv())
            .await
            .expect("toggle event")
            .expect("channel open");
        assert_eq!(event, Event::GlobalChanged);
        assert_eq!(
            manager.get_module_names_in_order().await,
            vec!["a".to_string(), "c".to_string()]
        );
    }

    #[tokio::test]
    async fn a_transient_probe_failure_buffers_for_retry_and_recovers() {
        let catalog = build_catalog(&[
            ("a", 0, TriState::Unset, TriState::True, None),
            ("flaky", 1, TriState::Unset, TriState::Unset, Some("/bin/true")),
        ]);
        let (manager, mut handles) = build_manager(catalog, Arc::new(FlakyOnceExecutor::default()));

        ModuleManager::notify_config_replaced(&handles.config_replaced_tx, FullConfig::default());
        timeout(Duration::from_secs(1), handles.events_rx.recv())
            .await
            .expect("cold start event")
            .expect("channel open");
        assert_eq!(manager.get_module_names_in_order().await, vec!["a".to_string()]);

        let mut module_configs = HashMap::new();
        module_configs.insert(
            "flaky".to_string(),
            ModuleConfigEntry {
                values: serde_json::json!({}),
                is_enabled: TriState::True,
                is_updated: true,
            },
        );
        ModuleManager::notify_module_sections_changed(
            &handles.module_sections_tx,
            ModuleSectionsDelta {
                module_configs: module_configs.clone(),
            },
        );

        // The probe's first call fails, so the resolver aborts with no
        // partial commit and the manager buffers the delta for retry.
        let event = timeout(Duration::from_secs(1), handles.events_rx.recv())
            .await
            .expect("ambiguous-state event")
            .expect("channel open");
        assert_eq!(event, Event::AmbigousState);
        assert_eq!(manager.get_module_names_in_order().await, vec!["a".to_string()]);

        // Retrying replays the buffered delta; the probe now succeeds.
        manager.retry();
        let event = timeout(Duration::from_secs(1), handles.events_rx.recv())
            .await
            .expect("recovered event")
            .expect("channel open");
        assert_eq!(event, Event::GlobalChanged);
        assert_eq!(
            manager.get_module_names_in_order().await,
            vec!["a".to_string(), "flaky".to_string()]
        );
    }
}
