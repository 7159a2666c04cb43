mod cli;
mod collaborators;
mod config;
mod logging;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use modctl_core::collaborators::{ConfigSource, FullConfig, HookDiscovery, PackageManager};
use modctl_core::hook_runner::HookRunner;
use modctl_core::probe::ProbeBuilder;
use modctl_core::{Catalog, Event, ModuleManager};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::collaborators::{FsConfigSource, FsHookDiscovery, HelmPackageManager, InMemoryPackageManager, NullPackageManager, ProcessHookExecutor};
use crate::config::{DaemonConfig, PackageManagerKind};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(&cli).context("failed to load daemon configuration")?;

    let _guard = logging::init(&config.log_dir, config.run_as_service)
        .with_context(|| format!("failed to initialize logging at {}", config.log_dir.display()))?;

    info!(
        catalog = %config.catalog.display(),
        modules_dir = %config.modules_dir.display(),
        package_manager = ?config.package_manager,
        "starting modctld"
    );

    let catalog = Arc::new(
        Catalog::discover(&config.catalog, &config.catalog_overlay)
            .with_context(|| format!("failed to discover catalog from {}", config.catalog.display()))?,
    );

    let values = Arc::new(modctl_core::ValuesStore::new());
    load_static_values(&values, &config.modules_dir, &catalog)
        .context("failed to load common/module static values")?;

    let package_manager: Arc<dyn PackageManager> = match config.package_manager {
        PackageManagerKind::Null => Arc::new(NullPackageManager),
        PackageManagerKind::InMemory => Arc::new(InMemoryPackageManager::new()),
        PackageManagerKind::Helm => Arc::new(HelmPackageManager::new(
            config.helm_binary.clone(),
            config.namespace.clone(),
        )),
    };

    let hook_discovery: Arc<dyn HookDiscovery> = Arc::new(FsHookDiscovery::new(
        config.modules_dir.clone(),
        config.global_hooks_dir.clone(),
    ));
    let executor = Arc::new(ProcessHookExecutor::default());
    let probes = Arc::new(ProbeBuilder::new(
        catalog.clone(),
        executor.clone(),
        config.modules_dir.join(".probes"),
    ));
    let hook_runner = HookRunner::new(values.clone(), executor.clone(), config.modules_dir.join(".hooks"));

    let (manager, mut handles) = ModuleManager::new(
        catalog,
        values,
        package_manager,
        hook_discovery,
        probes,
        hook_runner,
        config.modules_dir.clone(),
        config.global_hooks_dir.clone(),
        config.events_depth,
    );

    if let Err(err) = manager.load_global_hooks(CancellationToken::new()).await {
        warn!(error = %err, "failed to load global hooks at startup");
    }

    if let Some(initial_config_path) = &config.initial_config {
        let initial = load_initial_config(initial_config_path)
            .await
            .with_context(|| format!("failed to load initial cluster config {}", initial_config_path.display()))?;
        ModuleManager::notify_config_replaced(&handles.config_replaced_tx, initial);
    } else {
        warn!("no --initial-config supplied; starting with an empty cluster config document");
    }

    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone());

    let discover_manager = manager.clone();
    let discover_cancel = cancel.clone();
    let discovery_task = tokio::spawn(async move {
        periodic_discover(discover_manager, discover_cancel).await;
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutdown requested");
                break;
            }
            event = handles.events_rx.recv() => {
                match event {
                    Some(event) => log_event(&event),
                    None => {
                        warn!("manager event channel closed; shutting down");
                        break;
                    }
                }
            }
        }
    }

    discovery_task.abort();
    info!("modctld shutdown complete");
    Ok(())
}

fn log_event(event: &Event) {
    match event {
        Event::GlobalChanged => info!("published GlobalChanged"),
        Event::ModulesChanged(changes) => {
            let names: Vec<&str> = changes.iter().map(|c| c.name.as_str()).collect();
            info!(modules = ?names, "published ModulesChanged")
        }
        Event::AmbigousState => warn!("published AmbigousState"),
    }
}

/// No external watcher is wired in (§1, §10.6): the daemon stands in for
/// one by re-running `Discover()` on a fixed interval so `cargo run`
/// produces a binary that actually reconciles against the package manager.
async fn periodic_discover(manager: Arc<ModuleManager>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                match manager.discover(cancel.child_token()).await {
                    Ok(state) => info!(
                        enabled = ?state.enabled_modules,
                        to_disable = ?state.modules_to_disable,
                        unknown_releases = ?state.released_unknown_modules,
                        "discovery pass complete"
                    ),
                    Err(err) => error!(error = %err, "discovery pass failed"),
                }
            }
        }
    }
}

async fn load_initial_config(path: &Path) -> anyhow::Result<FullConfig> {
    let source = FsConfigSource::new(path.to_path_buf());
    let initial = source.initial(CancellationToken::new()).await?;
    Ok(FullConfig {
        global_values: initial.global_values,
        module_configs: initial.module_configs,
    })
}

/// Loads `common-values.yaml` under `modules_dir` as the common-static layer
/// and `<modules_dir>/<module>/values.yaml` as each module's static layer
/// (§3 layers 1-2), skipping files that don't exist.
fn load_static_values(
    values: &modctl_core::ValuesStore,
    modules_dir: &Path,
    catalog: &Catalog,
) -> anyhow::Result<()> {
    let common_path = modules_dir.join("common-values.yaml");
    if let Some(parsed) = read_yaml_if_exists(&common_path)? {
        values.set_common_static(parsed);
    }

    for module in catalog.modules() {
        let module_path = modules_dir.join(&module.name).join("values.yaml");
        if let Some(parsed) = read_yaml_if_exists(&module_path)? {
            values.set_module_static(&module.name, parsed);
        }
    }
    Ok(())
}

fn read_yaml_if_exists(path: &Path) -> anyhow::Result<Option<serde_json::Value>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let value: serde_json::Value = serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            Ok(Some(value))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn install_ctrlc_handler(cancel: CancellationToken) {
    if let Err(err) = ctrlc::set_handler(move || {
        warn!("CTRL+C received, initiating shutdown");
        cancel.cancel();
    }) {
        warn!("failed to install ctrl-c handler: {err}");
    }
}
