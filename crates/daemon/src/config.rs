use std::path::PathBuf;

use anyhow::Context;
use modctl_common::paths;
use serde::Deserialize;

use crate::cli::Cli;

const CONFIG_FILE_NAME: &str = "modctld.toml";

/// The daemon's own process configuration — not the cluster config document
/// (§10.3). Layered: CLI flags > environment variables > an on-disk TOML
/// file > built-in defaults, the way `ForwarderConfig::load` does.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub catalog: PathBuf,
    pub catalog_overlay: Vec<PathBuf>,
    pub modules_dir: PathBuf,
    pub global_hooks_dir: PathBuf,
    pub initial_config: Option<PathBuf>,
    pub events_depth: usize,
    pub package_manager: PackageManagerKind,
    pub helm_binary: String,
    pub namespace: String,
    pub log_dir: PathBuf,
    pub run_as_service: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackageManagerKind {
    Null,
    InMemory,
    Helm,
}

impl std::str::FromStr for PackageManagerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(Self::Null),
            "in-memory" | "in_memory" | "memory" => Ok(Self::InMemory),
            "helm" => Ok(Self::Helm),
            other => anyhow::bail!("unsupported package manager backend: {other}"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    catalog: Option<PathBuf>,
    catalog_overlay: Vec<PathBuf>,
    modules_dir: Option<PathBuf>,
    global_hooks_dir: Option<PathBuf>,
    initial_config: Option<PathBuf>,
    events_depth: Option<usize>,
    package_manager: Option<String>,
    helm_binary: Option<String>,
    namespace: Option<String>,
    log_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = load_file_settings(cli.config.clone())?;

        let modules_dir = cli
            .modules_dir
            .clone()
            .or_else(|| env_path("MODULES_DIR"))
            .or(file.modules_dir)
            .map(Ok)
            .unwrap_or_else(paths::modules_dir)?;

        let global_hooks_dir = cli
            .global_hooks_dir
            .clone()
            .or_else(|| env_path("GLOBAL_HOOKS_DIR"))
            .or(file.global_hooks_dir)
            .map(Ok)
            .unwrap_or_else(paths::global_hooks_dir)?;

        let catalog = cli
            .catalog
            .clone()
            .or(file.catalog)
            .unwrap_or_else(|| modules_dir.join("catalog.yaml"));

        let catalog_overlay = if !cli.catalog_overlay.is_empty() {
            cli.catalog_overlay.clone()
        } else {
            file.catalog_overlay
        };

        let package_manager = match cli.package_manager.clone().or(file.package_manager) {
            Some(raw) => raw.parse()?,
            None => PackageManagerKind::Null,
        };

        let log_dir = cli
            .log_dir
            .clone()
            .or(file.log_dir)
            .unwrap_or(paths::modctl_home()?.join("logs"));

        Ok(Self {
            catalog,
            catalog_overlay,
            modules_dir,
            global_hooks_dir,
            initial_config: cli.initial_config.clone().or(file.initial_config),
            events_depth: cli.events_depth.or(file.events_depth).unwrap_or(1),
            package_manager,
            helm_binary: cli
                .helm_binary
                .clone()
                .or(file.helm_binary)
                .unwrap_or_else(|| "helm".to_string()),
            namespace: cli
                .namespace
                .clone()
                .or(file.namespace)
                .unwrap_or_else(|| "default".to_string()),
            log_dir,
            run_as_service: cli.run_as_service,
        })
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn load_file_settings(config_path: Option<PathBuf>) -> anyhow::Result<FileSettings> {
    let path = match config_path {
        Some(path) => path,
        None => match paths::modctl_home() {
            Ok(home) => home.join(CONFIG_FILE_NAME),
            Err(_) => return Ok(FileSettings::default()),
        },
    };

    if !path.exists() {
        return Ok(FileSettings::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed reading daemon config {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("failed parsing daemon config {}", path.display()))
}
