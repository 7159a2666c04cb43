use std::path::PathBuf;

use clap::Parser;

/// Flags override environment variables, which override the on-disk config
/// file, which override built-in defaults (§10.3).
#[derive(Parser, Debug)]
#[command(
    name = "modctld",
    about = "Module manager reconciliation daemon",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Base catalog manifest (directory-scanned module list).
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Cluster-specific overlay manifest(s), applied on top of `--catalog` in order.
    #[arg(long)]
    pub catalog_overlay: Vec<PathBuf>,

    /// Directory the catalog's per-module assets (hooks, probes) live under.
    #[arg(long)]
    pub modules_dir: Option<PathBuf>,

    /// Directory global (non-module-scoped) hooks are scanned from.
    #[arg(long)]
    pub global_hooks_dir: Option<PathBuf>,

    /// Initial cluster config document, read once at startup by `FsConfigSource`.
    #[arg(long)]
    pub initial_config: Option<PathBuf>,

    /// Depth of the published-events channel (§5 default is 1).
    #[arg(long)]
    pub events_depth: Option<usize>,

    /// Package manager backend: `null`, `in-memory`, or `helm`.
    #[arg(long)]
    pub package_manager: Option<String>,

    /// `helm`-compatible binary to shell out to when `--package-manager=helm`.
    #[arg(long)]
    pub helm_binary: Option<String>,

    /// Namespace passed to the package manager for install/upgrade/delete.
    #[arg(long)]
    pub namespace: Option<String>,

    /// Optional path to a modctld.toml config file (defaults under `modctl_home()`).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for structured logs (defaults under `modctl_home()/logs`).
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Run without ANSI/console-friendly stdout output (service-friendly).
    #[arg(long)]
    pub run_as_service: bool,
}
