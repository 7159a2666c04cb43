use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::path::PathBuf;

use crate::tri_state::TriState;

pub const CATALOG_MANIFEST_VERSION: u32 = 1;
pub const DEFAULT_ORDER: u16 = 500;

/// The catalog as discovered from the on-disk module layout: a fixed,
/// totally ordered list of modules with their static configuration.
#[derive(Clone, Debug)]
pub struct CatalogManifest {
    pub version: u32,
    pub modules: Vec<ModuleSpec>,
}

/// Static (pre-cluster-config) declaration of one module.
#[derive(Clone, Debug)]
pub struct ModuleSpec {
    pub name: String,
    pub order: u16,
    /// `CommonStaticConfig.IsEnabled` — this module's entry in the
    /// catalog-wide shared defaults file.
    pub common_static_enabled: TriState,
    /// `StaticConfig.IsEnabled` — the module's own static declaration.
    pub static_enabled: TriState,
    pub enable_probe: Option<PathBuf>,
    pub hooks_dir: Option<PathBuf>,
}

impl ModuleSpec {
    pub(crate) fn from_raw(name: String, spec: RawModuleSpec) -> Self {
        Self {
            name,
            order: spec.order.unwrap_or(DEFAULT_ORDER),
            common_static_enabled: spec.common_static_enabled.unwrap_or_default(),
            static_enabled: spec.static_enabled.unwrap_or_default(),
            enable_probe: spec.enable_probe.map(PathBuf::from),
            hooks_dir: spec.hooks_dir.map(PathBuf::from),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawManifest {
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) modules: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawModuleEntry {
    pub(crate) name: String,
    #[serde(flatten)]
    pub(crate) spec: RawModuleSpec,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawModuleSpec {
    #[serde(default)]
    pub(crate) order: Option<u16>,
    #[serde(default)]
    pub(crate) common_static_enabled: Option<TriState>,
    #[serde(default)]
    pub(crate) static_enabled: Option<TriState>,
    #[serde(default)]
    pub(crate) enable_probe: Option<String>,
    #[serde(default)]
    pub(crate) hooks_dir: Option<String>,
}

impl RawModuleSpec {
    /// Merge an overlay entry over this base entry: fields set in the
    /// overlay win, unset fields fall back to the base.
    pub(crate) fn merge(self, overlay: RawModuleSpec) -> RawModuleSpec {
        RawModuleSpec {
            order: overlay.order.or(self.order),
            common_static_enabled: overlay.common_static_enabled.or(self.common_static_enabled),
            static_enabled: overlay.static_enabled.or(self.static_enabled),
            enable_probe: overlay.enable_probe.or(self.enable_probe),
            hooks_dir: overlay.hooks_dir.or(self.hooks_dir),
        }
    }
}

pub(crate) fn expand_path(path: &std::path::Path) -> Result<PathBuf> {
    let raw = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("catalog manifest path contains invalid UTF-8"))?;
    Ok(PathBuf::from(expand_tilde(raw)))
}

fn expand_tilde(raw: &str) -> String {
    if !raw.starts_with('~') {
        return raw.to_string();
    }
    let Some(home) = dirs::home_dir() else {
        return raw.to_string();
    };
    if raw == "~" {
        return home.to_string_lossy().to_string();
    }
    let remainder = &raw[1..];
    if let Some(trimmed) = remainder.strip_prefix('/') {
        if trimmed.is_empty() {
            return home.to_string_lossy().to_string();
        }
        return home.join(trimmed).to_string_lossy().to_string();
    }
    raw.to_string()
}

pub(crate) fn read_yaml_value(path: &std::path::Path) -> Result<Value> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog manifest at {}", path.display()))?;
    serde_yaml::from_str(&data)
        .with_context(|| format!("failed to parse catalog manifest at {}", path.display()))
}
