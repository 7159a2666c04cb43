//! `FsConfigSource` (§10.6): reads the initial cluster config document from
//! a single on-disk YAML file. Subsequent deltas are pushed by the operator
//! directly through `ManagerHandles`' watch senders — this collaborator only
//! covers the one-shot initial read; no filesystem watching is implemented
//! here (§1 leaves that to the outer operator).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use modctl_common::TriState;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use modctl_core::collaborators::{ConfigSource, FullConfig, InitialConfig, ModuleConfigEntry};

pub struct FsConfigSource {
    path: PathBuf,
}

impl FsConfigSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Re-read the same document as a `FullConfig`, for an operator that
    /// wants to push a full replace (e.g. on `SIGHUP`) without restarting.
    pub fn load_full_config(path: &Path) -> anyhow::Result<FullConfig> {
        let doc = read_document(path)?;
        Ok(FullConfig {
            global_values: doc.global_values,
            module_configs: doc.module_configs,
        })
    }
}

#[async_trait]
impl ConfigSource for FsConfigSource {
    async fn initial(&self, _cancel: CancellationToken) -> anyhow::Result<InitialConfig> {
        let doc = read_document(&self.path)?;
        Ok(InitialConfig {
            global_values: doc.global_values,
            module_configs: doc.module_configs,
        })
    }
}

struct Document {
    global_values: serde_json::Value,
    module_configs: HashMap<String, ModuleConfigEntry>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    values: serde_json::Value,
    #[serde(default)]
    modules: HashMap<String, RawModuleEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawModuleEntry {
    values: serde_json::Value,
    is_enabled: TriState,
    is_updated: bool,
}

fn read_document(path: &Path) -> anyhow::Result<Document> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read cluster config document {}", path.display()))?;
    let raw: RawDocument = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse cluster config document {}", path.display()))?;

    let module_configs = raw
        .modules
        .into_iter()
        .map(|(name, entry)| {
            (
                name,
                ModuleConfigEntry {
                    values: entry.values,
                    is_enabled: entry.is_enabled,
                    is_updated: entry.is_updated,
                },
            )
        })
        .collect();

    Ok(Document {
        global_values: raw.values,
        module_configs,
    })
}
