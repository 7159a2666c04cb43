//! `FsHookDiscovery` (§4.4 step 5, §10.6): scans a module's `hooks/`
//! directory for executables paired with a small YAML sidecar declaring
//! their bindings, the same base+overlay-free manifest shape
//! `modctl_common::manifest` uses for the catalog, scoped down to one file
//! per hook since hooks (unlike the catalog) are not cluster-overlaid.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use modctl_core::collaborators::HookDiscovery;
use modctl_core::module::{validate_bindings, Binding, BindingOrder, GlobalHook, ModuleHook};

pub struct FsHookDiscovery {
    modules_dir: PathBuf,
    global_hooks_dir: PathBuf,
}

impl FsHookDiscovery {
    pub fn new(modules_dir: PathBuf, global_hooks_dir: PathBuf) -> Self {
        Self {
            modules_dir,
            global_hooks_dir,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HookManifest {
    #[serde(default)]
    bindings: Vec<RawBindingOrder>,
}

#[derive(Debug, Deserialize)]
struct RawBindingOrder {
    binding: Binding,
    #[serde(default)]
    order: i64,
}

#[async_trait]
impl HookDiscovery for FsHookDiscovery {
    async fn discover_module_hooks(
        &self,
        module: &str,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Vec<ModuleHook>> {
        let hooks_dir = self.modules_dir.join(module).join("hooks");
        let mut hooks: Vec<ModuleHook> = scan_bindings(&hooks_dir)?
            .into_iter()
            .map(|(name, bindings)| ModuleHook {
                name,
                module: module.to_string(),
                bindings,
            })
            .collect();
        validate_hooks(&hooks, module, false)?;
        hooks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(hooks)
    }

    async fn discover_global_hooks(&self, _cancel: CancellationToken) -> anyhow::Result<Vec<GlobalHook>> {
        let mut hooks: Vec<GlobalHook> = scan_bindings(&self.global_hooks_dir)?
            .into_iter()
            .map(|(name, bindings)| GlobalHook { name, bindings })
            .collect();
        for hook in &hooks {
            if let Err(binding) = validate_bindings(&hook.bindings, true) {
                anyhow::bail!("global hook `{}` declares module-only binding {binding:?}", hook.name);
            }
        }
        hooks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(hooks)
    }
}

fn validate_hooks(hooks: &[ModuleHook], module: &str, is_global: bool) -> anyhow::Result<()> {
    for hook in hooks {
        if let Err(binding) = validate_bindings(&hook.bindings, is_global) {
            anyhow::bail!(
                "hook `{}` in module `{module}` declares global-only binding {binding:?}",
                hook.name
            );
        }
    }
    Ok(())
}

#[cfg(test)]
fn discovery_for_module_tests(dir: &Path) -> FsHookDiscovery {
    FsHookDiscovery::new(dir.to_path_buf(), dir.join("global-hooks"))
}

/// Scans `dir` for hook files paired with a `<name>.yaml` bindings sidecar,
/// skipping bare files that lack one. Shared by both module- and
/// global-hook discovery, which differ only in the record type they build.
fn scan_bindings(dir: &Path) -> anyhow::Result<Vec<(String, Vec<BindingOrder>)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to scan hooks directory {}", dir.display()))
        }
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("yaml") {
            continue;
        }
        let manifest_path = sidecar_path(&path);
        if !manifest_path.exists() {
            continue;
        }
        let hook_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("hook path {} is not valid UTF-8", path.display()))?
            .to_string();

        let manifest = read_manifest(&manifest_path)?;
        let bindings: Vec<BindingOrder> = manifest
            .bindings
            .into_iter()
            .map(|raw| BindingOrder {
                binding: raw.binding,
                order: raw.order,
            })
            .collect();
        found.push((hook_name, bindings));
    }
    Ok(found)
}

fn sidecar_path(hook_path: &Path) -> PathBuf {
    let mut manifest_path = hook_path.to_path_buf();
    let file_name = hook_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    manifest_path.set_file_name(format!("{file_name}.yaml"));
    manifest_path
}

fn read_manifest(path: &Path) -> anyhow::Result<HookManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read hook manifest {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("failed to parse hook manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_hook(dir: &Path, name: &str, manifest: &str) {
        std::fs::write(dir.join(name), "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::write(dir.join(format!("{name}.yaml")), manifest).unwrap();
    }

    #[tokio::test]
    async fn discovers_hooks_with_sidecar_manifests_and_skips_bare_files() {
        let dir = tempdir().unwrap();
        let hooks_dir = dir.path().join("cert-manager").join("hooks");
        std::fs::create_dir_all(&hooks_dir).unwrap();
        write_hook(
            &hooks_dir,
            "rotate-ca",
            "bindings:\n  - binding: schedule\n    order: 10\n",
        );
        std::fs::write(hooks_dir.join("no-manifest.sh"), "#!/bin/sh\n").unwrap();

        let discovery = discovery_for_module_tests(dir.path());
        let hooks = discovery
            .discover_module_hooks("cert-manager", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].name, "rotate-ca");
        assert_eq!(hooks[0].bindings[0].binding, Binding::Schedule);
        assert_eq!(hooks[0].bindings[0].order, 10);
    }

    #[tokio::test]
    async fn missing_hooks_directory_returns_empty() {
        let dir = tempdir().unwrap();
        let discovery = discovery_for_module_tests(dir.path());
        let hooks = discovery
            .discover_module_hooks("absent", CancellationToken::new())
            .await
            .unwrap();
        assert!(hooks.is_empty());
    }

    #[tokio::test]
    async fn rejects_global_only_binding_on_a_module_hook() {
        let dir = tempdir().unwrap();
        let hooks_dir = dir.path().join("a").join("hooks");
        std::fs::create_dir_all(&hooks_dir).unwrap();
        write_hook(&hooks_dir, "bad", "bindings:\n  - binding: beforeAll\n    order: 1\n");

        let discovery = discovery_for_module_tests(dir.path());
        let err = discovery
            .discover_module_hooks("a", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[tokio::test]
    async fn discovers_global_hooks_and_rejects_module_only_binding() {
        let dir = tempdir().unwrap();
        let global_hooks_dir = dir.path().join("global-hooks");
        std::fs::create_dir_all(&global_hooks_dir).unwrap();
        write_hook(
            &global_hooks_dir,
            "sync-all",
            "bindings:\n  - binding: beforeAll\n    order: 5\n",
        );

        let discovery = FsHookDiscovery::new(dir.path().join("modules"), global_hooks_dir.clone());
        let hooks = discovery
            .discover_global_hooks(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].name, "sync-all");

        write_hook(&global_hooks_dir, "bad", "bindings:\n  - binding: beforeHelm\n    order: 1\n");
        let err = discovery
            .discover_global_hooks(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad"));
    }
}
