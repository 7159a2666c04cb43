//! The catalog: the fixed, filesystem-discovered, totally-ordered list of
//! modules. Built once at `Init`; never mutated afterward (§4.2).

use crate::module::Module;
use anyhow::{Context, Result};
use modctl_common::manifest::CatalogManifest;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct Catalog {
    /// Modules in ascending `(order, name)` order, matching the manifest's
    /// own sort — this is the "catalog order" referenced throughout §4.
    modules: Vec<Module>,
}

impl Catalog {
    /// Build a catalog from a base manifest plus optional overlay manifests
    /// (cluster-specific module additions/overrides), the way `modctl-common`
    /// merges layered YAML documents.
    pub fn discover(base_manifest: &Path, overlays: &[PathBuf]) -> Result<Self> {
        let manifest = CatalogManifest::load_layered(base_manifest, overlays)
            .with_context(|| format!("failed to discover catalog from {}", base_manifest.display()))?;
        Ok(Self::from_manifest(manifest))
    }

    fn from_manifest(manifest: CatalogManifest) -> Self {
        let modules = manifest
            .modules
            .into_iter()
            .map(|spec| Module {
                name: spec.name,
                order: spec.order,
                common_static_enabled: spec.common_static_enabled,
                static_enabled: spec.static_enabled,
                enable_probe: spec.enable_probe,
                hooks_dir: spec.hooks_dir,
            })
            .collect();
        Self { modules }
    }

    /// All modules, in catalog order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name == name)
    }

    /// Catalog order index of `name`, used to sort other sets into catalog
    /// order (or reverse catalog order for disable/purge).
    pub fn order_index(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovers_modules_in_catalog_order() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("catalog.yaml");
        fs::write(
            &base,
            "version: 1\nmodules:\n  - name: b\n    order: 20\n  - name: a\n    order: 10\n",
        )
        .unwrap();

        let catalog = Catalog::discover(&base, &[]).unwrap();
        assert_eq!(catalog.names(), vec!["a", "b"]);
        assert_eq!(catalog.order_index("a"), Some(0));
        assert_eq!(catalog.order_index("b"), Some(1));
        assert!(catalog.get("missing").is_none());
    }
}
