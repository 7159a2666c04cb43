use crate::manifest::schema::{
    expand_path, read_yaml_value, CatalogManifest, ModuleSpec, RawManifest, RawModuleSpec,
    CATALOG_MANIFEST_VERSION,
};
use crate::manifest::validator::{insert_entries, parse_module_entries};
use anyhow::{anyhow, bail, Context, Result};
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

impl CatalogManifest {
    /// Load and merge the base catalog manifest plus an optional overlay.
    pub fn load(base: &Path, overlay: Option<&Path>) -> Result<Self> {
        let overlays = overlay
            .map(|path| vec![path.to_path_buf()])
            .unwrap_or_default();
        Self::load_layered(base, &overlays)
    }

    /// Load and merge the base catalog manifest plus zero or more overlay
    /// manifests, applied in order so later overlays win.
    pub fn load_layered(base: &Path, overlays: &[PathBuf]) -> Result<Self> {
        let base_value = read_yaml_value(&expand_path(base)?)
            .with_context(|| format!("failed to load catalog manifest from {}", base.display()))?;
        let base_manifest: RawManifest =
            serde_yaml::from_value(base_value).context("catalog manifest schema is invalid")?;

        if base_manifest.version != CATALOG_MANIFEST_VERSION {
            bail!(
                "catalog manifest version must be {} (got {})",
                CATALOG_MANIFEST_VERSION,
                base_manifest.version
            );
        }

        let mut merged: HashMap<String, RawModuleSpec> = HashMap::new();
        insert_entries(
            &mut merged,
            parse_module_entries(base_manifest.modules)?,
            "base manifest",
        )?;

        for overlay_path in overlays {
            let overlay_path = expand_path(overlay_path)?;
            let Some(value) = read_yaml_value_optional(&overlay_path)? else {
                continue;
            };
            let overlay_manifest: RawManifest = serde_yaml::from_value(value).with_context(|| {
                format!(
                    "overlay catalog manifest schema is invalid: {}",
                    overlay_path.display()
                )
            })?;

            if overlay_manifest.version != base_manifest.version {
                bail!(
                    "overlay manifest version {} does not match base {}",
                    overlay_manifest.version,
                    base_manifest.version
                );
            }

            insert_entries(
                &mut merged,
                parse_module_entries(overlay_manifest.modules)?,
                "overlay manifest",
            )?;
        }

        let mut modules = Vec::with_capacity(merged.len());
        for (name, spec) in merged {
            modules.push(ModuleSpec::from_raw(name, spec));
        }

        // Fixed catalog order: ascending declared order, ties broken by name.
        modules.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));

        Ok(Self {
            version: base_manifest.version,
            modules,
        })
    }
}

fn read_yaml_value_optional(path: &Path) -> Result<Option<serde_yaml::Value>> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let value = serde_yaml::from_str(&contents)
                .with_context(|| format!("failed to parse overlay at {}", path.display()))?;
            Ok(Some(value))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(anyhow!(err))
            .with_context(|| format!("failed to read overlay at {}", path.display())),
    }
}
