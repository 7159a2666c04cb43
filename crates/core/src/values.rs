//! The layered values tree (§3, §4.1): common-static, module-static,
//! cluster-config, and dynamic patches, merged on demand into an immutable
//! snapshot per call.

use crate::errors::ReconcileError;
use anyhow::Result;
use json_patch::Patch;
use modctl_common::checksum;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;

/// Which values subtree an operation addresses.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Module(String),
}

impl Scope {
    pub fn label(&self) -> String {
        match self {
            Scope::Global => "global".to_string(),
            Scope::Module(name) => name.clone(),
        }
    }
}

#[derive(Default)]
struct Layers {
    common_static: Value,
    module_static: HashMap<String, Value>,
    cluster_global: Value,
    cluster_module: HashMap<String, Value>,
    patches_global: Vec<Patch>,
    patches_module: HashMap<String, Vec<Patch>>,
}

/// Guards all layer maps with a single writer; snapshot reads are
/// copy-on-read, so concurrent readers never observe a half-applied merge.
pub struct ValuesStore {
    layers: RwLock<Layers>,
}

impl Default for ValuesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ValuesStore {
    pub fn new() -> Self {
        Self {
            layers: RwLock::new(Layers::default()),
        }
    }

    pub fn set_common_static(&self, values: Value) {
        self.layers.write().expect("values lock poisoned").common_static = values;
    }

    pub fn set_module_static(&self, module: &str, values: Value) {
        self.layers
            .write()
            .expect("values lock poisoned")
            .module_static
            .insert(module.to_string(), values);
    }

    pub fn set_cluster_global(&self, values: Value) {
        self.layers.write().expect("values lock poisoned").cluster_global = values;
    }

    pub fn set_cluster_module(&self, module: &str, values: Value) {
        self.layers
            .write()
            .expect("values lock poisoned")
            .cluster_module
            .insert(module.to_string(), values);
    }

    /// `GlobalValues()` (§4.1): merge(common.global, cluster.global, apply(global patches)).
    pub fn global_values(&self) -> Value {
        let layers = self.layers.read().expect("values lock poisoned");
        let mut merged = deep_merge(layers.common_static.clone(), non_null_layer(&layers.cluster_global));
        for patch in &layers.patches_global {
            // Intake already validated these; replay is infallible here.
            let _ = json_patch::patch(&mut merged, patch);
        }
        merged
    }

    /// `ModuleValues(m)` (§4.1): merge(common, module.static, cluster.module[m],
    /// apply(module patches[m])), joined under the module's own camel-cased
    /// key (§3), alongside a `global` key carrying the real `GlobalValues()`
    /// snapshot so a hook or probe can read cluster-wide settings without a
    /// separate call.
    pub fn module_values(&self, module: &str) -> Value {
        let merged = {
            let layers = self.layers.read().expect("values lock poisoned");
            let mut merged = layers.common_static.clone();
            if let Some(static_values) = layers.module_static.get(module) {
                merged = deep_merge(merged, static_values.clone());
            }
            if let Some(cluster_values) = layers.cluster_module.get(module) {
                merged = deep_merge(merged, cluster_values.clone());
            }
            if let Some(patches) = layers.patches_module.get(module) {
                for patch in patches {
                    let _ = json_patch::patch(&mut merged, patch);
                }
            }
            merged
        };

        let mut out = Map::new();
        out.insert("global".to_string(), self.global_values());
        out.insert(modctl_common::module_values_key(module), merged);
        Value::Object(out)
    }

    /// Validate `patch` by dry-run against the current snapshot for `scope`;
    /// on success, append it to the layer and return. On failure, the store
    /// is left untouched and the patch is never retained (§3 invariant).
    pub fn apply_patch(&self, scope: Scope, patch: Patch) -> Result<(), ReconcileError> {
        let mut layers = self.layers.write().expect("values lock poisoned");

        let mut dry_run = match &scope {
            Scope::Global => {
                deep_merge(layers.common_static.clone(), non_null_layer(&layers.cluster_global))
            }
            Scope::Module(name) => {
                let mut merged = layers.common_static.clone();
                if let Some(v) = layers.module_static.get(name) {
                    merged = deep_merge(merged, v.clone());
                }
                if let Some(v) = layers.cluster_module.get(name) {
                    merged = deep_merge(merged, v.clone());
                }
                merged
            }
        };

        json_patch::patch(&mut dry_run, &patch).map_err(|e| ReconcileError::PatchInvalid {
            scope: scope.label(),
            reason: e.to_string(),
        })?;

        match scope {
            Scope::Global => layers.patches_global.push(patch),
            Scope::Module(name) => layers
                .patches_module
                .entry(name)
                .or_default()
                .push(patch),
        }
        Ok(())
    }

    /// Canonical checksum of the current snapshot for `scope` (§3, §4.1).
    pub fn checksum(&self, scope: &Scope) -> Result<String> {
        let snapshot = match scope {
            Scope::Global => self.global_values(),
            Scope::Module(name) => self.module_values(name),
        };
        checksum(&snapshot)
    }

    /// Drop all dynamic patches for `scope`. Used when a full values replace
    /// arrives and previously-applied patches no longer apply to anything.
    pub fn clear_patches(&self, scope: &Scope) {
        let mut layers = self.layers.write().expect("values lock poisoned");
        match scope {
            Scope::Global => layers.patches_global.clear(),
            Scope::Module(name) => {
                layers.patches_module.remove(name);
            }
        }
    }
}

/// An unset `cluster_global`/`cluster_module` layer defaults to `Value::Null`
/// (serde_json's `Value::default()`), never to a real document. Normalize
/// that default to an empty object before it reaches `deep_merge`, so the
/// generic merge keeps treating an explicit, user-authored `null` as the
/// overlay value it actually is.
fn non_null_layer(value: &Value) -> Value {
    if value.is_null() {
        Value::Object(Map::new())
    } else {
        value.clone()
    }
}

/// Deep-merge for mappings; the higher-precedence value replaces the lower
/// one for arrays and scalars, including an explicit `null` (§3).
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}
