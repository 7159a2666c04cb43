//! Pure functions over the cluster config document (§4.7, §4.7.1): turning
//! `ModuleConfigs` plus the catalog's static declarations into the
//! configured-enabled set, the set of unknown module names, and the
//! `updateAfterRemoval` set.

use std::collections::{HashMap, HashSet};

use crate::catalog::Catalog;
use crate::collaborators::ModuleConfigEntry;

/// `enabledByConfig` plus `unknown` (§4.4 step, §7 `ConfigUnknownModule`).
/// Modules the cluster config is silent on fall back to their static
/// declaration; `unknown` collects entries that name a module absent from
/// the catalog (a warning, not fatal — §7.5).
pub fn compute_enabled_by_config(
    catalog: &Catalog,
    module_configs: &HashMap<String, ModuleConfigEntry>,
) -> (Vec<String>, Vec<String>) {
    let mut unknown = Vec::new();
    let mut configured: HashMap<&str, &ModuleConfigEntry> = HashMap::new();
    for (name, entry) in module_configs {
        if catalog.contains(name) {
            configured.insert(name.as_str(), entry);
        } else {
            unknown.push(name.clone());
        }
    }
    unknown.sort();

    let mut enabled = Vec::new();
    for module in catalog.modules() {
        let static_merged = module.common_static_enabled.merge(module.static_enabled);
        let effective = match configured.get(module.name.as_str()) {
            Some(entry) => static_merged.merge(entry.is_enabled),
            None => static_merged,
        };
        if effective.resolve() {
            enabled.push(module.name.clone());
        }
    }
    (enabled, unknown)
}

/// `updateAfterRemoval` (§4.7.1 step 2): modules that are statically
/// enabled and whose cluster values were just cleared by this delta — they
/// had a non-empty values section in the previous config, and the delta's
/// entry for that same name now carries an empty one. A `ModuleSectionsChanged`
/// delta is a merge, so a module falling out of the document entirely isn't
/// visible here as a missing key; it's visible as its entry going empty.
pub fn update_after_removal(
    catalog: &Catalog,
    previous_module_configs: &HashMap<String, ModuleConfigEntry>,
    delta_module_configs: &HashMap<String, ModuleConfigEntry>,
) -> HashSet<String> {
    let mut out = HashSet::new();
    for (name, new_entry) in delta_module_configs {
        let Some(module) = catalog.get(name) else {
            continue;
        };
        if !module.statically_enabled() {
            continue;
        }
        let had_values = previous_module_configs
            .get(name)
            .map(|entry| is_non_empty(&entry.values))
            .unwrap_or(false);
        if had_values && !is_non_empty(&new_entry.values) {
            out.insert(name.clone());
        }
    }
    out
}

fn is_non_empty(value: &serde_json::Value) -> bool {
    !value.is_null() && value != &serde_json::Value::Object(Default::default())
}
