//! Hook Registry (§4.5): indexes global and per-module hooks by binding
//! kind, each binding carrying a stable order.

use crate::module::{validate_bindings, Binding, GlobalHook, ModuleHook};
use anyhow::{bail, Result};
use std::collections::HashMap;

#[derive(Default)]
pub struct HookRegistry {
    global: HashMap<Binding, Vec<(String, i64)>>,
    global_hooks: HashMap<String, GlobalHook>,
    module: HashMap<String, HashMap<Binding, Vec<(String, i64)>>>,
    module_hooks: HashMap<String, ModuleHook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_global(&mut self, hook: GlobalHook) -> Result<()> {
        if let Err(binding) = validate_bindings(&hook.bindings, true) {
            bail!(
                "global hook `{}` declares module-only binding {:?}",
                hook.name,
                binding
            );
        }
        for b in &hook.bindings {
            self.global
                .entry(b.binding)
                .or_default()
                .push((hook.name.clone(), b.order));
        }
        self.global_hooks.insert(hook.name.clone(), hook);
        Ok(())
    }

    pub fn register_module(&mut self, hook: ModuleHook) -> Result<()> {
        if let Err(binding) = validate_bindings(&hook.bindings, false) {
            bail!(
                "module hook `{}` declares global-only binding {:?}",
                hook.name,
                binding
            );
        }
        let module_index = self.module.entry(hook.module.clone()).or_default();
        for b in &hook.bindings {
            module_index
                .entry(b.binding)
                .or_default()
                .push((hook.name.clone(), b.order));
        }
        self.module_hooks.insert(hook.name.clone(), hook);
        Ok(())
    }

    /// Drop every hook owned by `module` from the index. Used by
    /// `DeleteModule` (§4.7.2), after the external lifecycle delete
    /// completes.
    pub fn remove_module(&mut self, module: &str) {
        self.module.remove(module);
        self.module_hooks.retain(|_, h| h.module != module);
    }

    pub fn global_hook(&self, name: &str) -> Option<&GlobalHook> {
        self.global_hooks.get(name)
    }

    pub fn module_hook(&self, name: &str) -> Option<&ModuleHook> {
        self.module_hooks.get(name)
    }

    /// `GetGlobalHooksInOrder(b)`: names sorted ascending by `Order(b)`,
    /// ties broken by name (§4.5, §8).
    pub fn global_hooks_in_order(&self, binding: Binding) -> Vec<String> {
        sorted_names(self.global.get(&binding))
    }

    /// `GetModuleHooksInOrder(m, b)`: missing indices return empty (§4.5).
    pub fn module_hooks_in_order(&self, module: &str, binding: Binding) -> Vec<String> {
        sorted_names(self.module.get(module).and_then(|by_binding| by_binding.get(&binding)))
    }
}

fn sorted_names(entries: Option<&Vec<(String, i64)>>) -> Vec<String> {
    let mut entries = entries.cloned().unwrap_or_default();
    entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    entries.into_iter().map(|(name, _)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::BindingOrder;

    fn global(name: &str, binding: Binding, order: i64) -> GlobalHook {
        GlobalHook {
            name: name.to_string(),
            bindings: vec![BindingOrder { binding, order }],
        }
    }

    fn module_hook(name: &str, module: &str, binding: Binding, order: i64) -> ModuleHook {
        ModuleHook {
            name: name.to_string(),
            module: module.to_string(),
            bindings: vec![BindingOrder { binding, order }],
        }
    }

    #[test]
    fn global_hooks_are_sorted_ascending_with_stable_name_ties() {
        let mut registry = HookRegistry::new();
        registry
            .register_global(global("zeta", Binding::BeforeAll, 10))
            .unwrap();
        registry
            .register_global(global("alpha", Binding::BeforeAll, 10))
            .unwrap();
        registry
            .register_global(global("middle", Binding::BeforeAll, 5))
            .unwrap();

        assert_eq!(
            registry.global_hooks_in_order(Binding::BeforeAll),
            vec!["middle", "alpha", "zeta"]
        );
    }

    #[test]
    fn missing_binding_index_returns_empty() {
        let registry = HookRegistry::new();
        assert!(registry.global_hooks_in_order(Binding::OnStartup).is_empty());
        assert!(registry
            .module_hooks_in_order("a", Binding::BeforeHelm)
            .is_empty());
    }

    #[test]
    fn rejects_module_only_binding_on_global_hook() {
        let mut registry = HookRegistry::new();
        let err = registry
            .register_global(global("bad", Binding::BeforeHelm, 1))
            .unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn remove_module_drops_all_its_hooks() {
        let mut registry = HookRegistry::new();
        registry
            .register_module(module_hook("h1", "a", Binding::BeforeHelm, 1))
            .unwrap();
        registry
            .register_module(module_hook("h2", "a", Binding::AfterHelm, 1))
            .unwrap();
        registry.remove_module("a");
        assert!(registry.module_hooks_in_order("a", Binding::BeforeHelm).is_empty());
        assert!(registry.module_hook("h1").is_none());
    }
}
