//! Catalog data model: modules, hooks, and the closed set of hook bindings.

use modctl_common::TriState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The closed set of lifecycle points a hook may bind to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Binding {
    BeforeHelm,
    AfterHelm,
    AfterDeleteHelm,
    BeforeAll,
    AfterAll,
    Schedule,
    OnStartup,
    KubeEvents,
}

impl Binding {
    /// `BeforeAll`/`AfterAll` may only bind to global hooks.
    pub fn is_global_only(self) -> bool {
        matches!(self, Binding::BeforeAll | Binding::AfterAll)
    }

    /// `BeforeHelm`/`AfterHelm`/`AfterDeleteHelm` may only bind to module hooks.
    pub fn is_module_only(self) -> bool {
        matches!(
            self,
            Binding::BeforeHelm | Binding::AfterHelm | Binding::AfterDeleteHelm
        )
    }

    /// Only these bindings trigger re-reconciliation when a hook run moves
    /// the values checksum (§4.6).
    pub fn triggers_reconciliation(self) -> bool {
        matches!(self, Binding::Schedule | Binding::KubeEvents)
    }
}

/// One `(binding, order)` entry declared by a hook. Hooks within the same
/// binding are run in ascending `order`, ties broken by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingOrder {
    pub binding: Binding,
    pub order: i64,
}

/// A hook that is not owned by any module; may bind to `BeforeAll`/`AfterAll`
/// in addition to the event-driven and startup bindings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalHook {
    pub name: String,
    pub bindings: Vec<BindingOrder>,
}

/// A hook owned by a single module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleHook {
    pub name: String,
    pub module: String,
    pub bindings: Vec<BindingOrder>,
}

/// Validate a hook's declared bindings against the invariant in §3. Returns
/// the offending binding on violation.
pub fn validate_bindings(bindings: &[BindingOrder], is_global: bool) -> Result<(), Binding> {
    for b in bindings {
        if is_global && b.binding.is_module_only() {
            return Err(b.binding);
        }
        if !is_global && b.binding.is_global_only() {
            return Err(b.binding);
        }
    }
    Ok(())
}

/// One module as discovered from the catalog: identity, position, static
/// enablement, and where to find its enable probe and hooks.
#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub order: u16,
    pub common_static_enabled: TriState,
    pub static_enabled: TriState,
    pub enable_probe: Option<PathBuf>,
    pub hooks_dir: Option<PathBuf>,
}

impl Module {
    /// The statically-declared enabled flag, merging `common_static` under
    /// `static` (module-level wins unless unset), defaulting to `false`.
    pub fn statically_enabled(&self) -> bool {
        self.common_static_enabled.merge(self.static_enabled).resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_all_rejected_on_module_hook() {
        let bindings = vec![BindingOrder {
            binding: Binding::BeforeAll,
            order: 10,
        }];
        assert_eq!(
            validate_bindings(&bindings, false),
            Err(Binding::BeforeAll)
        );
    }

    #[test]
    fn before_helm_rejected_on_global_hook() {
        let bindings = vec![BindingOrder {
            binding: Binding::BeforeHelm,
            order: 10,
        }];
        assert_eq!(
            validate_bindings(&bindings, true),
            Err(Binding::BeforeHelm)
        );
    }

    #[test]
    fn schedule_and_kube_events_trigger_reconciliation() {
        assert!(Binding::Schedule.triggers_reconciliation());
        assert!(Binding::KubeEvents.triggers_reconciliation());
        assert!(!Binding::BeforeHelm.triggers_reconciliation());
        assert!(!Binding::OnStartup.triggers_reconciliation());
    }

    #[test]
    fn module_static_enabled_wins_over_common_unless_unset() {
        let mut m = Module {
            name: "a".into(),
            order: 10,
            common_static_enabled: TriState::True,
            static_enabled: TriState::False,
            enable_probe: None,
            hooks_dir: None,
        };
        assert!(!m.statically_enabled());

        m.static_enabled = TriState::Unset;
        assert!(m.statically_enabled());

        m.common_static_enabled = TriState::Unset;
        assert!(!m.statically_enabled());
    }
}
