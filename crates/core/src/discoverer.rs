//! State Discoverer (§4.4): diffs the effective enabled set against the
//! previously effective set and the package manager's installed releases.

use crate::catalog::Catalog;
use crate::collaborators::PackageManager;
use crate::errors::ReconcileError;
use crate::resolver::{EnableProbe, EnablementResolver};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Output of one discovery pass (§3). Transient: produced by discovery,
/// consumed by the outer operator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModulesState {
    /// Catalog order.
    pub enabled_modules: Vec<String>,
    /// Reverse catalog order — see §4.4's ordering rationale.
    pub modules_to_disable: Vec<String>,
    /// Reverse lexical order.
    pub released_unknown_modules: Vec<String>,
    /// Order preserved from `enabled_modules`.
    pub newly_enabled_modules: Vec<String>,
}

pub struct StateDiscoverer {
    catalog: Arc<Catalog>,
    resolver: EnablementResolver,
    package_manager: Arc<dyn PackageManager>,
    previous_effective: Vec<String>,
}

impl StateDiscoverer {
    pub fn new(
        catalog: Arc<Catalog>,
        resolver: EnablementResolver,
        package_manager: Arc<dyn PackageManager>,
    ) -> Self {
        Self {
            catalog,
            resolver,
            package_manager,
            previous_effective: Vec::new(),
        }
    }

    pub fn previous_effective(&self) -> &[String] {
        &self.previous_effective
    }

    /// `Discover() -> ModulesState` (§4.4). Steps 1-8, in order.
    pub async fn discover(
        &mut self,
        enabled_by_config: &[String],
        probes: &dyn Fn(&str) -> Arc<dyn EnableProbe>,
        cancel: CancellationToken,
    ) -> Result<ModulesState, ReconcileError> {
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        let releases: HashSet<String> = self
            .package_manager
            .list_release_names(cancel.clone())
            .await
            .map_err(|source| ReconcileError::PackageManagerError {
                op: "ListReleaseNames".into(),
                release: String::new(),
                source,
            })?
            .into_iter()
            .collect();

        let mut released_unknown: Vec<String> = releases
            .iter()
            .filter(|r| !self.catalog.contains(r))
            .cloned()
            .collect();
        released_unknown.sort_unstable_by(|a, b| b.cmp(a));

        let known_releases: HashSet<String> = releases
            .into_iter()
            .filter(|r| self.catalog.contains(r))
            .collect();

        let effective = self
            .resolver
            .resolve(enabled_by_config, probes, cancel.clone())
            .await?;

        let previous_set: HashSet<&String> = self.previous_effective.iter().collect();
        let newly_enabled: Vec<String> = effective
            .iter()
            .filter(|m| !previous_set.contains(m))
            .cloned()
            .collect();

        self.previous_effective = effective.clone();

        let effective_set: HashSet<&String> = effective.iter().collect();
        let mut to_disable: Vec<String> = self
            .catalog
            .names()
            .into_iter()
            .filter(|m| !effective_set.contains(m) && known_releases.contains(m))
            .collect();
        // Reverse catalog order.
        to_disable.sort_by_key(|name| std::cmp::Reverse(self.catalog.order_index(name)));

        Ok(ModulesState {
            enabled_modules: effective,
            modules_to_disable: to_disable,
            released_unknown_modules: released_unknown,
            newly_enabled_modules: newly_enabled,
        })
    }
}
