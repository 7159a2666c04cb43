//! Enablement Resolver (§4.3): turns the configured enabled-by-config set
//! into the effective enabled set by running each candidate's enable probe
//! in catalog order.

use crate::catalog::Catalog;
use crate::errors::ReconcileError;
use crate::values::ValuesStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Decides whether a module with the given running prefix of already-enabled
/// predecessors (and its own merged values) should be enabled.
#[async_trait]
pub trait EnableProbe: Send + Sync {
    async fn probe(
        &self,
        module: &str,
        enabled_prefix: &[String],
        values: &serde_json::Value,
        cancel: CancellationToken,
    ) -> anyhow::Result<bool>;
}

/// A probe that always accepts — used for modules with no `enable_probe`
/// declared in the catalog.
pub struct AlwaysEnabled;

#[async_trait]
impl EnableProbe for AlwaysEnabled {
    async fn probe(
        &self,
        _: &str,
        _: &[String],
        _: &serde_json::Value,
        _: CancellationToken,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}

pub struct EnablementResolver {
    catalog: Arc<Catalog>,
    values: Arc<ValuesStore>,
}

impl EnablementResolver {
    pub fn new(catalog: Arc<Catalog>, values: Arc<ValuesStore>) -> Self {
        Self { catalog, values }
    }

    /// `Resolve(enabledByConfig) -> effective` (§4.3). Any probe error aborts
    /// resolution with no partial commit (§4.3 failure policy).
    pub async fn resolve(
        &self,
        enabled_by_config: &[String],
        probes: &dyn Fn(&str) -> Arc<dyn EnableProbe>,
        cancel: CancellationToken,
    ) -> Result<Vec<String>, ReconcileError> {
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        let mut candidates: Vec<&String> = enabled_by_config.iter().collect();
        candidates.sort_by_key(|name| {
            self.catalog
                .order_index(name)
                .unwrap_or(usize::MAX)
        });

        let mut enabled: Vec<String> = Vec::new();
        for name in candidates {
            let values = self.values.module_values(name);
            let probe = probes(name);
            let accepted = probe
                .probe(name, &enabled, &values, cancel.clone())
                .await
                .map_err(|source| ReconcileError::EnablementError {
                    module: name.clone(),
                    source,
                })?;
            if accepted {
                enabled.push(name.clone());
            }
        }
        Ok(enabled)
    }
}
