//! The error taxonomy used at the library boundary. Callers match on
//! variant; the binary converts everything to `anyhow::Error` for logging.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("module `{0}` not found")]
    ModuleNotFound(String),

    #[error("hook `{hook}` not found for binding {binding:?}")]
    HookNotFound { hook: String, binding: String },

    #[error("patch rejected for scope `{scope}`: {reason}")]
    PatchInvalid { scope: String, reason: String },

    #[error("enablement probe failed for module `{module}`: {source}")]
    EnablementError {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("package manager operation `{op}` failed for release `{release}`: {source}")]
    PackageManagerError {
        op: String,
        release: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cluster config references unknown module `{0}`")]
    ConfigUnknownModule(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid catalog manifest at {path}: {source}")]
    CatalogInvalid {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl ReconcileError {
    /// True for the error kinds §7 classifies as "surface and continue":
    /// the caller is told, but the reconciliation as a whole proceeds.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ReconcileError::EnablementError { .. } | ReconcileError::Cancelled
        )
    }
}
