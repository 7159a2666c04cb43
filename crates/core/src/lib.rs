//! The Module Manager core: reconciles a cluster configuration document
//! against an on-disk module catalog, computes the effective enabled set,
//! and dispatches global/per-module hooks against a typed binding model.
//!
//! External transports (config watcher, package manager, hook execution,
//! hook discovery) are pluggable collaborators defined in [`collaborators`];
//! this crate only depends on their trait boundaries.

pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod discoverer;
pub mod errors;
pub mod events;
pub mod hook_runner;
pub mod hooks;
pub mod manager;
pub mod module;
pub mod probe;
pub mod resolver;
pub mod values;

pub use catalog::Catalog;
pub use collaborators::{ConfigSource, HookDiscovery, HookExecutor, PackageManager};
pub use errors::ReconcileError;
pub use events::Event;
pub use manager::{ManagerHandles, ModuleManager};
pub use module::{Binding, Module};
pub use resolver::{EnableProbe, EnablementResolver};
pub use values::{Scope, ValuesStore};
