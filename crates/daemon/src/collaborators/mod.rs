pub mod fs_config_source;
pub mod hook_discovery;
pub mod package_manager;
pub mod process_hook_executor;

pub use fs_config_source::FsConfigSource;
pub use hook_discovery::FsHookDiscovery;
pub use package_manager::{HelmPackageManager, InMemoryPackageManager, NullPackageManager};
pub use process_hook_executor::ProcessHookExecutor;
