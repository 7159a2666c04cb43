use anyhow::Result;
use std::env;
use std::path::PathBuf;

pub const MODCTL_DIR_NAME: &str = ".modctl";

/// Root directory for modctl's own process state (not the cluster config
/// document). Overridable for tests via `MODCTL_HOME`.
pub fn modctl_home() -> Result<PathBuf> {
    if let Ok(override_home) = env::var("MODCTL_HOME") {
        let trimmed = override_home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("no home directory found"))?
        .join(MODCTL_DIR_NAME))
}

/// Directory the catalog is scanned from. `MODULES_DIR` is consumed by the
/// outer operator per the external-interfaces section; the core only reads
/// the resolved path.
pub fn modules_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var("MODULES_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    Ok(modctl_home()?.join("modules"))
}

/// Directory global (non-module-scoped) hooks are scanned from.
pub fn global_hooks_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var("GLOBAL_HOOKS_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    Ok(modctl_home()?.join("global-hooks"))
}

/// Path to the daemon's own process-config file (layered under CLI flags
/// and environment variables — see `modctld`'s config loader).
pub fn daemon_config_file() -> Result<PathBuf> {
    Ok(modctl_home()?.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn modctl_home_respects_override() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("MODCTL_HOME", "/tmp/modctl-test-home");
        assert_eq!(
            modctl_home().unwrap(),
            PathBuf::from("/tmp/modctl-test-home")
        );
        env::remove_var("MODCTL_HOME");
    }

    #[test]
    fn modctl_home_falls_back_to_dot_dir_under_home() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::remove_var("MODCTL_HOME");
        let path = modctl_home().unwrap();
        assert!(path.ends_with(MODCTL_DIR_NAME));
        assert!(path.is_absolute());
    }

    #[test]
    fn modules_dir_defaults_under_home() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::remove_var("MODULES_DIR");
        env::set_var("MODCTL_HOME", "/tmp/modctl-test-home2");
        assert_eq!(
            modules_dir().unwrap(),
            PathBuf::from("/tmp/modctl-test-home2/modules")
        );
        env::remove_var("MODCTL_HOME");
    }

    #[test]
    fn modules_dir_honors_env_override() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("MODULES_DIR", "/srv/modules");
        assert_eq!(modules_dir().unwrap(), PathBuf::from("/srv/modules"));
        env::remove_var("MODULES_DIR");
    }

    #[test]
    fn global_hooks_dir_honors_env_override() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("GLOBAL_HOOKS_DIR", "/srv/global-hooks");
        assert_eq!(
            global_hooks_dir().unwrap(),
            PathBuf::from("/srv/global-hooks")
        );
        env::remove_var("GLOBAL_HOOKS_DIR");
    }
}
