use std::ffi::OsString;

use pointcut_config::{
    discover_config_path, load_for_root, with_config_env_lock, PointcutConfig,
    POINTCUT_CONFIG_ENV_VAR,
};
use tempfile::tempdir;

struct EnvVarGuard {
    key: &'static str,
    prev: Option<OsString>,
}

impl EnvVarGuard {
    fn set(key: &'static str, value: &std::path::Path) -> Self {
        let prev = std::env::var_os(key);
        std::env::set_var(key, value);
        Self { key, prev }
    }

    fn unset(key: &'static str) -> Self {
        let prev = std::env::var_os(key);
        std::env::remove_var(key);
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => std::env::set_var(self.key, v),
            None => std::env::remove_var(self.key),
        }
    }
}

#[test]
fn discovers_pointcut_toml_in_the_root() {
    with_config_env_lock(|| {
        let _env = EnvVarGuard::unset(POINTCUT_CONFIG_ENV_VAR);
        let dir = tempdir().unwrap();
        let path = dir.path().join("pointcut.toml");
        std::fs::write(&path, "[resolve]\ndefault_fuzz = 2\n").unwrap();

        let found = discover_config_path(dir.path()).expect("config should be found");
        assert_eq!(found, path.canonicalize().unwrap_or(path));

        let (config, from) = load_for_root(dir.path()).unwrap();
        assert_eq!(config.resolve.default_fuzz, 2);
        assert!(from.is_some());
    });
}

#[test]
fn hidden_file_is_a_fallback() {
    with_config_env_lock(|| {
        let _env = EnvVarGuard::unset(POINTCUT_CONFIG_ENV_VAR);
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".pointcut.toml"), "").unwrap();
        assert!(discover_config_path(dir.path()).is_some());
    });
}

#[test]
fn env_var_overrides_discovery() {
    with_config_env_lock(|| {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("pointcut.toml"), "").unwrap();
        let custom = dir.path().join("custom.toml");
        std::fs::write(&custom, "[logging]\njson = true\n").unwrap();
        let _env = EnvVarGuard::set(POINTCUT_CONFIG_ENV_VAR, &custom);

        let (config, from) = load_for_root(dir.path()).unwrap();
        assert!(config.logging.json);
        assert_eq!(from, Some(custom.canonicalize().unwrap_or(custom)));
    });
}

#[test]
fn no_file_means_defaults() {
    with_config_env_lock(|| {
        let _env = EnvVarGuard::unset(POINTCUT_CONFIG_ENV_VAR);
        let dir = tempdir().unwrap();
        let (config, from) = load_for_root(dir.path()).unwrap();
        assert_eq!(config, PointcutConfig::default());
        assert_eq!(from, None);
    });
}
