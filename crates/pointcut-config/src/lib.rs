//! Configuration for the pointcut tools, read from `pointcut.toml`.
//!
//! ```toml
//! [locals]
//! profile = "compatible"
//! chopped_frame_threshold = 2
//!
//! [resolve]
//! default_fuzz = 8
//! max_fuzz = 32
//!
//! [logging]
//! level = "debug"
//! json = false
//! ```

mod logging;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::ReentrantMutex;
use pointcut_flow::LocalsSettings;
use pointcut_resolve::ResolverOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::logging::{init_tracing, LoggingConfig};

/// Overrides the discovered config file; relative paths resolve against the
/// search root.
pub const POINTCUT_CONFIG_ENV_VAR: &str = "POINTCUT_CONFIG_PATH";

const CONFIG_FILE_NAMES: [&str; 2] = ["pointcut.toml", ".pointcut.toml"];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PointcutConfig {
    #[serde(default)]
    pub locals: LocalsConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which zombie-resurrection rules the local variable reconstruction uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalsProfile {
    #[default]
    Default,
    /// No resurrection; locals end exactly where frames drop them.
    Compatible,
}

/// A profile plus individual overrides on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalsConfig {
    #[serde(default)]
    pub profile: LocalsProfile,
    pub bogus_top: Option<bool>,
    pub exposed_on_load: Option<bool>,
    pub exposed_on_store: Option<bool>,
    pub chopped_insn_threshold: Option<u32>,
    pub chopped_frame_threshold: Option<u32>,
    pub trimmed_insn_threshold: Option<u32>,
    pub trimmed_frame_threshold: Option<u32>,
}

impl LocalsConfig {
    pub fn settings(&self) -> LocalsSettings {
        let mut settings = match self.profile {
            LocalsProfile::Default => LocalsSettings::DEFAULT,
            LocalsProfile::Compatible => LocalsSettings::COMPATIBLE,
        };
        if let Some(value) = self.bogus_top {
            settings.bogus_top = value;
        }
        if let Some(value) = self.exposed_on_load {
            settings.exposed_on_load = value;
        }
        if let Some(value) = self.exposed_on_store {
            settings.exposed_on_store = value;
        }
        let thresholds = [
            (self.chopped_insn_threshold, &mut settings.chopped_insn_threshold),
            (self.chopped_frame_threshold, &mut settings.chopped_frame_threshold),
            (self.trimmed_insn_threshold, &mut settings.trimmed_insn_threshold),
            (self.trimmed_frame_threshold, &mut settings.trimmed_frame_threshold),
        ];
        for (value, slot) in thresholds {
            if value.is_some() {
                *slot = value;
            }
        }
        settings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveConfig {
    /// Instructions `FIELD` searches for an array companion when `fuzz` is
    /// not given.
    #[serde(default = "ResolveConfig::default_fuzz")]
    pub default_fuzz: u32,
    /// Upper bound on any requested `fuzz`.
    #[serde(default = "ResolveConfig::max_fuzz")]
    pub max_fuzz: u32,
}

impl ResolveConfig {
    fn default_fuzz() -> u32 {
        ResolverOptions::default().default_fuzz
    }

    fn max_fuzz() -> u32 {
        ResolverOptions::default().max_fuzz
    }
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            default_fuzz: Self::default_fuzz(),
            max_fuzz: Self::max_fuzz(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` quotes the offending source line.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl PointcutConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::load_from_str(&text)?;
        tracing::debug!(target: "pointcut.config", path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: PointcutConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ResolveConfig {
            default_fuzz,
            max_fuzz,
        } = self.resolve;
        if max_fuzz == 0 {
            return Err(ConfigError::Invalid("resolve.max_fuzz must be at least 1".into()));
        }
        if default_fuzz > max_fuzz {
            return Err(ConfigError::Invalid(format!(
                "resolve.default_fuzz ({default_fuzz}) exceeds resolve.max_fuzz ({max_fuzz})"
            )));
        }
        Ok(())
    }

    pub fn locals_settings(&self) -> LocalsSettings {
        self.locals.settings()
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            default_fuzz: self.resolve.default_fuzz,
            max_fuzz: self.resolve.max_fuzz,
            locals: self.locals_settings(),
        }
    }
}

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Runs `f` while holding the lock that serializes access to
/// [`POINTCUT_CONFIG_ENV_VAR`].
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Finds the config file for `root`: [`POINTCUT_CONFIG_ENV_VAR`] first, then
/// `pointcut.toml` and `.pointcut.toml` in `root`.
pub fn discover_config_path(root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(POINTCUT_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }
    CONFIG_FILE_NAMES
        .into_iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// The config for `root`, or the defaults when there is no config file.
pub fn load_for_root(root: &Path) -> Result<(PointcutConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(root) else {
        return Ok((PointcutConfig::default(), None));
    };
    let config = PointcutConfig::load_from_path(&path)?;
    Ok((config, Some(path)))
}
