use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::binding::{Binding, ReadOnly};
use crate::bucket::{NON_PRODUCTION_BINDING, PRODUCTION_BINDING};
use crate::env::{EnvValue, Environment, EnvironmentTag, LookupScope, ENV_VAR, PRODUCTION_MARKER};
use crate::error::{ConfigError, ConfigResult};
use crate::fs::DirectoryBinding;
use crate::memory::InMemoryBinding;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "stowage.toml";

/// Which backend a configured binding uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Process-local, lost on exit.
    Memory,
    /// Files under `path`.
    Directory,
}

/// One binding declared in configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    pub kind: BindingKind,
    /// Root directory for [`BindingKind::Directory`]. Relative paths are
    /// taken from the configuration file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Scope the binding is registered in.
    #[serde(default)]
    pub scope: LookupScope,
    /// Withhold `put` and `delete`. Bucket reads still resolve; writes fail
    /// with a missing `put` capability.
    #[serde(default)]
    pub read_only: bool,
}

impl BindingConfig {
    pub fn memory() -> Self {
        Self {
            kind: BindingKind::Memory,
            path: None,
            scope: LookupScope::default(),
            read_only: false,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: BindingKind::Directory,
            path: Some(path.into()),
            ..Self::memory()
        }
    }

    fn build(&self, name: &str, base_dir: Option<&Path>) -> ConfigResult<EnvValue> {
        match self.kind {
            BindingKind::Memory => Ok(self.wrap(InMemoryBinding::new())),
            BindingKind::Directory => {
                let path = self.path.as_ref().ok_or_else(|| ConfigError::InvalidBinding {
                    name: name.to_string(),
                    reason: "directory bindings need a `path`".into(),
                })?;
                let root = match base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path.clone(),
                };
                Ok(self.wrap(DirectoryBinding::new(root)))
            }
        }
    }

    fn wrap<B: Binding + 'static>(&self, binding: B) -> EnvValue {
        let binding: Arc<dyn Binding> = if self.read_only {
            Arc::new(ReadOnly::new(binding))
        } else {
            Arc::new(binding)
        };
        EnvValue::Binding(binding)
    }
}

/// Top-level configuration.
///
/// ```toml
/// environment = "production"
///
/// [bindings.PROD_BUCKET]
/// kind = "directory"
/// path = "/var/lib/stowage"
///
/// [vars]
/// REGION = "eu"
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StowageConfig {
    /// Environment tag. `"production"` selects production bindings.
    pub environment: String,
    pub bindings: BTreeMap<String, BindingConfig>,
    /// Plain variables, registered in the nested scope.
    pub vars: BTreeMap<String, String>,
    /// Directory relative binding paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Default for StowageConfig {
    fn default() -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(
            PRODUCTION_BINDING.to_string(),
            BindingConfig::directory(".stowage/production"),
        );
        bindings.insert(
            NON_PRODUCTION_BINDING.to_string(),
            BindingConfig::directory(".stowage/development"),
        );
        Self {
            environment: EnvironmentTag::default().as_str().to_string(),
            bindings,
            vars: BTreeMap::new(),
            base_dir: None,
        }
    }
}

impl StowageConfig {
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse `path`. Relative binding paths resolve against the
    /// file's directory.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        tracing::debug!(path = %path.display(), bindings = config.bindings.len(), "config loaded");
        Ok(config)
    }

    /// Like [`Self::load`], but a missing file yields [`Self::default`].
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// An in-memory configuration with both bucket bindings.
    pub fn in_memory(environment: impl Into<String>) -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(PRODUCTION_BINDING.to_string(), BindingConfig::memory());
        bindings.insert(NON_PRODUCTION_BINDING.to_string(), BindingConfig::memory());
        Self {
            environment: environment.into(),
            bindings,
            ..Self::default()
        }
    }

    pub fn tag(&self) -> EnvironmentTag {
        EnvironmentTag::new(self.environment.as_str())
    }

    pub fn is_production(&self) -> bool {
        self.environment == PRODUCTION_MARKER
    }

    /// Instantiate every configured binding and variable.
    ///
    /// The environment tag is also published as the `ENV` variable, taking
    /// precedence over a `vars.ENV` entry.
    pub fn build_environment(&self) -> ConfigResult<Environment> {
        let mut env = Environment::new();
        for (name, value) in &self.vars {
            env.insert(LookupScope::Nested, name.as_str(), value.as_str());
        }
        env.insert(LookupScope::Nested, ENV_VAR, self.environment.as_str());
        for (name, binding) in &self.bindings {
            let value = binding.build(name, self.base_dir.as_deref())?;
            env.insert(binding.scope, name.as_str(), value);
        }
        Ok(env)
    }
}
