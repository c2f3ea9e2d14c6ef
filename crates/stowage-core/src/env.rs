//! The environment handle bindings are resolved from.
//!
//! A runtime hands application code two places where named bindings may
//! live: a flat set of globals and a nested `__env__` mapping. Both are held
//! here explicitly and searched in [`LookupScope::ORDER`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::binding::{Binding, Capabilities};

/// Name of the variable carrying the environment tag.
pub const ENV_VAR: &str = "ENV";

/// Environment tag value that selects production bindings.
pub const PRODUCTION_MARKER: &str = "production";

/// A value registered under a name in the environment.
///
/// Runtimes mix bindings with plain string variables in the same
/// namespace, so a name can resolve to something that is not a binding.
#[derive(Clone)]
pub enum EnvValue {
    Binding(Arc<dyn Binding>),
    Var(String),
}

impl EnvValue {
    /// Operations this value exposes. Variables expose none.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Binding(binding) => binding.capabilities(),
            Self::Var(_) => Capabilities::NONE,
        }
    }

    pub fn as_binding(&self) -> Option<&Arc<dyn Binding>> {
        match self {
            Self::Binding(binding) => Some(binding),
            Self::Var(_) => None,
        }
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Self::Var(value) => Some(value),
            Self::Binding(_) => None,
        }
    }
}

impl fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binding(binding) => f
                .debug_tuple("Binding")
                .field(&binding.capabilities())
                .finish(),
            Self::Var(value) => f.debug_tuple("Var").field(value).finish(),
        }
    }
}

impl<B: Binding + 'static> From<Arc<B>> for EnvValue {
    fn from(binding: Arc<B>) -> Self {
        Self::Binding(binding)
    }
}

impl From<Arc<dyn Binding>> for EnvValue {
    fn from(binding: Arc<dyn Binding>) -> Self {
        Self::Binding(binding)
    }
}

impl From<String> for EnvValue {
    fn from(value: String) -> Self {
        Self::Var(value)
    }
}

impl From<&str> for EnvValue {
    fn from(value: &str) -> Self {
        Self::Var(value.to_string())
    }
}

/// Where a named value is looked up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupScope {
    /// The flat global registry.
    Global,
    /// The nested `__env__` mapping.
    #[default]
    #[serde(rename = "env")]
    Nested,
}

impl LookupScope {
    /// Lookup order. The first scope holding the name wins.
    pub const ORDER: [LookupScope; 2] = [LookupScope::Global, LookupScope::Nested];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Nested => "__env__",
        }
    }
}

/// Named values available to the resolver.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    globals: HashMap<String, EnvValue>,
    nested: HashMap<String, EnvValue>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `name` in `scope`, replacing any previous
    /// value there.
    pub fn insert(
        &mut self,
        scope: LookupScope,
        name: impl Into<String>,
        value: impl Into<EnvValue>,
    ) {
        self.scope_mut(scope).insert(name.into(), value.into());
    }

    /// Builder form of [`Self::insert`] for the global scope.
    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<EnvValue>) -> Self {
        self.insert(LookupScope::Global, name, value);
        self
    }

    /// Builder form of [`Self::insert`] for the nested `__env__` scope.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<EnvValue>) -> Self {
        self.insert(LookupScope::Nested, name, value);
        self
    }

    /// Value registered under `name` in exactly `scope`.
    pub fn get_in(&self, scope: LookupScope, name: &str) -> Option<&EnvValue> {
        self.scope(scope).get(name)
    }

    /// First value registered under `name`, searching [`LookupScope::ORDER`].
    pub fn lookup(&self, name: &str) -> Option<(LookupScope, &EnvValue)> {
        LookupScope::ORDER.into_iter().find_map(|scope| {
            let found = self.get_in(scope, name);
            if found.is_none() {
                tracing::trace!(name, scope = scope.as_str(), "name not in scope");
            }
            found.map(|value| (scope, value))
        })
    }

    /// The plain variable registered under `name`, if any.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.lookup(name).and_then(|(_, value)| value.as_var())
    }

    /// The environment tag carried by the [`ENV_VAR`] variable.
    ///
    /// Falls back to [`EnvironmentTag::default`] when unset.
    pub fn tag(&self) -> EnvironmentTag {
        self.var(ENV_VAR).map(EnvironmentTag::new).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.globals.len() + self.nested.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty() && self.nested.is_empty()
    }

    fn scope(&self, scope: LookupScope) -> &HashMap<String, EnvValue> {
        match scope {
            LookupScope::Global => &self.globals,
            LookupScope::Nested => &self.nested,
        }
    }

    fn scope_mut(&mut self, scope: LookupScope) -> &mut HashMap<String, EnvValue> {
        match scope {
            LookupScope::Global => &mut self.globals,
            LookupScope::Nested => &mut self.nested,
        }
    }
}

/// Marker distinguishing production from other deployments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnvironmentTag(String);

impl EnvironmentTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn production() -> Self {
        Self::new(PRODUCTION_MARKER)
    }

    pub fn is_production(&self) -> bool {
        self.0 == PRODUCTION_MARKER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EnvironmentTag {
    fn default() -> Self {
        Self::new("development")
    }
}

impl fmt::Display for EnvironmentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
