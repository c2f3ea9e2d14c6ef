//! Binding resolution and capability validation.

use std::fmt;
use std::sync::Arc;

use crate::binding::{Binding, Capabilities, Capability};
use crate::env::{EnvValue, Environment};
use crate::error::{StorageError, StorageResult};

/// Driver name reported for generic key-value bindings.
pub const KV_DRIVER: &str = "kv-binding";

/// Driver name reported for object-bucket bindings.
pub const BUCKET_DRIVER: &str = "bucket-binding";

/// Label used in messages for handles passed directly.
const HANDLE_LABEL: &str = "[binding]";

/// Either a concrete binding or the name of one.
#[derive(Clone)]
pub enum BindingRef {
    Handle(Arc<dyn Binding>),
    Named(String),
}

impl BindingRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Name used when reporting failures.
    pub fn label(&self) -> &str {
        match self {
            Self::Handle(_) => HANDLE_LABEL,
            Self::Named(name) => name,
        }
    }
}

impl fmt::Debug for BindingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(_) => f.write_str("Handle(..)"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

impl From<Arc<dyn Binding>> for BindingRef {
    fn from(binding: Arc<dyn Binding>) -> Self {
        Self::Handle(binding)
    }
}

impl<B: Binding + 'static> From<Arc<B>> for BindingRef {
    fn from(binding: Arc<B>) -> Self {
        Self::Handle(binding)
    }
}

impl From<&str> for BindingRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for BindingRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

/// Turns [`BindingRef`]s into validated handles.
///
/// Named references are looked up in the environment's scopes in order;
/// the first hit is validated and returned. Direct handles are validated
/// and returned as the same `Arc`.
#[derive(Clone, Copy, Debug)]
pub struct BindingResolver<'a> {
    env: &'a Environment,
    driver: &'static str,
}

impl<'a> BindingResolver<'a> {
    pub fn new(env: &'a Environment, driver: &'static str) -> Self {
        Self { env, driver }
    }

    /// Resolver reporting as [`KV_DRIVER`].
    pub fn kv(env: &'a Environment) -> Self {
        Self::new(env, KV_DRIVER)
    }

    /// Resolver reporting as [`BUCKET_DRIVER`].
    pub fn bucket(env: &'a Environment) -> Self {
        Self::new(env, BUCKET_DRIVER)
    }

    pub fn driver(&self) -> &'static str {
        self.driver
    }

    /// Resolve `reference` as a full binding exposing `get`, `put` and
    /// `delete`.
    pub fn resolve(&self, reference: &BindingRef) -> StorageResult<Arc<dyn Binding>> {
        self.resolve_for(reference, &Capability::REQUIRED)
    }

    /// Resolve `reference`, requiring only the capabilities in `required`.
    ///
    /// Capabilities are checked in the order given and the first missing one
    /// is reported. A plain variable exposes nothing, so it fails on the
    /// first entry.
    pub fn resolve_for(
        &self,
        reference: &BindingRef,
        required: &[Capability],
    ) -> StorageResult<Arc<dyn Binding>> {
        let label = reference.label();
        let binding = match reference {
            BindingRef::Handle(binding) => {
                self.validate(label, binding.capabilities(), required)?;
                Arc::clone(binding)
            }
            BindingRef::Named(name) => {
                let Some((scope, value)) = self.env.lookup(name) else {
                    tracing::warn!(driver = self.driver, binding = %name, "binding not found");
                    return Err(self.invalid(label, "not found"));
                };
                let binding = self.validated(label, value, required)?;
                tracing::debug!(
                    driver = self.driver,
                    binding = %name,
                    scope = scope.as_str(),
                    "binding resolved"
                );
                binding
            }
        };
        Ok(binding)
    }

    fn validated(
        &self,
        label: &str,
        value: &EnvValue,
        required: &[Capability],
    ) -> StorageResult<Arc<dyn Binding>> {
        self.validate(label, value.capabilities(), required)?;
        value
            .as_binding()
            .cloned()
            .ok_or_else(|| self.invalid(label, "`get` key is missing"))
    }

    fn validate(
        &self,
        label: &str,
        capabilities: Capabilities,
        required: &[Capability],
    ) -> StorageResult<()> {
        match capabilities.first_missing_of(required) {
            None => Ok(()),
            Some(missing) => {
                tracing::warn!(
                    driver = self.driver,
                    binding = label,
                    capability = %missing,
                    "binding missing capability"
                );
                Err(self.invalid(label, &format!("`{missing}` key is missing")))
            }
        }
    }

    fn invalid(&self, label: &str, detail: &str) -> StorageError {
        StorageError::new(self.driver, format!("Invalid binding `{label}`: {detail}"))
    }
}

/// Resolve `reference` against `env` as an object-bucket binding.
pub fn resolve_binding(
    env: &Environment,
    reference: &BindingRef,
) -> StorageResult<Arc<dyn Binding>> {
    BindingResolver::bucket(env).resolve(reference)
}
