//! Bucket-scoped key-value storage over object-storage bindings.
//!
//! Application code talks to a handful of named buckets (packages, templates,
//! workflow data, cursors, download timestamps). Each bucket is a key prefix
//! inside one object-storage binding, and the binding is picked by name from
//! the runtime environment: `PROD_BUCKET` in production, `DEV_BUCKET`
//! everywhere else.
//!
//! # Layers
//!
//! - [`Binding`] -- the object-storage capability (`get`/`put`/`delete`,
//!   optionally `head`/`list`)
//! - [`Environment`] -- named bindings and variables, in a global scope and a
//!   nested `__env__` scope
//! - [`BindingResolver`] -- turns a [`BindingRef`] into a validated binding
//! - [`join_key`] -- colon-joined storage keys
//! - [`BucketDescriptor`] -- the fixed bucket registry
//! - [`set_item_stream`], [`get_item_stream`], [`delete_item`] -- one backend
//!   call per operation
//! - [`Stowage`] / [`Bucket`] -- handles tying it all together
//!
//! # Backends
//!
//! - [`InMemoryBinding`] -- `HashMap`-based, for tests and embedding
//! - [`DirectoryBinding`] -- one file per object under a root directory
//! - [`ReadOnly`] -- wraps any binding and withholds writes
//!
//! # Rules
//!
//! 1. Handles never cache backend state; every call resolves its binding.
//! 2. A missing object is `Ok(None)`, never an error.
//! 3. Resolution failures are [`StorageError`]s; backend failures pass
//!    through untouched as [`StoreError::Backend`].
//! 4. Empty key segments are dropped, never rejected.

pub mod binding;
pub mod bucket;
pub mod config;
pub mod env;
pub mod error;
pub mod fs;
pub mod item;
pub mod key;
pub mod memory;
pub mod resolver;
pub mod stowage;

#[cfg(test)]
mod testing;

pub use binding::{
    collect_bytes, stream_from_bytes, Binding, ByteRange, ByteStream, Capabilities, Capability,
    GetOptions, ObjectBody, ObjectMeta, PutOptions, ReadOnly, Unsupported,
};
pub use bucket::{BindingRule, BucketDescriptor};
pub use config::{BindingConfig, BindingKind, StowageConfig};
pub use env::{EnvValue, Environment, EnvironmentTag, LookupScope};
pub use error::{
    BoxError, ConfigError, ConfigResult, StorageError, StorageResult, StoreError, StoreResult,
};
pub use fs::DirectoryBinding;
pub use item::{delete_item, get_item_stream, set_item_stream};
pub use key::{join_key, KEY_SEPARATOR};
pub use memory::InMemoryBinding;
pub use resolver::{resolve_binding, BindingRef, BindingResolver};
pub use stowage::{Bucket, Stowage};
