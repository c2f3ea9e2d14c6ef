use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::binding::{
    collect_bytes, stream_from_bytes, ByteStream, Capability, GetOptions, PutOptions,
};
use crate::bucket::{self, BucketDescriptor};
use crate::env::{Environment, EnvironmentTag};
use crate::error::{StoreError, StoreResult};
use crate::item::{delete_item, read_item_stream, set_item_stream};
use crate::key::{join_key, strip_base, KEY_SEPARATOR};
use crate::resolver::{BindingRef, BindingResolver};

/// Entry point handing out bucket handles for one environment.
#[derive(Clone, Debug)]
pub struct Stowage {
    env: Arc<Environment>,
    tag: EnvironmentTag,
}

impl Stowage {
    pub fn new(env: Arc<Environment>, tag: EnvironmentTag) -> Self {
        Self { env, tag }
    }

    /// Take the environment tag from the environment's `ENV` variable.
    pub fn from_environment(env: Environment) -> Self {
        let tag = env.tag();
        Self::new(Arc::new(env), tag)
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn tag(&self) -> &EnvironmentTag {
        &self.tag
    }

    /// Handle for an arbitrary descriptor.
    pub fn bucket(&self, descriptor: &'static BucketDescriptor) -> Bucket {
        let name = descriptor.binding_name(&self.tag);
        Bucket {
            descriptor,
            binding: BindingRef::named(name),
            env: Arc::clone(&self.env),
        }
    }

    pub fn use_bucket(&self) -> Bucket {
        self.bucket(&bucket::ROOT)
    }

    pub fn use_workflows_bucket(&self) -> Bucket {
        self.bucket(&bucket::WORKFLOWS)
    }

    pub fn use_packages_bucket(&self) -> Bucket {
        self.bucket(&bucket::PACKAGES)
    }

    pub fn use_templates_bucket(&self) -> Bucket {
        self.bucket(&bucket::TEMPLATES)
    }

    pub fn use_cursors_bucket(&self) -> Bucket {
        self.bucket(&bucket::CURSORS)
    }

    pub fn use_downloaded_at_bucket(&self) -> Bucket {
        self.bucket(&bucket::DOWNLOADED_AT)
    }
}

/// A bucket bound to an environment.
///
/// Holds the binding *name*, not the binding. Every call resolves it again,
/// so a handle never caches backend state.
///
/// Writes need a full binding. Reads only need `get` (and `list` for
/// [`Bucket::keys`]), so a read-only mirror serves them.
#[derive(Clone, Debug)]
pub struct Bucket {
    descriptor: &'static BucketDescriptor,
    binding: BindingRef,
    env: Arc<Environment>,
}

impl Bucket {
    pub fn key(&self) -> &'static str {
        self.descriptor.key()
    }

    pub fn base(&self) -> &str {
        self.descriptor.base()
    }

    pub fn descriptor(&self) -> &'static BucketDescriptor {
        self.descriptor
    }

    pub fn binding(&self) -> &BindingRef {
        &self.binding
    }

    // ---- Streams ----

    pub async fn get_stream(
        &self,
        key: &str,
        options: Option<GetOptions>,
    ) -> StoreResult<Option<ByteStream>> {
        read_item_stream(
            &self.env,
            &self.binding,
            self.base(),
            key,
            options,
            &Capability::READ,
        )
        .await
    }

    pub async fn set_stream(
        &self,
        key: &str,
        stream: ByteStream,
        options: Option<PutOptions>,
    ) -> StoreResult<()> {
        set_item_stream(&self.env, &self.binding, self.base(), key, stream, options).await
    }

    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        delete_item(&self.env, &self.binding, self.base(), key).await
    }

    // ---- Buffers ----

    pub async fn get_bytes(&self, key: &str) -> StoreResult<Option<Bytes>> {
        match self.get_stream(key, None).await? {
            Some(stream) => Ok(Some(collect_bytes(stream).await.map_err(StoreError::Backend)?)),
            None => Ok(None),
        }
    }

    pub async fn set_bytes(
        &self,
        key: &str,
        data: impl Into<Bytes>,
        options: Option<PutOptions>,
    ) -> StoreResult<()> {
        self.set_stream(key, stream_from_bytes(data), options).await
    }

    // ---- JSON items ----

    /// Decode the JSON document at `key`.
    pub async fn get_item<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get_bytes(key).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Store `value` at `key` as JSON.
    pub async fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let raw = serde_json::to_vec(value)?;
        let options = PutOptions::with_content_type("application/json");
        self.set_bytes(key, raw, Some(options)).await
    }

    // ---- Presence and listing ----

    /// Whether an object exists at `key`.
    ///
    /// Uses `head` when the binding offers it, otherwise a `get` whose body
    /// is dropped unread.
    pub async fn has_item(&self, key: &str) -> StoreResult<bool> {
        let resolver = BindingResolver::bucket(&self.env);
        let handle = resolver.resolve_for(&self.binding, &Capability::READ)?;
        let full_key = join_key([self.base(), key]);
        if handle.capabilities().has(Capability::Head) {
            let meta = handle.head(&full_key).await.map_err(StoreError::Backend)?;
            Ok(meta.is_some())
        } else {
            let object = handle
                .get(&full_key, None)
                .await
                .map_err(StoreError::Backend)?;
            Ok(object.is_some())
        }
    }

    /// Keys stored in this bucket, relative to its base.
    ///
    /// Needs the optional `list` capability. Keys of nested child buckets are
    /// included with their remaining prefix (`nightly:x`).
    pub async fn keys(&self) -> StoreResult<Vec<String>> {
        let handle = BindingResolver::bucket(&self.env)
            .resolve_for(&self.binding, &[Capability::Get, Capability::List])?;
        let prefix = format!("{}{KEY_SEPARATOR}", self.base());
        let keys = handle.list(&prefix).await.map_err(StoreError::Backend)?;
        Ok(keys
            .iter()
            .filter_map(|k| strip_base(k, self.base()))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;
    use crate::binding::{Binding, ReadOnly};
    use crate::bucket::{NON_PRODUCTION_BINDING, PRODUCTION_BINDING};
    use crate::env::{ENV_VAR, PRODUCTION_MARKER};
    use crate::memory::InMemoryBinding;
    use crate::testing::RecordingBinding;

    fn dev_stowage() -> (Stowage, Arc<InMemoryBinding>) {
        let binding = Arc::new(InMemoryBinding::new());
        let env = Environment::new().with_env(NON_PRODUCTION_BINDING, binding.clone());
        (Stowage::from_environment(env), binding)
    }

    #[test]
    fn handles_expose_key_and_base() {
        let (stowage, _) = dev_stowage();
        let root = stowage.use_bucket();
        assert_eq!(root.key(), "bucket");
        assert_eq!(root.base(), "bucket");

        let cases = [
            (stowage.use_workflows_bucket(), "workflow"),
            (stowage.use_packages_bucket(), "package"),
            (stowage.use_templates_bucket(), "template"),
            (stowage.use_cursors_bucket(), "cursor"),
            (stowage.use_downloaded_at_bucket(), "downloaded-at"),
        ];
        for (bucket, key) in cases {
            assert_eq!(bucket.key(), key);
            assert_eq!(bucket.base(), format!("bucket:{key}"));
        }
    }

    #[test]
    fn binding_name_follows_tag() {
        let prod_env = Environment::new().with_env(ENV_VAR, PRODUCTION_MARKER);
        let prod = Stowage::from_environment(prod_env);
        assert_eq!(prod.use_packages_bucket().binding().label(), PRODUCTION_BINDING);

        let dev = Stowage::from_environment(Environment::new().with_env(ENV_VAR, "preview"));
        assert_eq!(dev.use_packages_bucket().binding().label(), NON_PRODUCTION_BINDING);
    }

    #[tokio::test]
    async fn bytes_round_trip() {
        let (stowage, binding) = dev_stowage();
        let templates = stowage.use_templates_bucket();
        templates.set_bytes("vite", &b"<template>"[..], None).await.unwrap();
        assert!(binding.contains("bucket:template:vite"));
        assert_eq!(
            templates.get_bytes("vite").await.unwrap().unwrap(),
            &b"<template>"[..]
        );
        assert!(templates.get_bytes("other").await.unwrap().is_none());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Cursor {
        sha: String,
        timestamp: i64,
    }

    #[tokio::test]
    async fn json_items() {
        let (stowage, binding) = dev_stowage();
        let cursors = stowage.use_cursors_bucket();
        let cursor = Cursor {
            sha: "abc123".into(),
            timestamp: 1_700_000_000_000,
        };
        cursors.set_item("org:repo", &cursor).await.unwrap();

        let meta = binding.head("bucket:cursor:org:repo").await.unwrap().unwrap();
        assert_eq!(meta.content_type.as_deref(), Some("application/json"));

        let read: Cursor = cursors.get_item("org:repo").await.unwrap().unwrap();
        assert_eq!(read, cursor);
        assert!(cursors.get_item::<Cursor>("org:other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_json_is_a_serialization_error() {
        let (stowage, _) = dev_stowage();
        let bucket = stowage.use_downloaded_at_bucket();
        bucket.set_bytes("k", &b"not json"[..], None).await.unwrap();
        let err = bucket.get_item::<BTreeMap<String, i64>>("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn has_item_with_and_without_head() {
        let (stowage, _) = dev_stowage();
        let packages = stowage.use_packages_bucket();
        packages.set_bytes("a", &b"1"[..], None).await.unwrap();
        assert!(packages.has_item("a").await.unwrap());
        assert!(!packages.has_item("b").await.unwrap());

        let recorder = Arc::new(RecordingBinding::new());
        let env = Environment::new().with_env(NON_PRODUCTION_BINDING, recorder.clone());
        let bucket = Stowage::from_environment(env).use_packages_bucket();
        assert!(!bucket.has_item("a").await.unwrap());
        assert_eq!(recorder.gets()[0].0, "bucket:package:a");
    }

    #[tokio::test]
    async fn keys_are_relative_and_scoped() {
        let (stowage, _) = dev_stowage();
        let packages = stowage.use_packages_bucket();
        packages.set_bytes("b@1", &b"1"[..], None).await.unwrap();
        packages.set_bytes("a@1", &b"1"[..], None).await.unwrap();
        stowage
            .use_templates_bucket()
            .set_bytes("t", &b"1"[..], None)
            .await
            .unwrap();
        stowage
            .use_bucket()
            .set_bytes("packages-lookalike", &b"1"[..], None)
            .await
            .unwrap();

        assert_eq!(packages.keys().await.unwrap(), vec!["a@1", "b@1"]);
        assert_eq!(stowage.use_bucket().keys().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn keys_without_list_capability() {
        let recorder = Arc::new(RecordingBinding::new());
        let env = Environment::new().with_env(NON_PRODUCTION_BINDING, recorder);
        let err = Stowage::from_environment(env)
            .use_bucket()
            .keys()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("`list` key is missing"));
    }

    #[tokio::test]
    async fn delete_goes_through_composed_key() {
        let recorder = Arc::new(RecordingBinding::new());
        let env = Environment::new().with_env(NON_PRODUCTION_BINDING, recorder.clone());
        Stowage::from_environment(env)
            .use_workflows_bucket()
            .delete("run-7")
            .await
            .unwrap();
        assert_eq!(recorder.deletes(), vec!["bucket:workflow:run-7"]);
    }

    #[tokio::test]
    async fn unresolved_binding_for_environment() {
        let binding = Arc::new(InMemoryBinding::new());
        let env = Environment::new()
            .with_env(NON_PRODUCTION_BINDING, binding)
            .with_env(ENV_VAR, PRODUCTION_MARKER);
        let err = Stowage::from_environment(env)
            .use_packages_bucket()
            .get_bytes("x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains(PRODUCTION_BINDING));
    }

    #[tokio::test]
    async fn read_only_mirror_serves_reads() {
        let inner = InMemoryBinding::new();
        inner
            .put("bucket:template:vite", stream_from_bytes(&b"<t/>"[..]), None)
            .await
            .unwrap();
        let env = Environment::new()
            .with_env(NON_PRODUCTION_BINDING, Arc::new(ReadOnly::new(inner)));
        let templates = Stowage::from_environment(env).use_templates_bucket();

        assert_eq!(
            templates.get_bytes("vite").await.unwrap().unwrap(),
            &b"<t/>"[..]
        );
        assert!(templates.has_item("vite").await.unwrap());
        assert_eq!(templates.keys().await.unwrap(), vec!["vite"]);

        let err = templates.set_bytes("other", &b"x"[..], None).await.unwrap_err();
        assert!(err.to_string().contains("`put` key is missing"));
        let err = templates.delete("vite").await.unwrap_err();
        assert!(err.to_string().contains("`put` key is missing"));
    }
}
