use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::binding::{
    collect_bytes, stream_from_bytes, Binding, ByteStream, Capabilities, GetOptions, ObjectBody,
    ObjectMeta, PutOptions,
};
use crate::error::BoxError;

#[derive(Clone)]
struct StoredEntry {
    meta: ObjectMeta,
    data: Bytes,
}

/// In-memory, HashMap-based binding.
///
/// Intended for tests and embedding. Objects are held behind a `RwLock`;
/// bodies are shared `Bytes`, so reads never copy. Supports every optional
/// capability and byte ranges.
pub struct InMemoryBinding {
    objects: RwLock<HashMap<String, StoredEntry>>,
}

impl InMemoryBinding {
    /// Create a new empty binding.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|entry| entry.meta.size)
            .sum()
    }

    /// Remove every object.
    pub fn clear(&self) {
        self.objects.write().expect("lock poisoned").clear();
    }

    /// Sorted list of every stored key.
    pub fn keys(&self) -> Vec<String> {
        let map = self.objects.read().expect("lock poisoned");
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().expect("lock poisoned").contains_key(key)
    }

    /// Stored bytes for `key`, bypassing the stream interface.
    pub fn raw(&self, key: &str) -> Option<Bytes> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(key).map(|entry| entry.data.clone())
    }
}

impl Default for InMemoryBinding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Binding for InMemoryBinding {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn get(
        &self,
        key: &str,
        options: Option<GetOptions>,
    ) -> Result<Option<ObjectBody>, BoxError> {
        let entry = {
            let map = self.objects.read().expect("lock poisoned");
            match map.get(key) {
                Some(entry) => entry.clone(),
                None => return Ok(None),
            }
        };
        let mut meta = entry.meta;
        let data = match options.and_then(|o| o.range) {
            Some(range) => {
                let span = range.clamp(meta.size);
                meta.range = Some(range);
                entry.data.slice(span.start as usize..span.end as usize)
            }
            None => entry.data,
        };
        Ok(Some(ObjectBody::new(meta, stream_from_bytes(data))))
    }

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        options: Option<PutOptions>,
    ) -> Result<(), BoxError> {
        let data = collect_bytes(body).await?;
        let options = options.unwrap_or_default();
        let meta = ObjectMeta {
            key: key.to_string(),
            size: data.len() as u64,
            etag: blake3::hash(&data).to_hex().to_string(),
            uploaded: Utc::now(),
            content_type: options.content_type,
            cache_control: options.cache_control,
            custom_metadata: options.custom_metadata,
            range: None,
        };
        let mut map = self.objects.write().expect("lock poisoned");
        map.insert(key.to_string(), StoredEntry { meta, data });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BoxError> {
        self.objects.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, BoxError> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(key).map(|entry| entry.meta.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BoxError> {
        let map = self.objects.read().expect("lock poisoned");
        let mut keys: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for InMemoryBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBinding")
            .field("object_count", &self.len())
            .finish()
    }
}
