//! The [`Binding`] trait and the value types that cross it.
//!
//! A binding is a handle to one object-storage backend. The facade needs
//! exactly three operations from it (`get`, `put`, `delete`); `head` and
//! `list` are optional and advertised through [`Capabilities`].

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// An owned, sendable stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Wrap an in-memory buffer as a single-chunk [`ByteStream`].
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    stream::once(async move { Ok(data) }).boxed()
}

/// Drain a [`ByteStream`] into one contiguous buffer.
pub async fn collect_bytes(stream: ByteStream) -> Result<Bytes, BoxError> {
    let buf = stream
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(buf.freeze())
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A single operation a binding may expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Get,
    Put,
    Delete,
    Head,
    List,
}

impl Capability {
    /// Capabilities every binding must expose, in validation order.
    pub const REQUIRED: [Capability; 3] = [Capability::Get, Capability::Put, Capability::Delete];

    /// Capabilities a read-only caller needs.
    pub const READ: [Capability; 1] = [Capability::Get];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Head => "head",
            Self::List => "list",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of operations a binding advertises.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub get: bool,
    pub put: bool,
    pub delete: bool,
    pub head: bool,
    pub list: bool,
}

impl Capabilities {
    /// Only the three required operations.
    pub const REQUIRED: Self = Self {
        get: true,
        put: true,
        delete: true,
        head: false,
        list: false,
    };

    /// Every operation, including the optional ones.
    pub const ALL: Self = Self {
        get: true,
        put: true,
        delete: true,
        head: true,
        list: true,
    };

    /// Nothing at all.
    pub const NONE: Self = Self {
        get: false,
        put: false,
        delete: false,
        head: false,
        list: false,
    };

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Get => self.get,
            Capability::Put => self.put,
            Capability::Delete => self.delete,
            Capability::Head => self.head,
            Capability::List => self.list,
        }
    }

    /// First required capability missing from this set, in get → put →
    /// delete order.
    pub fn first_missing(&self) -> Option<Capability> {
        self.first_missing_of(&Capability::REQUIRED)
    }

    /// First entry of `required` missing from this set.
    pub fn first_missing_of(&self, required: &[Capability]) -> Option<Capability> {
        required.iter().copied().find(|c| !self.has(*c))
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::REQUIRED
    }
}

// ---------------------------------------------------------------------------
// Options and metadata
// ---------------------------------------------------------------------------

/// A byte range within an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    /// `None` reads to the end of the object.
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    /// Clamp this range to an object of `size` bytes, as `start..end`.
    pub fn clamp(&self, size: u64) -> std::ops::Range<u64> {
        let start = self.offset.min(size);
        let end = match self.length {
            Some(len) => start.saturating_add(len).min(size),
            None => size,
        };
        start..end
    }
}

/// Backend options for a read. Forwarded untouched by the facade.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOptions {
    pub range: Option<ByteRange>,
}

impl GetOptions {
    pub fn range(offset: u64, length: Option<u64>) -> Self {
        Self {
            range: Some(ByteRange::new(offset, length)),
        }
    }
}

/// Backend options for a write. Forwarded untouched by the facade.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    #[serde(default)]
    pub custom_metadata: BTreeMap<String, String>,
}

impl PutOptions {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            ..Default::default()
        }
    }
}

/// Metadata a backend reports for a stored object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub uploaded: DateTime<Utc>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    #[serde(default)]
    pub custom_metadata: BTreeMap<String, String>,
    /// The range actually served, when the read asked for one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ByteRange>,
}

/// A hit from [`Binding::get`]: metadata plus the body stream.
pub struct ObjectBody {
    pub meta: ObjectMeta,
    pub body: ByteStream,
}

impl ObjectBody {
    pub fn new(meta: ObjectMeta, body: ByteStream) -> Self {
        Self { meta, body }
    }

    /// Discard the metadata and keep the stream.
    pub fn into_body(self) -> ByteStream {
        self.body
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Binding trait
// ---------------------------------------------------------------------------

/// Error returned by the default implementations of optional operations.
#[derive(Debug, thiserror::Error)]
#[error("binding does not support `{0}`")]
pub struct Unsupported(pub Capability);

/// A handle to an object-storage backend.
///
/// Implementations must be thread-safe (`Send + Sync`). Errors are the
/// backend's own and are passed to callers unchanged.
///
/// `get` returns `Ok(None)` when there is no object at `key`. `delete` of a
/// missing key succeeds.
#[async_trait]
pub trait Binding: Send + Sync {
    /// Operations this handle exposes.
    ///
    /// Checked when the handle enters the facade. Defaults to the three
    /// required operations.
    fn capabilities(&self) -> Capabilities {
        Capabilities::REQUIRED
    }

    async fn get(
        &self,
        key: &str,
        options: Option<GetOptions>,
    ) -> Result<Option<ObjectBody>, BoxError>;

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        options: Option<PutOptions>,
    ) -> Result<(), BoxError>;

    async fn delete(&self, key: &str) -> Result<(), BoxError>;

    /// Metadata for `key` without the body.
    async fn head(&self, _key: &str) -> Result<Option<ObjectMeta>, BoxError> {
        Err(Box::new(Unsupported(Capability::Head)))
    }

    /// Every key starting with `prefix`, sorted.
    async fn list(&self, _prefix: &str) -> Result<Vec<String>, BoxError> {
        Err(Box::new(Unsupported(Capability::List)))
    }
}

/// Wraps a binding and withholds its write operations.
///
/// Reads pass through. `put` and `delete` are not advertised, so the
/// resolver rejects the wrapper wherever a full binding is required; calling
/// them directly fails with [`Unsupported`].
pub struct ReadOnly<B> {
    inner: B,
}

impl<B: Binding> ReadOnly<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

#[async_trait]
impl<B: Binding> Binding for ReadOnly<B> {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            put: false,
            delete: false,
            ..self.inner.capabilities()
        }
    }

    async fn get(
        &self,
        key: &str,
        options: Option<GetOptions>,
    ) -> Result<Option<ObjectBody>, BoxError> {
        self.inner.get(key, options).await
    }

    async fn put(
        &self,
        _key: &str,
        _body: ByteStream,
        _options: Option<PutOptions>,
    ) -> Result<(), BoxError> {
        Err(Box::new(Unsupported(Capability::Put)))
    }

    async fn delete(&self, _key: &str) -> Result<(), BoxError> {
        Err(Box::new(Unsupported(Capability::Delete)))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, BoxError> {
        self.inner.head(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BoxError> {
        self.inner.list(prefix).await
    }
}
