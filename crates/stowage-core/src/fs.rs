//! Directory-backed binding.
//!
//! Layout under the root directory, where `<digest>` is the hex BLAKE3 hash
//! of the key:
//!
//! - `objects/<digest>.json` is the object's record: its [`ObjectMeta`] and
//!   the name of the body file it publishes,
//! - `objects/<digest>.<pid>.<seq>.body` is one written body version.
//!
//! File names have a fixed length whatever the key. A put writes a fresh
//! body file, then publishes it by renaming a new record over the old one.
//! The record rename is the only commit point, so a record always describes
//! the body it names.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use crate::binding::{
    Binding, ByteRange, ByteStream, Capabilities, GetOptions, ObjectBody, ObjectMeta, PutOptions,
};
use crate::error::BoxError;

const OBJECTS_DIR: &str = "objects";
const RECORD_SUFFIX: &str = ".json";
const BODY_SUFFIX: &str = ".body";
const PARTIAL_SUFFIX: &str = ".partial";

/// Reads retry when the record they loaded was replaced before its body
/// could be opened.
const READ_ATTEMPTS: usize = 3;

static VERSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Published state of one object.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    /// Body file name inside the objects directory.
    body: String,
    meta: ObjectMeta,
}

/// A binding that stores objects as files under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryBinding {
    root: PathBuf,
}

impl DirectoryBinding {
    /// Binding rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join(OBJECTS_DIR)
    }

    fn digest(key: &str) -> String {
        hex::encode(blake3::hash(key.as_bytes()).as_bytes())
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.objects_dir().join(format!("{}{RECORD_SUFFIX}", Self::digest(key)))
    }

    /// A name no other write of `key` uses.
    fn version_name(key: &str) -> String {
        let seq = VERSION_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("{}.{}.{seq}", Self::digest(key), std::process::id())
    }

    async fn read_record(&self, key: &str) -> Result<Option<Record>, BoxError> {
        read_record_at(&self.record_path(key)).await
    }

    /// Write the body and commit its record. Returns the record it replaced.
    async fn publish(
        &self,
        key: &str,
        body_name: &str,
        partial: &Path,
        body: ByteStream,
        options: Option<PutOptions>,
    ) -> Result<Option<Record>, BoxError> {
        let (size, etag) = write_body(&self.objects_dir().join(body_name), body).await?;

        let options = options.unwrap_or_default();
        let record = Record {
            body: body_name.to_string(),
            meta: ObjectMeta {
                key: key.to_string(),
                size,
                etag,
                uploaded: Utc::now(),
                content_type: options.content_type,
                cache_control: options.cache_control,
                custom_metadata: options.custom_metadata,
                range: None,
            },
        };
        fs::write(partial, serde_json::to_vec_pretty(&record)?).await?;

        let previous = self.read_record(key).await?;
        fs::rename(partial, self.record_path(key)).await?;
        Ok(previous)
    }

    async fn open_body(
        mut meta: ObjectMeta,
        mut file: fs::File,
        range: Option<ByteRange>,
    ) -> Result<ObjectBody, BoxError> {
        let body = match range {
            Some(range) => {
                let span = range.clamp(meta.size);
                meta.range = Some(range);
                file.seek(SeekFrom::Start(span.start)).await?;
                ReaderStream::new(file.take(span.end - span.start))
                    .map_err(|e| Box::new(e) as BoxError)
                    .boxed()
            }
            None => ReaderStream::new(file)
                .map_err(|e| Box::new(e) as BoxError)
                .boxed(),
        };
        Ok(ObjectBody::new(meta, body))
    }
}

async fn read_record_at(path: &Path) -> Result<Option<Record>, BoxError> {
    match fs::read(path).await {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Box::new(e)),
    }
}

async fn write_body(path: &Path, mut body: ByteStream) -> Result<(u64, String), BoxError> {
    let mut file = fs::File::create(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut size = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        size += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok((size, hasher.finalize().to_hex().to_string()))
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl Binding for DirectoryBinding {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn get(
        &self,
        key: &str,
        options: Option<GetOptions>,
    ) -> Result<Option<ObjectBody>, BoxError> {
        let range = options.and_then(|o| o.range);
        for _ in 0..READ_ATTEMPTS {
            let Some(record) = self.read_record(key).await? else {
                return Ok(None);
            };
            let file = match fs::File::open(self.objects_dir().join(&record.body)).await {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Box::new(e)),
            };
            tracing::trace!(key, body = %record.body, "directory object opened");
            return Self::open_body(record.meta, file, range).await.map(Some);
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        options: Option<PutOptions>,
    ) -> Result<(), BoxError> {
        let objects = self.objects_dir();
        fs::create_dir_all(&objects).await?;

        let version = Self::version_name(key);
        let body_name = format!("{version}{BODY_SUFFIX}");
        let partial = objects.join(format!("{version}{PARTIAL_SUFFIX}"));
        let previous = match self.publish(key, &body_name, &partial, body, options).await {
            Ok(previous) => previous,
            Err(e) => {
                let _ = remove_if_present(&partial).await;
                let _ = remove_if_present(&objects.join(&body_name)).await;
                return Err(e);
            }
        };

        if let Some(previous) = previous.filter(|p| p.body != body_name) {
            if let Err(e) = remove_if_present(&objects.join(&previous.body)).await {
                tracing::warn!(
                    key,
                    body = %previous.body,
                    error = %e,
                    "stale body not removed"
                );
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BoxError> {
        remove_if_present(&self.record_path(key)).await?;

        let mut entries = match fs::read_dir(self.objects_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Box::new(e)),
        };
        let prefix = format!("{}.", Self::digest(key));
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) && name.ends_with(BODY_SUFFIX) {
                remove_if_present(&entry.path()).await?;
            }
        }
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, BoxError> {
        Ok(self.read_record(key).await?.map(|record| record.meta))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BoxError> {
        let mut entries = match fs::read_dir(self.objects_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Box::new(e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(RECORD_SUFFIX) {
                continue;
            }
            // Deleted since the directory was read.
            let Some(record) = read_record_at(&entry.path()).await? else {
                continue;
            };
            if record.meta.key.starts_with(prefix) {
                keys.push(record.meta.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{collect_bytes, stream_from_bytes};
    use bytes::Bytes;

    async fn read(
        binding: &DirectoryBinding,
        key: &str,
        options: Option<GetOptions>,
    ) -> Option<Bytes> {
        let body = binding.get(key, options).await.unwrap()?;
        Some(collect_bytes(body.into_body()).await.unwrap())
    }

    fn object_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.join(OBJECTS_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let binding = DirectoryBinding::new(dir.path());

        binding
            .put("bucket:package:my-lib@1.0.0", stream_from_bytes(&b"tarball"[..]), None)
            .await
            .unwrap();
        assert_eq!(
            read(&binding, "bucket:package:my-lib@1.0.0", None).await.unwrap(),
            &b"tarball"[..]
        );

        binding.delete("bucket:package:my-lib@1.0.0").await.unwrap();
        assert!(read(&binding, "bucket:package:my-lib@1.0.0", None).await.is_none());
        assert!(object_files(dir.path()).is_empty());
        binding.delete("bucket:package:my-lib@1.0.0").await.unwrap();
    }

    #[tokio::test]
    async fn missing_root_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let binding = DirectoryBinding::new(dir.path().join("not-yet"));
        assert!(binding.get("k", None).await.unwrap().is_none());
        assert!(binding.head("k").await.unwrap().is_none());
        assert!(binding.list("").await.unwrap().is_empty());
        binding.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn keys_with_slashes_and_scopes() {
        let dir = tempfile::tempdir().unwrap();
        let binding = DirectoryBinding::new(dir.path());
        let key = "bucket:package:@scope/pkg@2.0.0";
        binding
            .put(key, stream_from_bytes(&b"scoped"[..]), None)
            .await
            .unwrap();
        assert_eq!(binding.list("bucket:package:").await.unwrap(), vec![key]);
        assert_eq!(read(&binding, key, None).await.unwrap(), &b"scoped"[..]);
    }

    #[tokio::test]
    async fn long_keys_fit_file_name_limits() {
        let dir = tempfile::tempdir().unwrap();
        let binding = DirectoryBinding::new(dir.path());
        let key = format!("bucket:package:@scope/{}@1.0.0", "a".repeat(300));

        binding
            .put(&key, stream_from_bytes(&b"long"[..]), None)
            .await
            .unwrap();
        assert_eq!(read(&binding, &key, None).await.unwrap(), &b"long"[..]);
        assert_eq!(binding.head(&key).await.unwrap().unwrap().key, key);
        assert_eq!(binding.list("bucket:package:").await.unwrap(), vec![key.clone()]);
        assert!(object_files(dir.path()).iter().all(|name| name.len() < 100));

        binding.delete(&key).await.unwrap();
        assert!(read(&binding, &key, None).await.is_none());
    }

    #[tokio::test]
    async fn metadata_round_trips_through_record() {
        let dir = tempfile::tempdir().unwrap();
        let binding = DirectoryBinding::new(dir.path());
        binding
            .put(
                "t",
                stream_from_bytes(&b"<html/>"[..]),
                Some(PutOptions::with_content_type("text/html")),
            )
            .await
            .unwrap();

        let meta = binding.head("t").await.unwrap().unwrap();
        assert_eq!(meta.key, "t");
        assert_eq!(meta.size, 7);
        assert_eq!(meta.content_type.as_deref(), Some("text/html"));
        assert_eq!(meta.etag, blake3::hash(b"<html/>").to_hex().to_string());
    }

    #[tokio::test]
    async fn range_reads() {
        let dir = tempfile::tempdir().unwrap();
        let binding = DirectoryBinding::new(dir.path());
        binding
            .put("r", stream_from_bytes(&b"0123456789"[..]), None)
            .await
            .unwrap();
        assert_eq!(
            read(&binding, "r", Some(GetOptions::range(3, Some(4)))).await.unwrap(),
            &b"3456"[..]
        );
        assert_eq!(
            read(&binding, "r", Some(GetOptions::range(8, None))).await.unwrap(),
            &b"89"[..]
        );
    }

    #[tokio::test]
    async fn failed_stream_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let binding = DirectoryBinding::new(dir.path());
        let chunks: Vec<Result<Bytes, BoxError>> =
            vec![Ok(Bytes::from_static(b"half")), Err("client went away".into())];
        let body: ByteStream = futures::stream::iter(chunks).boxed();

        let err = binding.put("k", body, None).await.unwrap_err();
        assert_eq!(err.to_string(), "client went away");
        assert!(binding.get("k", None).await.unwrap().is_none());
        assert!(object_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn failed_commit_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let binding = DirectoryBinding::new(dir.path());
        // A non-empty directory where the record belongs blocks the commit.
        let record = binding.record_path("k");
        std::fs::create_dir_all(record.join("blocker")).unwrap();

        assert!(binding
            .put("k", stream_from_bytes(&b"data"[..]), None)
            .await
            .is_err());

        let record_name = record.file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(object_files(dir.path()), vec![record_name]);
    }

    #[tokio::test]
    async fn overwrite_replaces_body_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let binding = DirectoryBinding::new(dir.path());
        binding.put("k", stream_from_bytes(&b"0123456789"[..]), None).await.unwrap();
        binding.put("k", stream_from_bytes(&b"abc"[..]), None).await.unwrap();

        assert_eq!(read(&binding, "k", None).await.unwrap(), &b"abc"[..]);
        assert_eq!(binding.head("k").await.unwrap().unwrap().size, 3);
        assert_eq!(
            read(&binding, "k", Some(GetOptions::range(1, None))).await.unwrap(),
            &b"bc"[..]
        );
        assert_eq!(binding.list("").await.unwrap(), vec!["k"]);

        let bodies = object_files(dir.path())
            .into_iter()
            .filter(|name| name.ends_with(BODY_SUFFIX))
            .count();
        assert_eq!(bodies, 1);
    }

    #[tokio::test]
    async fn record_without_body_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let binding = DirectoryBinding::new(dir.path());
        binding.put("k", stream_from_bytes(&b"v"[..]), None).await.unwrap();
        for name in object_files(dir.path()) {
            if name.ends_with(BODY_SUFFIX) {
                std::fs::remove_file(dir.path().join(OBJECTS_DIR).join(name)).unwrap();
            }
        }
        assert!(binding.get("k", None).await.unwrap().is_none());
    }
}
