//! Test bindings.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::binding::{
    collect_bytes, Binding, ByteStream, Capabilities, Capability, GetOptions, ObjectBody,
    PutOptions,
};
use crate::error::BoxError;

#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub key: String,
    pub body: Bytes,
    pub options: Option<PutOptions>,
}

/// Records every call and stores nothing.
#[derive(Default)]
pub struct RecordingBinding {
    puts: Mutex<Vec<RecordedPut>>,
    gets: Mutex<Vec<(String, Option<GetOptions>)>>,
    deletes: Mutex<Vec<String>>,
}

impl RecordingBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<(String, Option<GetOptions>)> {
        self.gets.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Binding for RecordingBinding {
    async fn get(
        &self,
        key: &str,
        options: Option<GetOptions>,
    ) -> Result<Option<ObjectBody>, BoxError> {
        self.gets.lock().unwrap().push((key.to_string(), options));
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        options: Option<PutOptions>,
    ) -> Result<(), BoxError> {
        let body = collect_bytes(body).await?;
        self.puts.lock().unwrap().push(RecordedPut {
            key: key.to_string(),
            body,
            options,
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BoxError> {
        self.deletes.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// Advertises every required capability except the ones it was built
/// without.
pub struct PartialBinding {
    capabilities: Capabilities,
}

impl PartialBinding {
    pub fn without(missing: &[Capability]) -> Arc<Self> {
        let mut capabilities = Capabilities::REQUIRED;
        for capability in missing {
            match capability {
                Capability::Get => capabilities.get = false,
                Capability::Put => capabilities.put = false,
                Capability::Delete => capabilities.delete = false,
                Capability::Head => capabilities.head = false,
                Capability::List => capabilities.list = false,
            }
        }
        Arc::new(Self { capabilities })
    }
}

#[async_trait]
impl Binding for PartialBinding {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn get(
        &self,
        _key: &str,
        _options: Option<GetOptions>,
    ) -> Result<Option<ObjectBody>, BoxError> {
        unreachable!("resolver must reject partial bindings")
    }

    async fn put(
        &self,
        _key: &str,
        _body: ByteStream,
        _options: Option<PutOptions>,
    ) -> Result<(), BoxError> {
        unreachable!("resolver must reject partial bindings")
    }

    async fn delete(&self, _key: &str) -> Result<(), BoxError> {
        unreachable!("resolver must reject partial bindings")
    }
}

/// Fails every operation with an `io::Error` of the given kind.
pub struct FailingBinding {
    kind: std::io::ErrorKind,
}

impl FailingBinding {
    pub const MESSAGE: &'static str = "backend unavailable";

    pub fn new(kind: std::io::ErrorKind) -> Self {
        Self { kind }
    }

    fn fail(&self) -> BoxError {
        Box::new(std::io::Error::new(self.kind, Self::MESSAGE))
    }
}

#[async_trait]
impl Binding for FailingBinding {
    async fn get(
        &self,
        _key: &str,
        _options: Option<GetOptions>,
    ) -> Result<Option<ObjectBody>, BoxError> {
        Err(self.fail())
    }

    async fn put(
        &self,
        _key: &str,
        _body: ByteStream,
        _options: Option<PutOptions>,
    ) -> Result<(), BoxError> {
        Err(self.fail())
    }

    async fn delete(&self, _key: &str) -> Result<(), BoxError> {
        Err(self.fail())
    }
}
