use std::{
    collections::HashMap,
    io::{Cursor, Read},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::instrument;

use crate::provider::ByteStream;

/// Errors produced by blob storage implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlobStoreError {
    /// Requested blob does not exist.
    #[error("blob not found: {name}")]
    NotFound { name: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Opaque object storage: readable bytes in, readable bytes out.
/// Implementations never see plaintext when used through the encrypted helpers.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store everything `stream` yields under `name`, replacing any existing blob.
    async fn upload(&self, name: &str, stream: ByteStream) -> Result<(), BlobStoreError>;

    /// Open the blob stored under `name` for reading.
    async fn download(&self, name: &str) -> Result<ByteStream, BlobStoreError>;

    /// Remove a blob (idempotent).
    async fn delete(&self, name: &str) -> Result<(), BlobStoreError>;
}

/// In-memory blob store for tests and smoke runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBlobStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes exactly as uploaded, bypassing any decryption.
    pub fn raw(&self, name: &str) -> Option<Vec<u8>> {
        self.inner.lock().ok()?.get(name).cloned()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    #[instrument(skip(self, stream))]
    async fn upload(&self, name: &str, mut stream: ByteStream) -> Result<(), BlobStoreError> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).map_err(storage_err)?;

        let mut map = self.inner.lock().map_err(|err| BlobStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.insert(name.to_string(), bytes);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn download(&self, name: &str) -> Result<ByteStream, BlobStoreError> {
        let map = self.inner.lock().map_err(|err| BlobStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        let bytes = map
            .get(name)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound {
                name: name.to_string(),
            })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn delete(&self, name: &str) -> Result<(), BlobStoreError> {
        let mut map = self.inner.lock().map_err(|err| BlobStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.remove(name);
        Ok(())
    }
}

pub fn storage_err<E: ToString>(err: E) -> BlobStoreError {
    BlobStoreError::Storage {
        reason: err.to_string(),
    }
}
