use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use blobseal_core::{
    error::CryptoError,
    key_file::KeyFileRecord,
    provider::{CryptoProvider, ProviderKind},
};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{registry, symmetric::SymmetricProvider};

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Persists one key-file record (OS keychain in production; memory in tests).
#[async_trait]
pub trait KeyRecordStore: Send + Sync {
    async fn load(&self) -> Result<Option<KeyFileRecord>, KeyStoreError>;

    async fn save(&self, record: &KeyFileRecord) -> Result<(), KeyStoreError>;

    /// Remove the stored record (idempotent).
    async fn delete(&self) -> Result<(), KeyStoreError>;
}

/// OS keyring-backed store. The record's JSON form is kept as the entry's password.
pub struct KeyringRecordStore {
    service: String,
    account: String,
}

impl KeyringRecordStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, KeyStoreError> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyStoreError::Keyring(e.to_string()))
    }
}

#[async_trait]
impl KeyRecordStore for KeyringRecordStore {
    #[instrument(skip_all, fields(service = %self.service, account = %self.account))]
    async fn load(&self) -> Result<Option<KeyFileRecord>, KeyStoreError> {
        // Keyring operations are synchronous; wrapped in async for trait compatibility.
        match self.entry()?.get_password() {
            Ok(secret) => decode_record(&secret).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(KeyStoreError::Keyring(err.to_string())),
        }
    }

    #[instrument(skip_all, fields(service = %self.service, account = %self.account))]
    async fn save(&self, record: &KeyFileRecord) -> Result<(), KeyStoreError> {
        let secret = record.to_json()?;
        self.entry()?
            .set_password(&secret)
            .map_err(|e| KeyStoreError::Keyring(e.to_string()))
    }

    async fn delete(&self) -> Result<(), KeyStoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(KeyStoreError::Keyring(err.to_string())),
        }
    }
}

/// In-memory record store for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    inner: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl KeyRecordStore for InMemoryRecordStore {
    async fn load(&self) -> Result<Option<KeyFileRecord>, KeyStoreError> {
        let guard = self
            .inner
            .lock()
            .map_err(|err| KeyStoreError::Keyring(format!("lock poisoned: {err}")))?;
        guard.as_deref().map(decode_record).transpose()
    }

    async fn save(&self, record: &KeyFileRecord) -> Result<(), KeyStoreError> {
        let secret = record.to_json()?;
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyStoreError::Keyring(format!("lock poisoned: {err}")))?;
        *guard = Some(secret);
        Ok(())
    }

    async fn delete(&self) -> Result<(), KeyStoreError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyStoreError::Keyring(format!("lock poisoned: {err}")))?;
        *guard = None;
        Ok(())
    }
}

/// Provider rebuilt from the stored record, if there is one.
pub async fn load_provider(
    store: &dyn KeyRecordStore,
) -> Result<Option<Box<dyn CryptoProvider>>, KeyStoreError> {
    match store.load().await? {
        Some(record) => Ok(Some(registry::from_key_file_record(&record)?)),
        None => Ok(None),
    }
}

/// Load the stored symmetric provider, or generate one and save it.
pub async fn get_or_create_symmetric(
    store: &dyn KeyRecordStore,
) -> Result<SymmetricProvider, KeyStoreError> {
    if let Some(record) = store.load().await? {
        if record.provider_tag != ProviderKind::Symmetric.tag() {
            return Err(KeyStoreError::Decode(format!(
                "stored key is {}, expected symmetric",
                record.provider_tag
            )));
        }
        return Ok(SymmetricProvider::from_key(&record.key_material)?);
    }

    let provider = SymmetricProvider::generate();
    store.save(&provider.to_key_file_record(false)?).await?;
    debug!("generated new symmetric key");
    Ok(provider)
}

fn decode_record(secret: &str) -> Result<KeyFileRecord, KeyStoreError> {
    KeyFileRecord::from_json(secret).map_err(|e| KeyStoreError::Decode(e.to_string()))
}
