//! Access to RSA key material behind an encrypt/decrypt capability.
//!
//! A [`KeyHandleFactory`] is chosen once per provider. `Reexporting` imports a
//! fresh handle from exported key bytes for every operation and drops it when the
//! operation ends. `Caching` keeps the single live handle of a key whose store
//! refuses export, and serializes every use of it behind a mutex.

use std::{
    ops::Deref,
    sync::{Mutex, MutexGuard},
};

use rand::rngs::OsRng;
use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    traits::PublicKeyParts,
    Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
};
use thiserror::Error;
use tracing::{debug, instrument, trace};
use zeroize::Zeroizing;

use blobseal_core::error::{CryptoError, Result};

pub const DEFAULT_KEY_SIZE_BITS: usize = 4096;
pub const MIN_KEY_SIZE_BITS: usize = 1024;

/// Why a key container would not hand out its private key.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The store keeps the key in place; it can still be used through the container.
    #[error("key store does not allow exporting the private key")]
    Denied,
    #[error("no private key available")]
    NoPrivateKey,
    #[error("key store failure: {0}")]
    Backend(String),
}

/// An RSA key held by an external store, such as a certificate store entry or a token.
pub trait KeyContainer: Send {
    fn public_key(&self) -> &RsaPublicKey;

    fn has_private_key(&self) -> bool;

    fn export_private_key(&self) -> Result<RsaPrivateKey, ExportError>;

    /// Run the private-key operation inside the store.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// In-process [`KeyContainer`], optionally refusing export like a protected store.
pub struct SoftwareKeyContainer {
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
    exportable: bool,
}

impl SoftwareKeyContainer {
    pub fn exportable(private: RsaPrivateKey) -> Self {
        Self {
            public: private.to_public_key(),
            private: Some(private),
            exportable: true,
        }
    }

    /// Private key usable in place but never exported.
    pub fn protected(private: RsaPrivateKey) -> Self {
        Self {
            public: private.to_public_key(),
            private: Some(private),
            exportable: false,
        }
    }

    pub fn public_only(public: RsaPublicKey) -> Self {
        Self {
            public,
            private: None,
            exportable: true,
        }
    }
}

impl KeyContainer for SoftwareKeyContainer {
    fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    fn has_private_key(&self) -> bool {
        self.private.is_some()
    }

    fn export_private_key(&self) -> Result<RsaPrivateKey, ExportError> {
        match &self.private {
            None => Err(ExportError::NoPrivateKey),
            Some(_) if !self.exportable => Err(ExportError::Denied),
            Some(key) => Ok(key.clone()),
        }
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let key = self.private.as_ref().ok_or(CryptoError::MissingPrivateKey)?;
        key.decrypt(Pkcs1v15Encrypt, ciphertext).map_err(CryptoError::crypto)
    }
}

enum KeyAccess {
    /// Key imported from exported bytes; private half absent for public-only blobs.
    Imported {
        public: RsaPublicKey,
        private: Option<RsaPrivateKey>,
    },
    /// Key that only exists inside its store.
    InPlace(Box<dyn KeyContainer>),
}

/// Capability object over one RSA key.
pub struct KeyHandle {
    access: KeyAccess,
    key_size_bits: usize,
}

impl KeyHandle {
    /// Import a handle from a PKCS#8 private key or SPKI public key in DER form.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        if blob.is_empty() {
            return Err(CryptoError::EmptyOrMissingKeyMaterial);
        }

        let (public, private) = match RsaPrivateKey::from_pkcs8_der(blob) {
            Ok(private) => (private.to_public_key(), Some(private)),
            Err(_) => {
                let public = RsaPublicKey::from_public_key_der(blob).map_err(|err| {
                    CryptoError::InvalidKeyMaterial {
                        reason: format!("not a PKCS#8 private key or SPKI public key: {err}"),
                    }
                })?;
                (public, None)
            }
        };

        Ok(Self::imported(public, private))
    }

    fn imported(public: RsaPublicKey, private: Option<RsaPrivateKey>) -> Self {
        let key_size_bits = public.size() * 8;
        Self {
            access: KeyAccess::Imported { public, private },
            key_size_bits,
        }
    }

    fn in_place(container: Box<dyn KeyContainer>) -> Self {
        let key_size_bits = container.public_key().size() * 8;
        Self {
            access: KeyAccess::InPlace(container),
            key_size_bits,
        }
    }

    pub fn has_private_key(&self) -> bool {
        match &self.access {
            KeyAccess::Imported { private, .. } => private.is_some(),
            KeyAccess::InPlace(container) => container.has_private_key(),
        }
    }

    pub fn is_exportable(&self) -> bool {
        matches!(self.access, KeyAccess::Imported { .. })
    }

    pub fn key_size_bits(&self) -> usize {
        self.key_size_bits
    }

    fn public_key(&self) -> &RsaPublicKey {
        match &self.access {
            KeyAccess::Imported { public, .. } => public,
            KeyAccess::InPlace(container) => container.public_key(),
        }
    }

    /// Public-key operation; always available.
    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>> {
        self.public_key()
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, plain)
            .map_err(CryptoError::crypto)
    }

    /// Private-key operation; fails with `MissingPrivateKey` on public-only keys.
    pub fn decrypt(&self, cipher: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let plain = match &self.access {
            KeyAccess::Imported {
                private: Some(private),
                ..
            } => private
                .decrypt(Pkcs1v15Encrypt, cipher)
                .map_err(CryptoError::crypto)?,
            KeyAccess::Imported { private: None, .. } => {
                return Err(CryptoError::MissingPrivateKey);
            }
            KeyAccess::InPlace(container) => {
                if !container.has_private_key() {
                    return Err(CryptoError::MissingPrivateKey);
                }
                container.decrypt(cipher)?
            }
        };
        Ok(Zeroizing::new(plain))
    }

    pub fn public_key_blob(&self) -> Result<Vec<u8>> {
        export_public(self.public_key())
    }

    /// Full key bytes when the private key is present and exportable, otherwise the
    /// public key. The flag reports whether private material was included.
    pub fn export_blob(&self, public_only: bool) -> Result<(Zeroizing<Vec<u8>>, bool)> {
        match &self.access {
            KeyAccess::Imported {
                private: Some(private),
                ..
            } if !public_only => Ok((export_private(private)?, true)),
            _ => Ok((Zeroizing::new(self.public_key_blob()?), false)),
        }
    }
}

impl Drop for KeyHandle {
    fn drop(&mut self) {
        trace!(bits = self.key_size_bits, "releasing key handle");
    }
}

/// How a provider obtains its [`KeyHandle`] for each operation.
pub enum KeyHandleFactory {
    /// Import a transient handle from `key_blob` per request.
    Reexporting {
        key_blob: Zeroizing<Vec<u8>>,
        key_size_bits: usize,
    },
    /// Share one live handle for a key that cannot leave its store.
    Caching {
        live: Mutex<KeyHandle>,
        key_size_bits: usize,
    },
}

/// Scoped access to a key handle; dropping it releases a transient handle or the lock.
pub enum HandleGuard<'a> {
    Transient(KeyHandle),
    Cached(MutexGuard<'a, KeyHandle>),
}

impl Deref for HandleGuard<'_> {
    type Target = KeyHandle;

    fn deref(&self) -> &KeyHandle {
        match self {
            HandleGuard::Transient(handle) => handle,
            HandleGuard::Cached(guard) => &**guard,
        }
    }
}

impl KeyHandleFactory {
    /// Generate a fresh key pair of `key_size_bits`.
    #[instrument]
    pub fn generate(key_size_bits: usize) -> Result<Self> {
        if key_size_bits % 8 != 0 {
            return Err(CryptoError::InvalidKeySize {
                bits: key_size_bits,
            });
        }
        check_key_size(key_size_bits)?;
        let private = RsaPrivateKey::new(&mut OsRng, key_size_bits).map_err(CryptoError::crypto)?;
        let key_size_bits = private.size() * 8;
        Ok(KeyHandleFactory::Reexporting {
            key_blob: export_private(&private)?,
            key_size_bits,
        })
    }

    /// Re-exporting factory over previously exported key bytes.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        let handle = KeyHandle::from_blob(blob)?;
        check_key_size(handle.key_size_bits())?;
        Ok(KeyHandleFactory::Reexporting {
            key_blob: Zeroizing::new(blob.to_vec()),
            key_size_bits: handle.key_size_bits(),
        })
    }

    /// Pick a strategy for key material living in an external store.
    ///
    /// Public-only material and exportable private keys become `Reexporting`; a
    /// private key the store refuses to export is kept alive as `Caching`.
    pub fn from_container(
        container: Box<dyn KeyContainer>,
        load_private_key_if_available: bool,
    ) -> Result<Self> {
        let key_size_bits = container.public_key().size() * 8;
        check_key_size(key_size_bits)?;

        if !load_private_key_if_available || !container.has_private_key() {
            debug!(key_size_bits, "using public key only");
            return Ok(KeyHandleFactory::Reexporting {
                key_blob: Zeroizing::new(export_public(container.public_key())?),
                key_size_bits,
            });
        }

        match container.export_private_key() {
            Ok(private) => {
                debug!(key_size_bits, "private key exportable, re-exporting per call");
                Ok(KeyHandleFactory::Reexporting {
                    key_blob: export_private(&private)?,
                    key_size_bits,
                })
            }
            Err(ExportError::Denied) => {
                debug!(key_size_bits, "private key not exportable, caching live handle");
                Ok(KeyHandleFactory::Caching {
                    live: Mutex::new(KeyHandle::in_place(container)),
                    key_size_bits,
                })
            }
            Err(ExportError::NoPrivateKey) => Err(CryptoError::MissingPrivateKey),
            Err(ExportError::Backend(reason)) => Err(CryptoError::KeyHandle { reason }),
        }
    }

    pub fn key_size_bits(&self) -> usize {
        match self {
            KeyHandleFactory::Reexporting { key_size_bits, .. }
            | KeyHandleFactory::Caching { key_size_bits, .. } => *key_size_bits,
        }
    }

    pub fn is_caching(&self) -> bool {
        matches!(self, KeyHandleFactory::Caching { .. })
    }

    /// Obtain a handle for the duration of one operation.
    pub fn acquire(&self) -> Result<HandleGuard<'_>> {
        match self {
            KeyHandleFactory::Reexporting { key_blob, .. } => {
                KeyHandle::from_blob(key_blob).map(HandleGuard::Transient)
            }
            KeyHandleFactory::Caching { live, .. } => live
                .lock()
                .map(HandleGuard::Cached)
                .map_err(|err| CryptoError::KeyHandle {
                    reason: format!("lock poisoned: {err}"),
                }),
        }
    }
}

fn check_key_size(bits: usize) -> Result<()> {
    if bits < MIN_KEY_SIZE_BITS {
        return Err(CryptoError::InvalidKeySize { bits });
    }
    Ok(())
}

fn export_private(private: &RsaPrivateKey) -> Result<Zeroizing<Vec<u8>>> {
    let document = private.to_pkcs8_der().map_err(CryptoError::crypto)?;
    Ok(Zeroizing::new(document.as_bytes().to_vec()))
}

fn export_public(public: &RsaPublicKey) -> Result<Vec<u8>> {
    let document = public.to_public_key_der().map_err(CryptoError::crypto)?;
    Ok(document.as_bytes().to_vec())
}
