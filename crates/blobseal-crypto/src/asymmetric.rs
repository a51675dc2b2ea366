use blobseal_core::{
    error::{CryptoError, Result},
    key_file::KeyFileRecord,
    provider::{ByteStream, CryptoProvider, ProviderKind},
};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::{
    cipher::{self, DecryptingReader, EncryptingReader, Iv, BLOCK_SIZE, KEY_SIZE},
    key_handle::{KeyContainer, KeyHandleFactory, DEFAULT_KEY_SIZE_BITS},
    segmented_stream::{Segment, SegmentedStream},
};

/// Hybrid provider: a fresh AES-256 session key per stream, wrapped with RSA.
///
/// Layout: `wrappedSessionKey(key_size_bits / 8) || IV(16) || ciphertext`.
pub struct AsymmetricProvider {
    factory: KeyHandleFactory,
}

impl AsymmetricProvider {
    /// Provider over a freshly generated key pair of `key_size_bits`.
    pub fn generate(key_size_bits: usize) -> Result<Self> {
        Ok(Self {
            factory: KeyHandleFactory::generate(key_size_bits)?,
        })
    }

    pub fn generate_default() -> Result<Self> {
        Self::generate(DEFAULT_KEY_SIZE_BITS)
    }

    /// Provider over a PKCS#8 private key or SPKI public key in DER form.
    pub fn from_key_blob(blob: &[u8]) -> Result<Self> {
        Ok(Self {
            factory: KeyHandleFactory::from_blob(blob)?,
        })
    }

    pub fn from_container(
        container: Box<dyn KeyContainer>,
        load_private_key_if_available: bool,
    ) -> Result<Self> {
        Ok(Self {
            factory: KeyHandleFactory::from_container(container, load_private_key_if_available)?,
        })
    }

    pub fn key_size_bits(&self) -> usize {
        self.factory.key_size_bits()
    }

    pub fn has_private_key(&self) -> Result<bool> {
        Ok(self.factory.acquire()?.has_private_key())
    }

    /// Full key bytes when the private key is exportable, otherwise the public key.
    pub fn key_blob(&self) -> Result<Zeroizing<Vec<u8>>> {
        let (blob, _) = self.factory.acquire()?.export_blob(false)?;
        Ok(blob)
    }

    pub fn public_key_blob(&self) -> Result<Vec<u8>> {
        self.factory.acquire()?.public_key_blob()
    }

    fn wrapped_key_len(&self) -> usize {
        self.key_size_bits() / 8
    }
}

impl CryptoProvider for AsymmetricProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Asymmetric
    }

    #[instrument(skip_all, fields(kind = "asymmetric", bits = self.key_size_bits()))]
    fn encrypted_stream(&self, source: ByteStream) -> Result<ByteStream> {
        let session_key = cipher::random_key();
        let wrapped = self.factory.acquire()?.encrypt(session_key.as_slice())?;

        let iv = cipher::random_iv();
        let transform = EncryptingReader::new(source, session_key.as_slice(), &iv)?;

        Ok(Box::new(SegmentedStream::new([
            Segment::from_bytes(wrapped),
            Segment::from_bytes(iv.to_vec()),
            Segment::new(Box::new(transform)),
        ])))
    }

    #[instrument(skip_all, fields(kind = "asymmetric", bits = self.key_size_bits()))]
    fn decrypted_stream(&self, mut source: ByteStream) -> Result<ByteStream> {
        let wrapped = cipher::read_header(&mut source, "session key", self.wrapped_key_len())?;
        let session_key = self.factory.acquire()?.decrypt(&wrapped)?;
        if session_key.len() != KEY_SIZE {
            return Err(CryptoError::Crypto {
                reason: format!(
                    "unwrapped session key is {} bytes, expected {KEY_SIZE}",
                    session_key.len()
                ),
            });
        }

        let header = cipher::read_header(&mut source, "iv", BLOCK_SIZE)?;
        let mut iv: Iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&header);

        let transform = DecryptingReader::new(source, session_key.as_slice(), &iv)?;
        Ok(Box::new(transform))
    }

    fn to_key_file_record(&self, public_only: bool) -> Result<KeyFileRecord> {
        let (blob, contains_private_key) = self.factory.acquire()?.export_blob(public_only)?;
        if !public_only && !contains_private_key {
            debug!("exporting public key only");
        }
        Ok(KeyFileRecord::new(
            ProviderKind::Asymmetric,
            contains_private_key,
            blob.to_vec(),
        ))
    }
}
