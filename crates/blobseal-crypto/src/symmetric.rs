use blobseal_core::{
    error::{CryptoError, Result},
    key_file::KeyFileRecord,
    provider::{ByteStream, CryptoProvider, ProviderKind},
};
use tracing::instrument;
use zeroize::Zeroizing;

use crate::{
    cipher::{self, DecryptingReader, EncryptingReader, Iv, SymmetricKey, BLOCK_SIZE, KEY_SIZE},
    segmented_stream::{Segment, SegmentedStream},
};

/// AES-256-CBC provider over a single shared key.
///
/// Layout: `IV(16) || ciphertext`.
pub struct SymmetricProvider {
    key: SymmetricKey,
}

impl SymmetricProvider {
    /// Provider with a freshly generated random key.
    pub fn generate() -> Self {
        Self {
            key: cipher::random_key(),
        }
    }

    pub fn from_key(key: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(CryptoError::EmptyOrMissingKeyMaterial);
        }
        let key: [u8; KEY_SIZE] = key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            found: key.len(),
        })?;
        Ok(Self {
            key: Zeroizing::new(key),
        })
    }

    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub(crate) fn encrypted_stream_with_iv(
        &self,
        source: ByteStream,
        iv: Iv,
    ) -> Result<ByteStream> {
        let transform = EncryptingReader::new(source, self.key.as_slice(), &iv)?;
        Ok(Box::new(SegmentedStream::new([
            Segment::from_bytes(iv.to_vec()),
            Segment::new(Box::new(transform)),
        ])))
    }
}

impl CryptoProvider for SymmetricProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Symmetric
    }

    #[instrument(skip_all, fields(kind = "symmetric"))]
    fn encrypted_stream(&self, source: ByteStream) -> Result<ByteStream> {
        self.encrypted_stream_with_iv(source, cipher::random_iv())
    }

    #[instrument(skip_all, fields(kind = "symmetric"))]
    fn decrypted_stream(&self, mut source: ByteStream) -> Result<ByteStream> {
        let header = cipher::read_header(&mut source, "iv", BLOCK_SIZE)?;
        let mut iv: Iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&header);

        let transform = DecryptingReader::new(source, self.key.as_slice(), &iv)?;
        Ok(Box::new(transform))
    }

    /// The key is always exported in full; a symmetric key has no public half.
    fn to_key_file_record(&self, _public_only: bool) -> Result<KeyFileRecord> {
        Ok(KeyFileRecord::new(
            ProviderKind::Symmetric,
            true,
            self.key.to_vec(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;
    use crate::registry;

    const KNOWN_KEY: [u8; KEY_SIZE] = [
        0x60, 0x3d, 0xeb, 0x10, 0x15, 0xca, 0x71, 0xbe, 0x2b, 0x73, 0xae, 0xf0, 0x85, 0x7d, 0x77,
        0x81, 0x1f, 0x35, 0x2c, 0x07, 0x3b, 0x61, 0x08, 0xd7, 0x2d, 0x98, 0x10, 0xa3, 0x09, 0x14,
        0xdf, 0xf4,
    ];

    fn read_all(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out).expect("read stream");
        out
    }

    fn encrypt(provider: &dyn CryptoProvider, plain: &[u8]) -> Vec<u8> {
        read_all(
            provider
                .encrypted_stream(Box::new(Cursor::new(plain.to_vec())))
                .expect("encrypt"),
        )
    }

    fn decrypt(provider: &dyn CryptoProvider, cipher: &[u8]) -> Vec<u8> {
        read_all(
            provider
                .decrypted_stream(Box::new(Cursor::new(cipher.to_vec())))
                .expect("decrypt"),
        )
    }

    #[test]
    fn round_trip_restores_plaintext() {
        let provider = SymmetricProvider::generate();
        let plain = b"the quick brown fox jumps over the lazy dog".repeat(100);

        let cipher = encrypt(&provider, &plain);
        assert_eq!(cipher.len(), BLOCK_SIZE + cipher::encrypted_len(plain.len() as u64) as usize);
        assert_eq!(decrypt(&provider, &cipher), plain);
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let provider = SymmetricProvider::generate();
        let cipher = encrypt(&provider, &[]);
        assert_eq!(cipher.len(), 2 * BLOCK_SIZE);
        assert!(decrypt(&provider, &cipher).is_empty());
    }

    #[test]
    fn ciphertext_differs_from_plaintext() {
        let provider = SymmetricProvider::generate();
        let plain = b"hello, storage".to_vec();
        let cipher = encrypt(&provider, &plain);

        assert_ne!(cipher, plain);
        assert_ne!(&cipher[..5], &plain[..5]);
    }

    #[test]
    fn fresh_iv_per_call() {
        let provider = SymmetricProvider::generate();
        let first = encrypt(&provider, b"same input");
        let second = encrypt(&provider, b"same input");
        assert_ne!(&first[..BLOCK_SIZE], &second[..BLOCK_SIZE]);
        assert_ne!(first, second);
    }

    #[test]
    fn known_key_and_iv_survive_key_file_round_trip() {
        let provider = SymmetricProvider::from_key(&KNOWN_KEY).expect("provider");
        let iv: Iv = [0x0f; BLOCK_SIZE];
        let cipher = read_all(
            provider
                .encrypted_stream_with_iv(Box::new(Cursor::new(vec![0x01, 0x02, 0x03])), iv)
                .expect("encrypt"),
        );
        assert_eq!(&cipher[..BLOCK_SIZE], &iv);

        let text = provider
            .to_key_file_record(false)
            .expect("record")
            .to_json()
            .expect("json");
        let restored = registry::from_key_file_str(&text).expect("restore");
        assert_eq!(restored.kind(), ProviderKind::Symmetric);
        assert_eq!(decrypt(restored.as_ref(), &cipher), vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn record_always_carries_key() {
        let provider = SymmetricProvider::from_key(&KNOWN_KEY).expect("provider");
        let record = provider.to_key_file_record(true).expect("record");
        assert_eq!(record.provider_tag, "symmetric");
        assert!(record.contains_private_key);
        assert_eq!(record.key_material, KNOWN_KEY.to_vec());
    }

    #[test]
    fn rejects_empty_and_wrong_length_keys() {
        let err = SymmetricProvider::from_key(&[]).err().expect("empty key");
        assert!(matches!(err, CryptoError::EmptyOrMissingKeyMaterial));

        let err = SymmetricProvider::from_key(&[1u8; 16]).err().expect("short key");
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength {
                expected: 32,
                found: 16
            }
        ));
    }

    #[test]
    fn truncated_iv_is_reported() {
        let provider = SymmetricProvider::generate();
        let err = provider
            .decrypted_stream(Box::new(Cursor::new(vec![0u8; 7])))
            .err()
            .expect("should fail");
        assert!(matches!(
            err,
            CryptoError::TruncatedStreamHeader {
                segment: "iv",
                expected: BLOCK_SIZE,
                found: 7
            }
        ));
    }

    #[test]
    fn wrong_key_does_not_reveal_plaintext() {
        let plain = b"attack at dawn, bring snacks".to_vec();
        let cipher = encrypt(&SymmetricProvider::generate(), &plain);

        let other = SymmetricProvider::generate();
        let mut out = Vec::new();
        let result = other
            .decrypted_stream(Box::new(Cursor::new(cipher)))
            .expect("header parses")
            .read_to_end(&mut out);
        assert!(result.is_err() || out != plain);
    }
}
