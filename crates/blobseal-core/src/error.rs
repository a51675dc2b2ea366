use thiserror::Error;

/// Errors produced while building providers, parsing stream headers, or handling key files.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key record text could not be parsed, or its flags disagree with its key material.
    #[error("malformed key file: {reason}")]
    MalformedKeyFile { reason: String },
    /// A provider was constructed from empty key input.
    #[error("key material is empty or missing")]
    EmptyOrMissingKeyMaterial,
    /// A private-key operation was attempted on a public-only key.
    #[error("unable to decrypt: the private key is not available")]
    MissingPrivateKey,
    /// The encrypted stream ended before its header was complete.
    #[error("truncated stream header: {segment} needs {expected} bytes, found {found}")]
    TruncatedStreamHeader {
        segment: &'static str,
        expected: usize,
        found: usize,
    },
    /// The key record names a provider kind the registry does not know.
    #[error("unsupported provider type: {tag}")]
    UnsupportedProviderType { tag: String },
    #[error("invalid key length: expected {expected} bytes, got {found}")]
    InvalidKeyLength { expected: usize, found: usize },
    #[error("invalid key material: {reason}")]
    InvalidKeyMaterial { reason: String },
    #[error("unsupported RSA key size: {bits} bits")]
    InvalidKeySize { bits: usize },
    /// Key store failure other than a refused export.
    #[error("key handle failure: {reason}")]
    KeyHandle { reason: String },
    /// A cryptographic primitive rejected its input.
    #[error("crypto failure: {reason}")]
    Crypto { reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    pub fn crypto<E: ToString>(err: E) -> Self {
        CryptoError::Crypto {
            reason: err.to_string(),
        }
    }

    pub fn malformed<E: ToString>(err: E) -> Self {
        CryptoError::MalformedKeyFile {
            reason: err.to_string(),
        }
    }
}

pub type Result<T, E = CryptoError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_header_message_names_segment() {
        let err = CryptoError::TruncatedStreamHeader {
            segment: "iv",
            expected: 16,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "truncated stream header: iv needs 16 bytes, found 3"
        );
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: CryptoError = io.into();
        assert!(matches!(err, CryptoError::Io(_)));
    }
}
