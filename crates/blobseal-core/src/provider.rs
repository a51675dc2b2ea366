use std::{fmt, io::Read};

use crate::{error::Result, key_file::KeyFileRecord};

/// Owned, forward-only byte source handed between providers, stores and callers.
pub type ByteStream = Box<dyn Read + Send>;

/// Concrete provider kinds known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Symmetric,
    Asymmetric,
}

impl ProviderKind {
    /// Tag written into key files.
    pub fn tag(self) -> &'static str {
        match self {
            ProviderKind::Symmetric => "symmetric",
            ProviderKind::Asymmetric => "asymmetric",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Streaming encryption contract shared by the symmetric and hybrid providers.
///
/// Encryption never buffers the source: the returned stream pulls from it lazily.
/// Decryption parses the header off the front of the source before returning, so
/// header problems surface here rather than on the first `read`.
pub trait CryptoProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Wrap `source` so that reading the result yields the encrypted layout.
    fn encrypted_stream(&self, source: ByteStream) -> Result<ByteStream>;

    /// Consume the header of `source` and return a stream of plaintext.
    fn decrypted_stream(&self, source: ByteStream) -> Result<ByteStream>;

    /// Export key material into a flat record, omitting private material when
    /// `public_only` is set or when the key cannot leave its store.
    fn to_key_file_record(&self, public_only: bool) -> Result<KeyFileRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        assert_eq!(ProviderKind::Symmetric.tag(), "symmetric");
        assert_eq!(ProviderKind::Asymmetric.to_string(), "asymmetric");
    }
}
