use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    error::{CryptoError, Result},
    provider::ProviderKind,
};

/// Serialized provider key material. Never log `key_material`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFileRecord {
    pub provider_tag: String,
    pub contains_private_key: bool,
    #[serde(with = "base64_bytes")]
    pub key_material: Vec<u8>,
}

impl KeyFileRecord {
    pub fn new(kind: ProviderKind, contains_private_key: bool, key_material: Vec<u8>) -> Self {
        Self {
            provider_tag: kind.tag().to_string(),
            contains_private_key,
            key_material,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(CryptoError::malformed)
    }

    /// Parse a record from its JSON text form.
    pub fn from_json(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(CryptoError::malformed("key file is empty"));
        }
        serde_json::from_str(text).map_err(CryptoError::malformed)
    }
}

impl std::fmt::Debug for KeyFileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFileRecord")
            .field("provider_tag", &self.provider_tag)
            .field("contains_private_key", &self.contains_private_key)
            .field("key_material", &format_args!("<{} bytes>", self.key_material.len()))
            .finish()
    }
}

impl Drop for KeyFileRecord {
    fn drop(&mut self) {
        self.key_material.zeroize();
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_camel_case_and_base64() {
        let record = KeyFileRecord::new(ProviderKind::Symmetric, true, vec![1, 2, 3]);
        let json = record.to_json().expect("serialize");
        assert_eq!(
            json,
            r#"{"providerTag":"symmetric","containsPrivateKey":true,"keyMaterial":"AQID"}"#
        );

        let parsed = KeyFileRecord::from_json(&json).expect("parse");
        assert_eq!(parsed, record);
    }

    #[test]
    fn rejects_empty_and_garbage_text() {
        let err = KeyFileRecord::from_json("   ").expect_err("empty should fail");
        assert!(matches!(err, CryptoError::MalformedKeyFile { .. }));

        let err = KeyFileRecord::from_json("{not json").expect_err("garbage should fail");
        assert!(matches!(err, CryptoError::MalformedKeyFile { .. }));
    }

    #[test]
    fn rejects_invalid_base64_material() {
        let text = r#"{"providerTag":"symmetric","containsPrivateKey":true,"keyMaterial":"%%%"}"#;
        let err = KeyFileRecord::from_json(text).expect_err("bad base64 should fail");
        assert!(matches!(err, CryptoError::MalformedKeyFile { .. }));
    }

    #[test]
    fn debug_output_hides_key_bytes() {
        let record = KeyFileRecord::new(ProviderKind::Asymmetric, false, vec![0xAB; 4]);
        let rendered = format!("{record:?}");
        assert!(rendered.contains("<4 bytes>"));
        assert!(!rendered.contains("171"));
    }
}
