//! Closed mapping from key-file provider tags to provider constructors.

use std::{fs, io::Write, path::Path};

use blobseal_core::{
    error::{CryptoError, Result},
    key_file::KeyFileRecord,
    provider::CryptoProvider,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::{asymmetric::AsymmetricProvider, symmetric::SymmetricProvider};

type Constructor = fn(&KeyFileRecord) -> Result<Box<dyn CryptoProvider>>;

const PROVIDERS: &[(&str, Constructor)] = &[
    ("symmetric", symmetric_from_record),
    ("asymmetric", asymmetric_from_record),
];

/// Rebuild a provider from its key-file record.
pub fn from_key_file_record(record: &KeyFileRecord) -> Result<Box<dyn CryptoProvider>> {
    let (_, constructor) = PROVIDERS
        .iter()
        .find(|(tag, _)| *tag == record.provider_tag)
        .ok_or_else(|| CryptoError::UnsupportedProviderType {
            tag: record.provider_tag.clone(),
        })?;
    constructor(record)
}

pub fn from_key_file_str(text: &str) -> Result<Box<dyn CryptoProvider>> {
    from_key_file_record(&KeyFileRecord::from_json(text)?)
}

#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn from_key_file(path: impl AsRef<Path>) -> Result<Box<dyn CryptoProvider>> {
    let text = fs::read_to_string(path.as_ref())?;
    from_key_file_str(&text)
}

/// Write the provider's key record as JSON, replacing `path` atomically.
#[instrument(skip_all, fields(path = %path.as_ref().display(), public_only = public_only))]
pub fn write_key_file(
    provider: &dyn CryptoProvider,
    path: impl AsRef<Path>,
    public_only: bool,
) -> Result<()> {
    let path = path.as_ref();
    let record = provider.to_key_file_record(public_only)?;
    let json = record.to_json()?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|err| err.error)?;

    debug!(
        kind = %provider.kind(),
        contains_private_key = record.contains_private_key,
        "key file written"
    );
    Ok(())
}

fn symmetric_from_record(record: &KeyFileRecord) -> Result<Box<dyn CryptoProvider>> {
    let provider = SymmetricProvider::from_key(&record.key_material)?;
    // A symmetric key always decrypts, so its record can never be public-only.
    if !record.contains_private_key {
        return Err(CryptoError::malformed(
            "containsPrivateKey is false but a symmetric key always decrypts",
        ));
    }
    Ok(Box::new(provider))
}

fn asymmetric_from_record(record: &KeyFileRecord) -> Result<Box<dyn CryptoProvider>> {
    let provider = AsymmetricProvider::from_key_blob(&record.key_material)?;
    let has_private = provider.has_private_key()?;
    if has_private != record.contains_private_key {
        return Err(CryptoError::malformed(format!(
            "containsPrivateKey is {} but the key material {} a private key",
            record.contains_private_key,
            if has_private { "holds" } else { "lacks" }
        )));
    }
    Ok(Box::new(provider))
}
