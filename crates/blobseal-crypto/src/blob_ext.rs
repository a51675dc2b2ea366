//! Encrypt-on-upload and decrypt-on-download helpers over any [`BlobStore`].

use std::{
    fs::File,
    io::{self, Cursor},
    path::Path,
};

use blobseal_core::{
    blob_store::{BlobStore, BlobStoreError},
    error::CryptoError,
    provider::{ByteStream, CryptoProvider},
};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum BlobCryptoError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] BlobStoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Encrypt `source` with `provider` and store the result under `name`.
#[instrument(skip_all, fields(name = %name, kind = %provider.kind()))]
pub async fn upload_encrypted(
    store: &dyn BlobStore,
    provider: &dyn CryptoProvider,
    name: &str,
    source: ByteStream,
) -> Result<(), BlobCryptoError> {
    let encrypted = provider.encrypted_stream(source)?;
    store.upload(name, encrypted).await?;
    Ok(())
}

/// Fetch the blob stored under `name` and return a stream of its plaintext.
#[instrument(skip_all, fields(name = %name, kind = %provider.kind()))]
pub async fn download_decrypted(
    store: &dyn BlobStore,
    provider: &dyn CryptoProvider,
    name: &str,
) -> Result<ByteStream, BlobCryptoError> {
    let encrypted = store.download(name).await?;
    Ok(provider.decrypted_stream(encrypted)?)
}

pub async fn upload_bytes_encrypted(
    store: &dyn BlobStore,
    provider: &dyn CryptoProvider,
    name: &str,
    bytes: Vec<u8>,
) -> Result<(), BlobCryptoError> {
    upload_encrypted(store, provider, name, Box::new(Cursor::new(bytes))).await
}

pub async fn upload_file_encrypted(
    store: &dyn BlobStore,
    provider: &dyn CryptoProvider,
    name: &str,
    path: impl AsRef<Path>,
) -> Result<(), BlobCryptoError> {
    let file = File::open(path.as_ref())?;
    upload_encrypted(store, provider, name, Box::new(file)).await
}

/// Download and decrypt `name` into `path`; returns the plaintext byte count.
///
/// The output is written to a sibling temp file first, so a failed decrypt never
/// leaves a partial file at `path`.
pub async fn download_file_decrypted(
    store: &dyn BlobStore,
    provider: &dyn CryptoProvider,
    name: &str,
    path: impl AsRef<Path>,
) -> Result<u64, BlobCryptoError> {
    let path = path.as_ref();
    let mut plain = download_decrypted(store, provider, name).await?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    let written = io::copy(&mut plain, &mut tmp)?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(written)
}
