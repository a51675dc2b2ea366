use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use blobseal_core::{
    blob_store::{storage_err, BlobStore, BlobStoreError},
    provider::ByteStream,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// File-backed implementation of the shared `BlobStore` contract.
/// One file per blob under `root`; names are base64url-encoded into file names.
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(sanitize_name(name))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    #[instrument(skip_all, fields(name = %name))]
    async fn upload(&self, name: &str, mut stream: ByteStream) -> Result<(), BlobStoreError> {
        fs::create_dir_all(&self.root).map_err(storage_err)?;

        let mut tmp = NamedTempFile::new_in(&self.root).map_err(storage_err)?;
        let written = io::copy(&mut stream, &mut tmp).map_err(storage_err)?;
        tmp.flush().map_err(storage_err)?;
        tmp.persist(self.path_for(name))
            .map_err(|e| storage_err(e.error))?;

        debug!(bytes = written, "blob stored");
        Ok(())
    }

    #[instrument(skip_all, fields(name = %name))]
    async fn download(&self, name: &str) -> Result<ByteStream, BlobStoreError> {
        let file = File::open(self.path_for(name)).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                BlobStoreError::NotFound {
                    name: name.to_string(),
                }
            } else {
                storage_err(err)
            }
        })?;
        Ok(Box::new(file))
    }

    #[instrument(skip_all, fields(name = %name))]
    async fn delete(&self, name: &str) -> Result<(), BlobStoreError> {
        match fs::remove_file(self.path_for(name)) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }
}

fn sanitize_name(name: &str) -> String {
    URL_SAFE_NO_PAD.encode(name)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::new(dir.path().join("blobs"));

        store
            .upload("reports/2024/q1.pdf", Box::new(Cursor::new(b"pdf bytes".to_vec())))
            .await
            .expect("upload");

        let mut out = Vec::new();
        store
            .download("reports/2024/q1.pdf")
            .await
            .expect("download")
            .read_to_end(&mut out)
            .expect("read");
        assert_eq!(out, b"pdf bytes");

        // nested names stay flat inside the root
        assert_eq!(
            store.path_for("reports/2024/q1.pdf").parent(),
            Some(store.root())
        );
    }

    #[tokio::test]
    async fn upload_replaces_existing_blob() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::new(dir.path());

        store
            .upload("k", Box::new(Cursor::new(b"first version".to_vec())))
            .await
            .expect("upload");
        store
            .upload("k", Box::new(Cursor::new(b"v2".to_vec())))
            .await
            .expect("upload again");

        let stored = fs::read(store.path_for("k")).expect("read file");
        assert_eq!(stored, b"v2");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileBlobStore::new(dir.path());
        store
            .upload("k", Box::new(Cursor::new(b"v".to_vec())))
            .await
            .expect("upload");
        store.delete("k").await.expect("delete");
        store.delete("k").await.expect("delete again");

        let err = match store.download("k").await {
            Ok(_) => panic!("should be missing"),
            Err(err) => err,
        };
        assert_eq!(
            err,
            BlobStoreError::NotFound {
                name: "k".to_string()
            }
        );
    }
}
