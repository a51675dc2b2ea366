use std::path::{Path, PathBuf};

use blobseal_core::provider::CryptoProvider;
use blobseal_crypto::{
    file_blob_store::FileBlobStore,
    keyring_store::{self, KeyRecordStore, KeyringRecordStore},
    registry,
};
use color_eyre::{eyre::eyre, Result};
use dirs::data_dir;
use tracing::debug;

use crate::{cli::KeySourceArgs, config::Config};

/// Resolve the default data directory for blobseal.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| eyre!("no data dir available"))?;
    Ok(base.join("blobseal"))
}

/// Build the blob store, honouring the configured data directory.
pub fn store_from_config(config: &Config) -> Result<FileBlobStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?.join("blobs"),
    };
    debug!(?root, "initializing blob store");
    Ok(FileBlobStore::new(root))
}

pub fn keyring_from_config(config: &Config) -> KeyringRecordStore {
    let settings = config.keyring();
    KeyringRecordStore::new(settings.service, settings.account)
}

/// Where the provider for an encrypt/decrypt run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    File(PathBuf),
    Keyring,
}

/// `--key`, then `--keyring`, then the configured key file.
pub fn resolve_key_source(args: &KeySourceArgs, config: &Config) -> Result<KeySource> {
    if let Some(path) = &args.key {
        return Ok(KeySource::File(path.clone()));
    }
    if args.keyring {
        return Ok(KeySource::Keyring);
    }
    config
        .key_file
        .clone()
        .map(KeySource::File)
        .ok_or_else(|| {
            eyre!("no key given: pass --key or --keyring, or set key_file in the config")
        })
}

pub async fn load_provider(
    source: &KeySource,
    keyring: &dyn KeyRecordStore,
) -> Result<Box<dyn CryptoProvider>> {
    match source {
        KeySource::File(path) => load_key_file(path),
        KeySource::Keyring => keyring_store::load_provider(keyring)
            .await?
            .ok_or_else(|| eyre!("no key stored in the keyring")),
    }
}

fn load_key_file(path: &Path) -> Result<Box<dyn CryptoProvider>> {
    registry::from_key_file(path).map_err(|e| eyre!("key file {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use blobseal_core::provider::ProviderKind;
    use blobseal_crypto::{keyring_store::InMemoryRecordStore, SymmetricProvider};

    use super::*;

    #[test]
    fn key_source_prefers_flag_then_keyring_then_config() {
        let config = Config {
            key_file: Some(PathBuf::from("configured.key")),
            ..Config::default()
        };

        let args = KeySourceArgs {
            key: Some(PathBuf::from("flag.key")),
            keyring: false,
        };
        assert_eq!(
            resolve_key_source(&args, &config).expect("resolve"),
            KeySource::File(PathBuf::from("flag.key"))
        );

        let args = KeySourceArgs {
            key: None,
            keyring: true,
        };
        assert_eq!(
            resolve_key_source(&args, &config).expect("resolve"),
            KeySource::Keyring
        );

        assert_eq!(
            resolve_key_source(&KeySourceArgs::default(), &config).expect("resolve"),
            KeySource::File(PathBuf::from("configured.key"))
        );

        assert!(resolve_key_source(&KeySourceArgs::default(), &Config::default()).is_err());
    }

    #[test]
    fn configured_data_dir_is_store_root() {
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/blobseal-test")),
            ..Config::default()
        };
        let store = store_from_config(&config).expect("store");
        assert_eq!(store.root(), Path::new("/tmp/blobseal-test"));
    }

    #[tokio::test]
    async fn keyring_source_without_record_fails() {
        let keyring = InMemoryRecordStore::default();
        assert!(load_provider(&KeySource::Keyring, &keyring).await.is_err());

        keyring_store::get_or_create_symmetric(&keyring)
            .await
            .expect("create");
        let provider = load_provider(&KeySource::Keyring, &keyring)
            .await
            .expect("load");
        assert_eq!(provider.kind(), ProviderKind::Symmetric);
    }

    #[tokio::test]
    async fn file_source_reads_key_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("k.key");
        registry::write_key_file(&SymmetricProvider::generate(), &path, false).expect("write");

        let keyring = InMemoryRecordStore::default();
        let provider = load_provider(&KeySource::File(path), &keyring)
            .await
            .expect("load");
        assert_eq!(provider.kind(), ProviderKind::Symmetric);
    }
}
