use std::{
    fs,
    path::{Path, PathBuf},
};

use blobseal_crypto::key_handle::DEFAULT_KEY_SIZE_BITS;
use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

const DEFAULT_KEYRING_SERVICE: &str = "blobseal";
const DEFAULT_KEYRING_ACCOUNT: &str = "default-key";

/// User-level configuration loaded from `~/.config/blobseal/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the blob store root.
    pub data_dir: Option<PathBuf>,
    /// Key file used when no key source is given on the command line.
    pub key_file: Option<PathBuf>,
    /// RSA key size for `keygen --kind asymmetric`.
    pub rsa_key_bits: Option<usize>,
    pub keyring: Option<KeyringConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct KeyringConfig {
    pub service: String,
    pub account: String,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_KEYRING_SERVICE.to_string(),
            account: DEFAULT_KEYRING_ACCOUNT.to_string(),
        }
    }
}

impl Config {
    pub fn rsa_key_bits(&self) -> usize {
        self.rsa_key_bits.unwrap_or(DEFAULT_KEY_SIZE_BITS)
    }

    pub fn keyring(&self) -> KeyringConfig {
        self.keyring.clone().unwrap_or_default()
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("blobseal").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

/// Existing files are left untouched so user edits survive.
pub fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.rsa_key_bits(), 4096);
        assert_eq!(cfg.keyring(), KeyringConfig::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_dir = "/tmp/blobseal-data"
            key_file = "/tmp/blobseal.key"
            rsa_key_bits = 2048
            [keyring]
            service = "acme-backup"
            account = "nightly"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/blobseal-data")),
                key_file: Some(PathBuf::from("/tmp/blobseal.key")),
                rsa_key_bits: Some(2048),
                keyring: Some(KeyringConfig {
                    service: "acme-backup".into(),
                    account: "nightly".into(),
                }),
            }
        );
        assert_eq!(cfg.rsa_key_bits(), 2048);
    }

    #[test]
    fn write_default_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/blobseal-data")),
            ..Config::default()
        };

        write_to_path_if_missing(&cfg, &path).expect("write should succeed");
        let other = Config {
            rsa_key_bits: Some(1024),
            ..Config::default()
        };
        let second = write_to_path_if_missing(&other, &path).expect("second write ok");
        assert_eq!(second, path);

        let loaded = load_from_path(&path).expect("load");
        assert_eq!(loaded, cfg);
    }
}
