mod cli;
mod config;
mod storage;

use std::path::{Path, PathBuf};

use blobseal_core::{blob_store::BlobStore, provider::CryptoProvider};
use blobseal_crypto::{
    blob_ext,
    keyring_store::KeyRecordStore,
    registry, AsymmetricProvider, SymmetricProvider,
};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand, KeyKind, KeySourceArgs};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Keygen {
            kind,
            bits,
            out,
            public_out,
            keyring,
        } => {
            let request = KeygenRequest {
                kind,
                bits: bits.unwrap_or(config.rsa_key_bits()),
                out: out.or_else(|| config.key_file.clone()),
                public_out,
                keyring,
            };
            run_keygen(&request, &storage::keyring_from_config(&config)).await?
        }
        Command::ExportPublic { key, out } => export_public(&key, &out)?,
        Command::Encrypt {
            input,
            name,
            source,
        } => {
            let provider = provider_for(&source, &config).await?;
            let store = storage::store_from_config(&config)?;
            encrypt_file(&store, provider.as_ref(), &input, &name).await?
        }
        Command::Decrypt {
            name,
            output,
            source,
        } => {
            let provider = provider_for(&source, &config).await?;
            let store = storage::store_from_config(&config)?;
            decrypt_file(&store, provider.as_ref(), &name, &output).await?
        }
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Version => print_version(),
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("blobseal {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

struct KeygenRequest {
    kind: KeyKind,
    bits: usize,
    out: Option<PathBuf>,
    public_out: Option<PathBuf>,
    keyring: bool,
}

async fn run_keygen(request: &KeygenRequest, keyring: &dyn KeyRecordStore) -> Result<()> {
    if request.out.is_none() && !request.keyring {
        color_eyre::eyre::bail!("nowhere to put the key: pass --out or --keyring, or set key_file");
    }

    let provider: Box<dyn CryptoProvider> = match request.kind {
        KeyKind::Symmetric => Box::new(SymmetricProvider::generate()),
        KeyKind::Asymmetric => Box::new(AsymmetricProvider::generate(request.bits)?),
    };
    info!(kind = %provider.kind(), "generated key");

    if let Some(out) = &request.out {
        registry::write_key_file(provider.as_ref(), out, false)?;
        println!("Key written to {}", out.display());
    }
    if let Some(public_out) = &request.public_out {
        registry::write_key_file(provider.as_ref(), public_out, true)?;
        println!("Public key written to {}", public_out.display());
    }
    if request.keyring {
        keyring.save(&provider.to_key_file_record(false)?).await?;
        println!("Key stored in the OS keyring");
    }
    Ok(())
}

fn export_public(key: &Path, out: &Path) -> Result<()> {
    let provider = registry::from_key_file(key)?;
    registry::write_key_file(provider.as_ref(), out, true)?;
    println!("Public key written to {}", out.display());
    Ok(())
}

async fn provider_for(
    args: &KeySourceArgs,
    config: &config::Config,
) -> Result<Box<dyn CryptoProvider>> {
    let source = storage::resolve_key_source(args, config)?;
    storage::load_provider(&source, &storage::keyring_from_config(config)).await
}

async fn encrypt_file(
    store: &dyn BlobStore,
    provider: &dyn CryptoProvider,
    input: &Path,
    name: &str,
) -> Result<()> {
    blob_ext::upload_file_encrypted(store, provider, name, input)
        .await
        .map_err(|e| eyre!("encrypting {}: {e}", input.display()))?;
    println!("Stored {} as {name}", input.display());
    Ok(())
}

async fn decrypt_file(
    store: &dyn BlobStore,
    provider: &dyn CryptoProvider,
    name: &str,
    output: &Path,
) -> Result<()> {
    let written = blob_ext::download_file_decrypted(store, provider, name, output)
        .await
        .map_err(|e| eyre!("decrypting {name}: {e}"))?;
    println!("Wrote {written} bytes to {}", output.display());
    Ok(())
}
