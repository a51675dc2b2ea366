use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "blobseal",
    about = "Client-side encryption for blobs at rest",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Generate a new key and write its key file.
    Keygen {
        #[arg(long, value_enum)]
        kind: KeyKind,
        /// RSA key size for asymmetric keys (defaults to the configured size).
        #[arg(long)]
        bits: Option<usize>,
        /// Key file to write (defaults to the configured key file).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write a public-only key file here.
        #[arg(long)]
        public_out: Option<PathBuf>,
        /// Store the key record in the OS keyring.
        #[arg(long)]
        keyring: bool,
    },
    /// Write the public-only form of an existing key file.
    ExportPublic {
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Encrypt a local file into the blob store.
    Encrypt {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        name: String,
        #[command(flatten)]
        source: KeySourceArgs,
    },
    /// Decrypt a blob from the store into a local file.
    Decrypt {
        #[arg(long)]
        name: String,
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        source: KeySourceArgs,
    },
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySourceArgs {
    /// Key file to use.
    #[arg(long, conflicts_with = "keyring")]
    pub key: Option<PathBuf>,
    /// Use the key record stored in the OS keyring.
    #[arg(long)]
    pub keyring: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Symmetric,
    Asymmetric,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
