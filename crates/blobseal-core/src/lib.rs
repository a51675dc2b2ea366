//! Core contracts for blobseal: the crypto provider capability, its error taxonomy,
//! the key file record, and the storage collaborator.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod blob_store;
pub mod error;
pub mod key_file;
pub mod provider;
