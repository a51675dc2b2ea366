//! Streaming encryption providers and the storage plumbing around them.
//!
//! The bulk transform is AES-256-CBC; the asymmetric provider wraps a per-stream
//! session key with RSA. Key files, the OS keyring and a file-backed blob store
//! round out what a client needs to keep encrypted blobs.

pub mod asymmetric;
pub mod blob_ext;
pub mod cipher;
pub mod file_blob_store;
pub mod key_handle;
pub mod keyring_store;
pub mod registry;
pub mod segmented_stream;
pub mod symmetric;

pub use asymmetric::AsymmetricProvider;
pub use symmetric::SymmetricProvider;
