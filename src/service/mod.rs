//! # Blob Service Module
//!
//! Named blob storage services behind one `StorageBackend` contract: disk and
//! memory backends, and the mirror coordinator that writes to a primary plus
//! any number of mirrors.

pub mod backend;
pub mod checksum;
pub mod config;
pub mod disk;
pub mod errors;
pub mod key;
pub mod memory;
pub mod mirror;
pub mod payload;
pub mod registry;
pub mod signed_url;

pub use backend::{
    validate_key, DirectUploadOptions, Disposition, StorageBackend, UploadOptions, UrlOptions,
};
pub use config::{ServiceConfig, StorageConfig};
pub use disk::{DiskBackend, ServedBlob};
pub use errors::{StorageError, StorageResult};
pub use key::generate_unique_key;
pub use memory::MemoryBackend;
pub use mirror::{FanOut, FanOutReport, MirrorBackend, MirrorFailure, MirrorOptions};
pub use payload::{Payload, DEFAULT_SPOOL_THRESHOLD};
pub use registry::Registry;
pub use signed_url::{SignedUrlGenerator, TokenClaims, TokenPurpose};
