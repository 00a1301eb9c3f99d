//! # Content Checksums
//!
//! Checksums are the base64 (standard alphabet) encoding of the SHA-256
//! digest of the content. Backends compare them as opaque strings.

use std::io::{self, Read, Write};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use super::errors::{StorageError, StorageResult};

/// Calculate checksum for data
pub fn compute(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    STANDARD.encode(hasher.finalize())
}

/// Calculate checksum for everything remaining in `reader`
pub fn compute_reader(reader: &mut dyn Read) -> StorageResult<String> {
    copy_hashed(reader, &mut io::sink())
}

/// Copy `reader` into `writer` and return the checksum of the copied bytes
pub fn copy_hashed(reader: &mut dyn Read, writer: &mut dyn Write) -> StorageResult<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
    }
    Ok(STANDARD.encode(hasher.finalize()))
}

/// Fail with `IntegrityError` when `data` does not match `expected`
pub fn verify(key: &str, data: &[u8], expected: Option<&str>) -> StorageResult<()> {
    match expected {
        Some(expected) if compute(data) != expected => {
            Err(StorageError::IntegrityError(key.to_string()))
        }
        _ => Ok(()),
    }
}
