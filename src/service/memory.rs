//! # In-Memory Backend

use std::collections::BTreeMap;
use std::io::Read;
use std::ops::Range;
use std::sync::RwLock;

use super::backend::{
    clamp_range, validate_key, DirectUploadOptions, StorageBackend, UploadOptions, UrlOptions,
};
use super::checksum;
use super::errors::{StorageError, StorageResult};
use super::signed_url::{SignedUrlGenerator, TokenClaims};

/// Process-local backend, contents are lost on shutdown
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    signer: SignedUrlGenerator,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>, secret: &[u8]) -> Self {
        Self {
            name: name.into(),
            blobs: RwLock::new(BTreeMap::new()),
            signer: SignedUrlGenerator::new(secret),
        }
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> StorageError {
        StorageError::Internal("memory backend lock poisoned".to_string())
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn upload(&self, key: &str, io: &mut dyn Read, options: &UploadOptions) -> StorageResult<()> {
        validate_key(key)?;
        let mut data = Vec::new();
        io.read_to_end(&mut data)?;
        checksum::verify(key, &data, options.checksum.as_deref())?;

        let mut blobs = self.blobs.write().map_err(|_| Self::poisoned())?;
        blobs.insert(key.to_string(), data);
        Ok(())
    }

    fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        let blobs = self.blobs.read().map_err(|_| Self::poisoned())?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))
    }

    fn download_chunk(&self, key: &str, range: Range<u64>) -> StorageResult<Vec<u8>> {
        let blobs = self.blobs.read().map_err(|_| Self::poisoned())?;
        let blob = blobs
            .get(key)
            .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))?;
        let range = clamp_range(&range, blob.len() as u64);
        Ok(blob[range].to_vec())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let mut blobs = self.blobs.write().map_err(|_| Self::poisoned())?;
        blobs.remove(key);
        Ok(())
    }

    fn delete_prefixed(&self, prefix: &str) -> StorageResult<()> {
        let mut blobs = self.blobs.write().map_err(|_| Self::poisoned())?;
        blobs.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        let blobs = self.blobs.read().map_err(|_| Self::poisoned())?;
        Ok(blobs.contains_key(key))
    }

    fn url(&self, key: &str, options: &UrlOptions) -> StorageResult<String> {
        validate_key(key)?;
        let token = self
            .signer
            .generate(&TokenClaims::for_blob(&self.name, key, options)?)?;
        Ok(format!("memory://{}/blobs/{}", self.name, token))
    }

    fn url_for_direct_upload(
        &self,
        key: &str,
        options: &DirectUploadOptions,
    ) -> StorageResult<String> {
        validate_key(key)?;
        let token = self
            .signer
            .generate(&TokenClaims::for_direct_upload(&self.name, key, options)?)?;
        Ok(format!("memory://{}/direct_uploads/{}", self.name, token))
    }
}
