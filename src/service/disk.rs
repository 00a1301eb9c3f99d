//! # Disk Backend
//!
//! Blobs live at `root/<key>`. Keys containing `/` become nested directories.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::backend::{
    clamp_range, validate_key, DirectUploadOptions, StorageBackend, UploadOptions, UrlOptions,
};
use super::checksum;
use super::errors::{StorageError, StorageResult};
use super::signed_url::{SignedUrlGenerator, TokenClaims, TokenPurpose};
use crate::observability::{log_event, Event};

/// A blob resolved from a signed read URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedBlob {
    pub key: String,
    pub data: Vec<u8>,
    pub content_type: String,
    pub content_disposition: String,
}

/// Local filesystem storage backend
#[derive(Debug)]
pub struct DiskBackend {
    name: String,
    root: PathBuf,
    host: String,
    signer: SignedUrlGenerator,
}

impl DiskBackend {
    /// Create a new disk backend
    ///
    /// `host` is the public base URL of the HTTP server that serves this
    /// backend's signed URLs.
    pub fn new(
        name: impl Into<String>,
        root: PathBuf,
        host: impl Into<String>,
        secret: &[u8],
    ) -> Self {
        Self {
            name: name.into(),
            root,
            host: host.into().trim_end_matches('/').to_string(),
            signer: SignedUrlGenerator::new(secret),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of `key`
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// Resolve a signed read token into the blob it names
    pub fn serve_blob(&self, token: &str) -> StorageResult<ServedBlob> {
        let claims = self.signer.verify(token, &self.name, TokenPurpose::Blob)?;
        let data = self.download(&claims.key)?;
        let disposition = claims.disposition.unwrap_or_default();

        Ok(ServedBlob {
            content_type: claims
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            content_disposition: disposition.header_value(claims.filename.as_deref()),
            key: claims.key,
            data,
        })
    }

    /// Store the body of a direct upload made against one of our signed URLs.
    ///
    /// Returns the key that was written.
    pub fn accept_direct_upload(
        &self,
        token: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> StorageResult<String> {
        let claims = self
            .signer
            .verify(token, &self.name, TokenPurpose::DirectUpload)?;

        if claims.content_type.as_deref() != content_type {
            return Err(StorageError::ContentMismatch(format!(
                "expected content type {:?}, got {:?}",
                claims.content_type, content_type
            )));
        }
        if claims.content_length != Some(data.len() as u64) {
            return Err(StorageError::ContentMismatch(format!(
                "expected {:?} bytes, got {}",
                claims.content_length,
                data.len()
            )));
        }

        let options = UploadOptions {
            checksum: claims.checksum.clone(),
            content_type: claims.content_type.clone(),
        };
        self.upload(&claims.key, &mut &data[..], &options)?;

        log_event(
            Event::DirectUploadAccepted,
            &[("key", claims.key.as_str()), ("service", self.name.as_str())],
        );
        Ok(claims.key)
    }

    fn signed_url(&self, kind: &str, claims: &TokenClaims) -> StorageResult<String> {
        let token = self.signer.generate(claims)?;
        Ok(format!("{}/storage/{}/{}/{}", self.host, self.name, kind, token))
    }
}

fn not_found_or_io(key: &str, e: io::Error) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::ObjectNotFound(key.to_string())
    } else {
        StorageError::IoError(e.to_string())
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

impl StorageBackend for DiskBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn upload(&self, key: &str, io: &mut dyn Read, options: &UploadOptions) -> StorageResult<()> {
        let full_path = self.path_for(key)?;

        let parent = full_path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;

        // Readers never observe a half-written blob. A mismatched stream is
        // dropped with its staged file.
        let mut staged = NamedTempFile::new_in(parent)?;
        let sum = checksum::copy_hashed(io, &mut staged)?;
        if let Some(expected) = options.checksum.as_deref() {
            if sum != expected {
                return Err(StorageError::IntegrityError(key.to_string()));
            }
        }
        staged.flush()?;
        staged.as_file().sync_all()?;
        staged
            .persist(&full_path)
            .map_err(|e| StorageError::IoError(e.error.to_string()))?;

        Ok(())
    }

    fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        let full_path = self.path_for(key)?;
        fs::read(&full_path).map_err(|e| not_found_or_io(key, e))
    }

    fn download_chunk(&self, key: &str, range: Range<u64>) -> StorageResult<Vec<u8>> {
        let full_path = self.path_for(key)?;
        let mut file = File::open(&full_path).map_err(|e| not_found_or_io(key, e))?;
        let len = file.metadata()?.len();
        let range = clamp_range(&range, len);

        let mut chunk = vec![0u8; range.len()];
        file.seek(SeekFrom::Start(range.start as u64))?;
        file.read_exact(&mut chunk)?;
        Ok(chunk)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let full_path = self.path_for(key)?;
        match fs::remove_file(&full_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::IoError(e.to_string())),
        }
    }

    fn delete_prefixed(&self, prefix: &str) -> StorageResult<()> {
        if !self.root.is_dir() {
            return Ok(());
        }

        let mut files = Vec::new();
        collect_files(&self.root, &mut files)?;

        for path in files {
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StorageError::IoError(e.to_string())),
                }
            }
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn url(&self, key: &str, options: &UrlOptions) -> StorageResult<String> {
        validate_key(key)?;
        self.signed_url("blobs", &TokenClaims::for_blob(&self.name, key, options)?)
    }

    fn url_for_direct_upload(
        &self,
        key: &str,
        options: &DirectUploadOptions,
    ) -> StorageResult<String> {
        validate_key(key)?;
        self.signed_url(
            "direct_uploads",
            &TokenClaims::for_direct_upload(&self.name, key, options)?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::backend::Disposition;
    use chrono::Duration;
    use tempfile::TempDir;

    fn backend(temp: &TempDir) -> DiskBackend {
        DiskBackend::new("local", temp.path().to_path_buf(), "http://localhost:54321/", b"secret")
    }

    fn token_of(url: &str) -> &str {
        url.rsplit('/').next().unwrap()
    }

    #[test]
    fn test_upload_download() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);

        backend
            .upload("abc", &mut &b"hello"[..], &UploadOptions::default())
            .unwrap();
        assert_eq!(backend.download("abc").unwrap(), b"hello");
        assert!(temp.path().join("abc").is_file());
    }

    #[test]
    fn test_nested_key() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);

        backend
            .upload("variants/abc/thumb", &mut &b"nested"[..], &UploadOptions::default())
            .unwrap();
        assert_eq!(backend.download("variants/abc/thumb").unwrap(), b"nested");
    }

    #[test]
    fn test_checksum_mismatch_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);

        let result = backend.upload(
            "abc",
            &mut &b"hello"[..],
            &UploadOptions::with_checksum(checksum::compute(b"goodbye")),
        );
        assert_eq!(result, Err(StorageError::IntegrityError("abc".to_string())));
        assert!(!backend.exists("abc").unwrap());
    }

    #[test]
    fn test_streamed_checksum_mismatch_leaves_no_partial_blob() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 241) as u8).collect();
        let mut tampered = data.clone();
        tampered[250_000] ^= 0xff;

        let result = backend.upload(
            "big/blob",
            &mut tampered.as_slice(),
            &UploadOptions::with_checksum(checksum::compute(&data)),
        );
        assert_eq!(result, Err(StorageError::IntegrityError("big/blob".to_string())));
        assert!(!backend.exists("big/blob").unwrap());
        assert_eq!(fs::read_dir(temp.path().join("big")).unwrap().count(), 0);

        backend
            .upload(
                "big/blob",
                &mut data.as_slice(),
                &UploadOptions::with_checksum(checksum::compute(&data)),
            )
            .unwrap();
        assert_eq!(backend.download("big/blob").unwrap(), data);
    }

    #[test]
    fn test_download_chunk() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        backend
            .upload("abc", &mut &b"0123456789"[..], &UploadOptions::default())
            .unwrap();

        assert_eq!(backend.download_chunk("abc", 2..5).unwrap(), b"234");
        assert_eq!(backend.download_chunk("abc", 8..100).unwrap(), b"89");
        assert!(backend.download_chunk("abc", 50..60).unwrap().is_empty());
    }

    #[test]
    fn test_not_found() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);

        assert!(matches!(backend.download("missing"), Err(StorageError::ObjectNotFound(_))));
        assert!(matches!(
            backend.download_chunk("missing", 0..1),
            Err(StorageError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);

        backend.upload("abc", &mut &b"bye"[..], &UploadOptions::default()).unwrap();
        backend.delete("abc").unwrap();
        assert!(!backend.exists("abc").unwrap());
        backend.delete("abc").unwrap();
    }

    #[test]
    fn test_delete_prefixed() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        for key in ["variants/a/1", "variants/a/2", "variants/b/1", "other"] {
            backend.upload(key, &mut &b"x"[..], &UploadOptions::default()).unwrap();
        }

        backend.delete_prefixed("variants/a/").unwrap();

        assert!(!backend.exists("variants/a/1").unwrap());
        assert!(!backend.exists("variants/a/2").unwrap());
        assert!(backend.exists("variants/b/1").unwrap());
        assert!(backend.exists("other").unwrap());
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);

        let result = backend.upload("../escape", &mut &b"x"[..], &UploadOptions::default());
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn test_url_round_trip() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        backend.upload("abc", &mut &b"hello"[..], &UploadOptions::default()).unwrap();

        let url = backend
            .url(
                "abc",
                &UrlOptions {
                    disposition: Disposition::Attachment,
                    filename: Some("hello.txt".to_string()),
                    content_type: Some("text/plain".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(url.starts_with("http://localhost:54321/storage/local/blobs/"));

        let served = backend.serve_blob(token_of(&url)).unwrap();
        assert_eq!(served.data, b"hello");
        assert_eq!(served.content_type, "text/plain");
        assert_eq!(served.content_disposition, "attachment; filename=\"hello.txt\"");
    }

    #[test]
    fn test_direct_upload() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let data = b"Something else entirely!";

        let url = backend
            .url_for_direct_upload(
                "abc",
                &DirectUploadOptions {
                    expires_in: Duration::minutes(5),
                    content_type: "text/plain".to_string(),
                    content_length: data.len() as u64,
                    checksum: checksum::compute(data),
                },
            )
            .unwrap();

        assert!(matches!(
            backend.accept_direct_upload(token_of(&url), Some("image/png"), data),
            Err(StorageError::ContentMismatch(_))
        ));
        assert!(matches!(
            backend.accept_direct_upload(token_of(&url), Some("text/plain"), b"short"),
            Err(StorageError::ContentMismatch(_))
        ));

        let key = backend
            .accept_direct_upload(token_of(&url), Some("text/plain"), data)
            .unwrap();
        assert_eq!(key, "abc");
        assert_eq!(backend.download("abc").unwrap(), data);
    }

    #[test]
    fn test_read_token_cannot_upload() {
        let temp = TempDir::new().unwrap();
        let backend = backend(&temp);
        let url = backend.url("abc", &UrlOptions::default()).unwrap();

        assert_eq!(
            backend.accept_direct_upload(token_of(&url), None, b""),
            Err(StorageError::InvalidSignature)
        );
    }
}
