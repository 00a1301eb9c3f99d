//! # Storage Backend Trait
//!
//! The capability set every service exposes, whether it is a single disk or
//! a mirror composed of other services.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::ops::Range;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::errors::{StorageError, StorageResult};

/// Backend trait for blob storage
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Configured service name
    fn name(&self) -> &str;

    /// Store the bytes read from `io` under `key`.
    ///
    /// `io` is read at most once. When a checksum is given the backend must
    /// refuse to keep content that does not match it.
    fn upload(&self, key: &str, io: &mut dyn Read, options: &UploadOptions) -> StorageResult<()>;

    /// Read a whole blob
    fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Read part of a blob; the end of `range` is clamped to the blob size
    fn download_chunk(&self, key: &str, range: Range<u64>) -> StorageResult<Vec<u8>>;

    /// Delete a blob. Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete every blob whose key starts with `prefix`
    fn delete_prefixed(&self, prefix: &str) -> StorageResult<()>;

    /// Check if a blob exists
    fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Signed URL for reading a blob directly from this backend
    fn url(&self, key: &str, options: &UrlOptions) -> StorageResult<String>;

    /// Signed URL a client can PUT the blob to, bypassing the application
    fn url_for_direct_upload(
        &self,
        key: &str,
        options: &DirectUploadOptions,
    ) -> StorageResult<String>;

    /// Headers the client must send along with a direct upload
    fn headers_for_direct_upload(
        &self,
        _key: &str,
        options: &DirectUploadOptions,
    ) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), options.content_type.clone());
        headers
    }
}

/// Options accompanying an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Base64 SHA-256 digest the stored content must match
    pub checksum: Option<String>,
    pub content_type: Option<String>,
}

impl UploadOptions {
    pub fn with_checksum(checksum: impl Into<String>) -> Self {
        Self {
            checksum: Some(checksum.into()),
            content_type: None,
        }
    }
}

/// Content-Disposition of a served blob
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Inline,
    Attachment,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }

    /// Render a Content-Disposition header value
    pub fn header_value(&self, filename: Option<&str>) -> String {
        match filename {
            Some(name) => format!(
                "{}; filename=\"{}\"",
                self.as_str(),
                name.replace('\\', "\\\\").replace('"', "\\\"")
            ),
            None => self.as_str().to_string(),
        }
    }
}

impl std::str::FromStr for Disposition {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inline" => Ok(Disposition::Inline),
            "attachment" => Ok(Disposition::Attachment),
            other => Err(StorageError::InvalidConfig(format!(
                "unknown disposition '{}'",
                other
            ))),
        }
    }
}

/// Options for a read URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlOptions {
    pub expires_in: Duration,
    pub disposition: Disposition,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl Default for UrlOptions {
    fn default() -> Self {
        Self {
            expires_in: Duration::minutes(5),
            disposition: Disposition::Inline,
            filename: None,
            content_type: None,
        }
    }
}

/// Options for a direct upload URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectUploadOptions {
    pub expires_in: Duration,
    pub content_type: String,
    pub content_length: u64,
    pub checksum: String,
}

/// Reject keys that could escape a backend's namespace
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key is empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Clamp a requested range to a blob of `len` bytes
pub(crate) fn clamp_range(range: &Range<u64>, len: u64) -> Range<usize> {
    let start = range.start.min(len) as usize;
    let end = range.end.min(len).max(range.start.min(len)) as usize;
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("abc").is_ok());
        assert!(validate_key("variants/abc/thumb").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("a/../../b").is_err());
        assert!(validate_key("a\\b").is_err());
    }

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(&(0..3), 10), 0..3);
        assert_eq!(clamp_range(&(5..100), 10), 5..10);
        assert_eq!(clamp_range(&(20..30), 10), 10..10);
        assert_eq!(clamp_range(&(4..2), 10), 4..4);
    }

    #[test]
    fn test_disposition_header() {
        assert_eq!(Disposition::Inline.header_value(None), "inline");
        assert_eq!(
            Disposition::Attachment.header_value(Some("report \"q1\".pdf")),
            "attachment; filename=\"report \\\"q1\\\".pdf\""
        );
        assert_eq!("ATTACHMENT".parse::<Disposition>().unwrap(), Disposition::Attachment);
    }
}
