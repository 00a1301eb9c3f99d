//! # Signed URL Tokens
//!
//! A token is `base64url(json claims) "." base64url(sha256(secret || payload))`.
//! The claims carry everything the serving side has to enforce, so a URL
//! cannot be replayed for a different key, purpose or content.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::backend::{Disposition, DirectUploadOptions, UrlOptions};
use super::errors::{StorageError, StorageResult};

/// What a token authorises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Blob,
    DirectUpload,
}

/// Signed token contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub service: String,
    pub key: String,
    pub purpose: TokenPurpose,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Unix timestamp `expires_in` from now
fn expiry_from_now(expires_in: Duration) -> StorageResult<i64> {
    Utc::now()
        .checked_add_signed(expires_in)
        .map(|at| at.timestamp())
        .ok_or_else(|| {
            StorageError::InvalidConfig(format!(
                "URL lifetime of {} seconds is out of range",
                expires_in.num_seconds()
            ))
        })
}

impl TokenClaims {
    /// Claims for reading `key` from `service`
    pub fn for_blob(service: &str, key: &str, options: &UrlOptions) -> StorageResult<Self> {
        Ok(Self {
            service: service.to_string(),
            key: key.to_string(),
            purpose: TokenPurpose::Blob,
            expires_at: expiry_from_now(options.expires_in)?,
            disposition: Some(options.disposition),
            filename: options.filename.clone(),
            content_type: options.content_type.clone(),
            content_length: None,
            checksum: None,
        })
    }

    /// Claims for a direct upload of `key` into `service`
    pub fn for_direct_upload(
        service: &str,
        key: &str,
        options: &DirectUploadOptions,
    ) -> StorageResult<Self> {
        Ok(Self {
            service: service.to_string(),
            key: key.to_string(),
            purpose: TokenPurpose::DirectUpload,
            expires_at: expiry_from_now(options.expires_in)?,
            disposition: None,
            filename: None,
            content_type: Some(options.content_type.clone()),
            content_length: Some(options.content_length),
            checksum: Some(options.checksum.clone()),
        })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }
}

/// Signed URL generator
pub struct SignedUrlGenerator {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SignedUrlGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedUrlGenerator").finish_non_exhaustive()
    }
}

impl SignedUrlGenerator {
    /// Create a new generator
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    /// Sign claims into a URL-safe token
    pub fn generate(&self, claims: &TokenClaims) -> StorageResult<String> {
        let json = serde_json::to_vec(claims)
            .map_err(|e| StorageError::Internal(format!("token encoding failed: {}", e)))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.sign(&payload);
        Ok(format!("{}.{}", payload, signature))
    }

    /// Verify a token issued for `service` with the given purpose
    pub fn verify(
        &self,
        token: &str,
        service: &str,
        purpose: TokenPurpose,
    ) -> StorageResult<TokenClaims> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or(StorageError::InvalidSignature)?;

        let expected = self.sign(payload);
        if !bool::from(signature.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(StorageError::InvalidSignature);
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| StorageError::InvalidSignature)?;
        let claims: TokenClaims =
            serde_json::from_slice(&json).map_err(|_| StorageError::InvalidSignature)?;

        // A valid signature for another service or purpose is still not ours
        if claims.service != service || claims.purpose != purpose {
            return Err(StorageError::InvalidSignature);
        }

        if Utc::now().timestamp() > claims.expires_at {
            return Err(StorageError::UrlExpired);
        }

        Ok(claims)
    }

    fn sign(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(payload.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}
