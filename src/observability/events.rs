//! Observable events
//!
//! Every event the service logs has a variant here, so log consumers can
//! rely on a closed set of names.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    ConfigLoaded,
    RegistryBuilt,

    // Coordinator writes
    /// Primary refused an upload, the upload failed
    PrimaryUploadFailed,
    /// A mirror missed an upload
    MirrorUploadFailed,
    /// A mirror could not delete
    MirrorDeleteFailed,
    /// A mirror could not receive a reconciliation copy
    MirrorCopyFailed,

    // Disk service endpoints
    DirectUploadAccepted,
    DirectUploadRejected,
    BlobServed,

    // Server
    Serving,
    ShutdownComplete,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::RegistryBuilt => "REGISTRY_BUILT",
            Event::PrimaryUploadFailed => "PRIMARY_UPLOAD_FAILED",
            Event::MirrorUploadFailed => "MIRROR_UPLOAD_FAILED",
            Event::MirrorDeleteFailed => "MIRROR_DELETE_FAILED",
            Event::MirrorCopyFailed => "MIRROR_COPY_FAILED",
            Event::DirectUploadAccepted => "DIRECT_UPLOAD_ACCEPTED",
            Event::DirectUploadRejected => "DIRECT_UPLOAD_REJECTED",
            Event::BlobServed => "BLOB_SERVED",
            Event::Serving => "BLOBMIRROR_SERVING",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
        }
    }

    /// Severity the event is normally logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::PrimaryUploadFailed => Severity::Error,
            Event::MirrorUploadFailed
            | Event::MirrorDeleteFailed
            | Event::MirrorCopyFailed
            | Event::DirectUploadRejected => Severity::Warn,
            Event::BlobServed => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::ConfigLoaded,
            Event::RegistryBuilt,
            Event::PrimaryUploadFailed,
            Event::MirrorUploadFailed,
            Event::MirrorDeleteFailed,
            Event::MirrorCopyFailed,
            Event::DirectUploadAccepted,
            Event::DirectUploadRejected,
            Event::BlobServed,
            Event::Serving,
            Event::ShutdownComplete,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_mirror_failures_are_warnings() {
        assert_eq!(Event::MirrorUploadFailed.severity(), Severity::Warn);
        assert_eq!(Event::MirrorDeleteFailed.severity(), Severity::Warn);
        assert_eq!(Event::PrimaryUploadFailed.severity(), Severity::Error);
    }
}
