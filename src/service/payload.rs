//! # Upload Payload Buffering
//!
//! An upload stream can be read only once, but a mirror needs to hand the
//! same bytes to every backend. `Payload` drains the stream a single time and
//! then gives out as many independent readers as needed.

use std::io::{self, BufReader, Read, Write};

use tempfile::NamedTempFile;

use super::errors::StorageResult;

/// Payloads larger than this are spooled to disk by default
pub const DEFAULT_SPOOL_THRESHOLD: usize = 8 * 1024 * 1024;

/// Buffered upload content
#[derive(Debug)]
pub enum Payload {
    Memory(Vec<u8>),
    Spooled { file: NamedTempFile, len: u64 },
}

impl Payload {
    /// Drain `io` to EOF.
    ///
    /// Up to `spool_threshold` bytes are kept in memory; anything larger is
    /// written to an anonymous temporary file.
    pub fn buffer(io: &mut dyn Read, spool_threshold: usize) -> StorageResult<Self> {
        let mut head = Vec::new();
        (&mut *io)
            .take((spool_threshold as u64).saturating_add(1))
            .read_to_end(&mut head)?;

        if head.len() <= spool_threshold {
            return Ok(Payload::Memory(head));
        }

        let mut file = NamedTempFile::new()?;
        file.write_all(&head)?;
        let rest = io::copy(io, &mut file)?;
        file.flush()?;

        Ok(Payload::Spooled {
            len: head.len() as u64 + rest,
            file,
        })
    }

    /// Total number of bytes
    pub fn len(&self) -> u64 {
        match self {
            Payload::Memory(data) => data.len() as u64,
            Payload::Spooled { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self, Payload::Spooled { .. })
    }

    /// A fresh reader positioned at the first byte
    pub fn reader(&self) -> StorageResult<Box<dyn Read + Send + '_>> {
        match self {
            Payload::Memory(data) => Ok(Box::new(data.as_slice())),
            Payload::Spooled { file, .. } => Ok(Box::new(BufReader::new(file.reopen()?))),
        }
    }
}
