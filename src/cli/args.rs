//! CLI argument definitions using clap
//!
//! Commands:
//! - blobmirror check --config <path>
//! - blobmirror upload | download | exists | delete | delete-prefixed
//! - blobmirror url | direct-upload-url | mirror
//! - blobmirror serve --config <path>

use std::ops::Range;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::service::Disposition;

/// Longest URL lifetime the CLI will sign, in seconds (one week)
pub const MAX_EXPIRES_IN: i64 = 7 * 24 * 60 * 60;

/// blobmirror - blob storage with primary/mirror replication
#[derive(Parser, Debug)]
#[command(name = "blobmirror")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Configuration file and the service a command acts on
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Path to configuration file
    #[arg(long, default_value = "./blobmirror.json")]
    pub config: PathBuf,

    /// Service name (defaults to `default_service`)
    #[arg(long)]
    pub service: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build every configured service and report the graph
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./blobmirror.json")]
        config: PathBuf,
    },

    /// Upload a file
    Upload {
        #[command(flatten)]
        target: Target,

        /// File to upload
        #[arg(long)]
        file: PathBuf,

        /// Key to store under (a random key is generated when omitted)
        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        content_type: Option<String>,

        /// Expected base64 SHA-256 digest (computed from the file when omitted)
        #[arg(long)]
        checksum: Option<String>,
    },

    /// Download a blob
    Download {
        #[command(flatten)]
        target: Target,

        #[arg(long)]
        key: String,

        /// Write the content here instead of embedding it in the response
        #[arg(long)]
        output: Option<PathBuf>,

        /// Byte range, e.g. 0..1024
        #[arg(long, value_parser = parse_range)]
        range: Option<Range<u64>>,
    },

    /// Check whether a blob exists
    Exists {
        #[command(flatten)]
        target: Target,

        #[arg(long)]
        key: String,
    },

    /// Delete a blob
    Delete {
        #[command(flatten)]
        target: Target,

        #[arg(long)]
        key: String,
    },

    /// Delete every blob whose key starts with a prefix
    DeletePrefixed {
        #[command(flatten)]
        target: Target,

        #[arg(long)]
        prefix: String,
    },

    /// Generate a signed read URL
    Url {
        #[command(flatten)]
        target: Target,

        #[arg(long)]
        key: String,

        /// Lifetime in seconds
        #[arg(
            long,
            default_value_t = 300,
            value_parser = clap::value_parser!(i64).range(1..=MAX_EXPIRES_IN)
        )]
        expires_in: i64,

        #[arg(long, default_value = "inline")]
        disposition: Disposition,

        #[arg(long)]
        filename: Option<String>,

        #[arg(long)]
        content_type: Option<String>,
    },

    /// Generate a signed direct upload URL and its required headers
    DirectUploadUrl {
        #[command(flatten)]
        target: Target,

        /// Key to upload to (a random key is generated when omitted)
        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        content_type: String,

        #[arg(long)]
        content_length: u64,

        /// Base64 SHA-256 digest of the content
        #[arg(long)]
        checksum: String,

        /// Lifetime in seconds
        #[arg(
            long,
            default_value_t = 300,
            value_parser = clap::value_parser!(i64).range(1..=MAX_EXPIRES_IN)
        )]
        expires_in: i64,
    },

    /// Copy a blob from a mirror service's primary to lagging mirrors
    Mirror {
        #[command(flatten)]
        target: Target,

        #[arg(long)]
        key: String,

        #[arg(long)]
        checksum: Option<String>,
    },

    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./blobmirror.json")]
        config: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

/// Parse `start..end`
pub fn parse_range(s: &str) -> Result<Range<u64>, String> {
    let (start, end) = s
        .split_once("..")
        .ok_or_else(|| format!("expected start..end, got '{}'", s))?;
    let start = start
        .parse::<u64>()
        .map_err(|e| format!("invalid range start '{}': {}", start, e))?;
    let end = end
        .parse::<u64>()
        .map_err(|e| format!("invalid range end '{}': {}", end, e))?;

    if end < start {
        return Err(format!("range end {} is before start {}", end, start));
    }
    Ok(start..end)
}
