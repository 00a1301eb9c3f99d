//! CLI module for blobmirror
//!
//! Provides command-line access to every configured service:
//! - check: build the service graph and report it
//! - upload / download / exists / delete / delete-prefixed
//! - url / direct-upload-url: signed URLs
//! - mirror: copy a blob to lagging mirrors
//! - serve: run the HTTP server

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, Target};
pub use commands::{load_registry, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
