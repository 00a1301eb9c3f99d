//! blobmirror - blob storage services with primary/mirror replication
//!
//! A mirror service writes every upload to a primary backend and then to each
//! configured mirror. Reads come from the primary only; mirror failures are
//! logged and counted but never fail the caller.

pub mod cli;
pub mod http_server;
pub mod observability;
pub mod service;
