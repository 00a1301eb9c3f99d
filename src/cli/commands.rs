//! CLI command implementations
//!
//! Every command loads the configuration, builds the service registry once
//! and then acts on one service. Responses are single JSON lines on stdout.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Duration;
use serde_json::{json, Value};

use crate::observability::{log_event, Event};
use crate::service::{
    checksum, generate_unique_key, DirectUploadOptions, FanOutReport, Registry, ServiceConfig,
    StorageBackend, StorageConfig, UploadOptions, UrlOptions,
};

use super::args::{Command, Target, MAX_EXPIRES_IN};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command).or_else(|e| {
        write_error(e.code_str(), e.message())?;
        Err(e)
    })
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Check { config } => check(&config),
        Command::Upload {
            target,
            file,
            key,
            content_type,
            checksum,
        } => upload(&target, &file, key, content_type, checksum),
        Command::Download {
            target,
            key,
            output,
            range,
        } => download(&target, &key, output.as_deref(), range),
        Command::Exists { target, key } => exists(&target, &key),
        Command::Delete { target, key } => delete(&target, &key),
        Command::DeletePrefixed { target, prefix } => delete_prefixed(&target, &prefix),
        Command::Url {
            target,
            key,
            expires_in,
            disposition,
            filename,
            content_type,
        } => url(
            &target,
            &key,
            &UrlOptions {
                expires_in: url_lifetime(expires_in)?,
                disposition,
                filename,
                content_type,
            },
        ),
        Command::DirectUploadUrl {
            target,
            key,
            content_type,
            content_length,
            checksum,
            expires_in,
        } => direct_upload_url(
            &target,
            key,
            &DirectUploadOptions {
                expires_in: url_lifetime(expires_in)?,
                content_type,
                content_length,
                checksum,
            },
        ),
        Command::Mirror {
            target,
            key,
            checksum,
        } => mirror(&target, &key, checksum.as_deref()),
        Command::Serve { config, port } => serve(&config, port),
    }
}

/// Seconds to a URL lifetime, refusing values clap would not have let through
fn url_lifetime(seconds: i64) -> CliResult<Duration> {
    if !(1..=MAX_EXPIRES_IN).contains(&seconds) {
        return Err(CliError::config_error(format!(
            "expires-in must be between 1 and {} seconds, got {}",
            MAX_EXPIRES_IN, seconds
        )));
    }
    Duration::try_seconds(seconds)
        .ok_or_else(|| CliError::config_error(format!("expires-in {} is out of range", seconds)))
}

/// Load the configuration and build every service
pub fn load_registry(config_path: &Path) -> CliResult<(StorageConfig, Registry)> {
    let config = StorageConfig::load(config_path)?;
    let path = config_path.display().to_string();
    log_event(Event::ConfigLoaded, &[("path", path.as_str())]);

    let registry = Registry::build(&config)?;
    Ok((config, registry))
}

fn open(target: &Target) -> CliResult<(Registry, Arc<dyn StorageBackend>)> {
    let (_, registry) = load_registry(&target.config)?;
    let service = registry.service(target.service.as_deref())?;
    Ok((registry, service))
}

fn report_json(report: &FanOutReport) -> Value {
    json!({
        "succeeded": report.succeeded,
        "failed": report
            .failed
            .iter()
            .map(|f| json!({ "mirror": f.mirror, "error": f.error.to_string() }))
            .collect::<Vec<_>>(),
    })
}

/// Build the registry and describe it
pub fn check(config_path: &Path) -> CliResult<()> {
    let (config, registry) = load_registry(config_path)?;

    let services: Vec<Value> = registry
        .names()
        .map(|name| {
            let mut entry = json!({ "name": name });
            if let Some(service_config) = config.services.get(name) {
                entry["type"] = json!(service_config.kind());
                entry["depends_on"] = json!(service_config.references());
                if let ServiceConfig::Mirror {
                    primary, mirrors, ..
                } = service_config
                {
                    entry["primary"] = json!(primary);
                    entry["mirrors"] = json!(mirrors);
                }
            }
            entry
        })
        .collect();

    write_response(json!({
        "services": services,
        "default_service": config.default_service,
    }))
}

pub fn upload(
    target: &Target,
    file: &Path,
    key: Option<String>,
    content_type: Option<String>,
    checksum: Option<String>,
) -> CliResult<()> {
    let (registry, service) = open(target)?;
    let key = key.unwrap_or_else(generate_unique_key);

    let checksum = match checksum {
        Some(checksum) => checksum,
        None => checksum::compute_reader(&mut File::open(file)?)?,
    };
    let options = UploadOptions {
        checksum: Some(checksum.clone()),
        content_type,
    };

    let mut io = File::open(file)?;
    let mut response = json!({
        "service": service.name(),
        "key": key,
        "checksum": checksum,
    });

    match registry.mirror(service.name()) {
        Some(mirror) => {
            let report = mirror.upload_with_report(&key, &mut io, &options)?;
            response["mirrors"] = report_json(&report);
        }
        None => service.upload(&key, &mut io, &options)?,
    }

    write_response(response)
}

pub fn download(
    target: &Target,
    key: &str,
    output: Option<&Path>,
    range: Option<std::ops::Range<u64>>,
) -> CliResult<()> {
    let (_, service) = open(target)?;

    let data = match range {
        Some(range) => service.download_chunk(key, range)?,
        None => service.download(key)?,
    };

    let mut response = json!({ "key": key, "bytes": data.len() });
    match output {
        Some(path) => {
            fs::write(path, &data)?;
            response["output"] = json!(path.to_string_lossy());
        }
        None => response["content_base64"] = json!(STANDARD.encode(&data)),
    }

    write_response(response)
}

pub fn exists(target: &Target, key: &str) -> CliResult<()> {
    let (_, service) = open(target)?;
    let exists = service.exists(key)?;
    write_response(json!({ "key": key, "exists": exists }))
}

pub fn delete(target: &Target, key: &str) -> CliResult<()> {
    let (registry, service) = open(target)?;

    let mut response = json!({ "key": key, "deleted": true });
    match registry.mirror(service.name()) {
        Some(mirror) => response["mirrors"] = report_json(&mirror.delete_with_report(key)?),
        None => service.delete(key)?,
    }

    write_response(response)
}

pub fn delete_prefixed(target: &Target, prefix: &str) -> CliResult<()> {
    let (registry, service) = open(target)?;

    let mut response = json!({ "prefix": prefix, "deleted": true });
    match registry.mirror(service.name()) {
        Some(mirror) => {
            response["mirrors"] = report_json(&mirror.delete_prefixed_with_report(prefix)?)
        }
        None => service.delete_prefixed(prefix)?,
    }

    write_response(response)
}

pub fn url(target: &Target, key: &str, options: &UrlOptions) -> CliResult<()> {
    let (_, service) = open(target)?;
    let url = service.url(key, options)?;
    write_response(json!({ "key": key, "url": url }))
}

pub fn direct_upload_url(
    target: &Target,
    key: Option<String>,
    options: &DirectUploadOptions,
) -> CliResult<()> {
    let (_, service) = open(target)?;
    let key = key.unwrap_or_else(generate_unique_key);

    let url = service.url_for_direct_upload(&key, options)?;
    let headers = service.headers_for_direct_upload(&key, options);

    write_response(json!({ "key": key, "url": url, "headers": headers }))
}

/// Reconcile mirrors of a mirror service for one key
pub fn mirror(target: &Target, key: &str, checksum: Option<&str>) -> CliResult<()> {
    let (registry, service) = open(target)?;
    let mirror = registry.mirror(service.name()).ok_or_else(|| {
        CliError::config_error(format!("service '{}' is not a mirror service", service.name()))
    })?;

    let report = mirror.mirror(key, checksum)?;
    write_response(json!({ "key": key, "mirrors": report_json(&report) }))
}

/// Start the HTTP server
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let (config, registry) = load_registry(config_path)?;

    use crate::http_server::HttpServer;

    let mut http_config = config.http.clone();
    if let Some(port) = port {
        http_config.port = port;
    }
    let server = HttpServer::new(http_config, Arc::new(registry));

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        server
            .start()
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
    })?;

    Ok(())
}
