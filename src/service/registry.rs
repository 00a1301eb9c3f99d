//! # Service Registry
//!
//! Resolves a `StorageConfig` into constructed backends, once, at startup.
//! Mirror entries reference other entries by name; references are resolved
//! depth-first and memoised so every service is built exactly once and shared.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;

use super::config::{ServiceConfig, StorageConfig};
use super::disk::DiskBackend;
use super::errors::{StorageError, StorageResult};
use super::memory::MemoryBackend;
use super::mirror::{MirrorBackend, MirrorOptions};
use super::payload::DEFAULT_SPOOL_THRESHOLD;
use super::StorageBackend;
use crate::observability::{log_event, Event};

/// Label used when a lookup is not driven by another service
const ROOT_REFERENCE: &str = "configuration";

/// Named, fully constructed services
#[derive(Debug, Default)]
pub struct Registry {
    services: BTreeMap<String, Arc<dyn StorageBackend>>,
    disks: BTreeMap<String, Arc<DiskBackend>>,
    mirrors: BTreeMap<String, Arc<MirrorBackend>>,
    default_service: Option<String>,
}

impl Registry {
    /// Build every configured service.
    ///
    /// Fails with `UnknownService`, `ServiceCycle` or `InvalidConfig`; these
    /// are the only places configuration errors are raised.
    pub fn build(config: &StorageConfig) -> StorageResult<Self> {
        let mut builder = Builder {
            config,
            registry: Registry::default(),
            resolving: Vec::new(),
        };

        for name in config.services.keys() {
            builder.resolve(name, ROOT_REFERENCE)?;
        }

        let mut registry = builder.registry;

        if let Some(default) = &config.default_service {
            if !registry.services.contains_key(default) {
                return Err(StorageError::InvalidConfig(format!(
                    "default_service '{}' is not configured",
                    default
                )));
            }
            registry.default_service = Some(default.clone());
        }

        let count = registry.services.len().to_string();
        log_event(
            Event::RegistryBuilt,
            &[
                ("services", count.as_str()),
                ("default", registry.default_service.as_deref().unwrap_or("")),
            ],
        );

        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StorageBackend>> {
        self.services.get(name).cloned()
    }

    /// The configured default service, if any
    pub fn default_service(&self) -> Option<Arc<dyn StorageBackend>> {
        self.default_service.as_deref().and_then(|name| self.get(name))
    }

    /// Look up `name`, falling back to the default service when `None`
    pub fn service(&self, name: Option<&str>) -> StorageResult<Arc<dyn StorageBackend>> {
        let name = match name.or(self.default_service.as_deref()) {
            Some(name) => name,
            None => {
                return Err(StorageError::InvalidConfig(
                    "no service given and no default_service configured".to_string(),
                ))
            }
        };

        self.get(name).ok_or_else(|| StorageError::UnknownService {
            name: name.to_string(),
            referenced_by: "request".to_string(),
        })
    }

    pub fn disk(&self, name: &str) -> Option<Arc<DiskBackend>> {
        self.disks.get(name).cloned()
    }

    pub fn mirror(&self, name: &str) -> Option<Arc<MirrorBackend>> {
        self.mirrors.get(name).cloned()
    }

    /// All mirror services, in name order
    pub fn mirror_services(&self) -> impl Iterator<Item = (&str, &Arc<MirrorBackend>)> {
        self.mirrors.iter().map(|(name, mirror)| (name.as_str(), mirror))
    }

    /// Service names, in name order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

struct Builder<'a> {
    config: &'a StorageConfig,
    registry: Registry,
    /// Names currently being constructed, outermost first
    resolving: Vec<String>,
}

impl<'a> Builder<'a> {
    fn resolve(
        &mut self,
        name: &str,
        referenced_by: &str,
    ) -> StorageResult<Arc<dyn StorageBackend>> {
        if let Some(service) = self.registry.services.get(name) {
            return Ok(Arc::clone(service));
        }

        if let Some(start) = self.resolving.iter().position(|n| n == name) {
            let mut cycle = self.resolving[start..].to_vec();
            cycle.push(name.to_string());
            return Err(StorageError::ServiceCycle(cycle));
        }

        let config: &'a StorageConfig = self.config;
        let service_config = config.services.get(name).ok_or_else(|| {
            StorageError::UnknownService {
                name: name.to_string(),
                referenced_by: referenced_by.to_string(),
            }
        })?;

        self.resolving.push(name.to_string());
        let built = self.construct(name, service_config);
        self.resolving.pop();

        let service = built?;
        self.registry
            .services
            .insert(name.to_string(), Arc::clone(&service));
        Ok(service)
    }

    fn construct(
        &mut self,
        name: &str,
        service_config: &'a ServiceConfig,
    ) -> StorageResult<Arc<dyn StorageBackend>> {
        match service_config {
            ServiceConfig::Disk { root, host, secret } => {
                let secret = secret
                    .as_deref()
                    .or(self.config.secret.as_deref())
                    .ok_or_else(|| {
                        StorageError::InvalidConfig(format!(
                            "disk service '{}' has no signing secret",
                            name
                        ))
                    })?;
                let host = host.as_deref().unwrap_or(&self.config.host);

                let disk = Arc::new(DiskBackend::new(
                    name,
                    root.clone(),
                    host,
                    secret.as_bytes(),
                ));
                self.registry
                    .disks
                    .insert(name.to_string(), Arc::clone(&disk));
                Ok(disk)
            }

            ServiceConfig::Memory { secret } => {
                let secret = match secret.as_deref().or(self.config.secret.as_deref()) {
                    Some(secret) => secret.as_bytes().to_vec(),
                    None => {
                        // Memory URLs never leave the process
                        let mut random = vec![0u8; 32];
                        rand::thread_rng().fill_bytes(&mut random);
                        random
                    }
                };
                Ok(Arc::new(MemoryBackend::new(name, &secret)))
            }

            ServiceConfig::Mirror {
                primary,
                mirrors,
                fan_out,
                deadline_ms,
                spool_threshold,
            } => {
                if mirrors.iter().any(|m| m == primary) {
                    return Err(StorageError::InvalidConfig(format!(
                        "mirror service '{}' lists its primary '{}' as a mirror",
                        name, primary
                    )));
                }

                let primary = self.resolve(primary, name)?;
                let mirrors = mirrors
                    .iter()
                    .map(|mirror| self.resolve(mirror, name))
                    .collect::<StorageResult<Vec<_>>>()?;

                let options = MirrorOptions {
                    fan_out: *fan_out,
                    deadline: deadline_ms.map(Duration::from_millis),
                    spool_threshold: spool_threshold.unwrap_or(DEFAULT_SPOOL_THRESHOLD),
                };

                let mirror = Arc::new(MirrorBackend::new(name, primary, mirrors, options)?);
                self.registry
                    .mirrors
                    .insert(name.to_string(), Arc::clone(&mirror));
                Ok(mirror)
            }
        }
    }
}
