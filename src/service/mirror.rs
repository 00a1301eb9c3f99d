//! # Mirror Backend
//!
//! Presents one primary and a set of mirrors as a single backend.
//!
//! - Reads, existence checks and URLs come from the primary only.
//! - Uploads go to the primary first. A primary failure fails the upload
//!   and no mirror is attempted; mirror failures are logged and counted
//!   but never fail the upload.
//! - Deletes go to every backend independently. Only a primary failure is
//!   returned to the caller, after every backend has been attempted.
//! - Direct upload URLs are issued by the primary alone, so a direct upload
//!   reaches the mirrors only through a later [`MirrorBackend::mirror`] call.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::ops::Range;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::backend::{DirectUploadOptions, StorageBackend, UploadOptions, UrlOptions};
use super::checksum;
use super::errors::{StorageError, StorageResult};
use super::payload::{Payload, DEFAULT_SPOOL_THRESHOLD};
use crate::observability::{log_event, Event, MetricsRegistry, ObservationScope};

/// How operations are issued to several backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOut {
    /// One thread per backend
    #[default]
    Concurrent,
    /// Backends one after another, in configuration order
    Sequential,
}

/// Mirror tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOptions {
    pub fan_out: FanOut,
    /// Aggregate deadline for one upload, delete or mirror run.
    ///
    /// A primary that misses it fails the operation; mirrors that miss it
    /// are abandoned and reported as failed.
    pub deadline: Option<Duration>,
    /// Uploads larger than this are spooled to a temporary file
    pub spool_threshold: usize,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            fan_out: FanOut::Concurrent,
            deadline: None,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
        }
    }
}

/// A mirror that did not take part in an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorFailure {
    pub mirror: String,
    pub error: StorageError,
}

/// Outcome of an operation across the mirror set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<MirrorFailure>,
}

impl FanOutReport {
    /// Every mirror that was asked succeeded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_mirrors(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.mirror.as_str()).collect()
    }
}

type Task = Arc<dyn Fn(&dyn StorageBackend) -> StorageResult<()> + Send + Sync>;

type Outcome = (String, StorageResult<()>);

/// Backend that fans writes out to a primary and its mirrors
#[derive(Debug)]
pub struct MirrorBackend {
    name: String,
    primary: Arc<dyn StorageBackend>,
    mirrors: Vec<Arc<dyn StorageBackend>>,
    options: MirrorOptions,
    metrics: MetricsRegistry,
}

impl MirrorBackend {
    /// Compose `primary` and `mirrors`.
    ///
    /// Fails if there are no mirrors, if the primary is also listed as a
    /// mirror, or if a mirror is listed twice.
    pub fn new(
        name: impl Into<String>,
        primary: Arc<dyn StorageBackend>,
        mirrors: Vec<Arc<dyn StorageBackend>>,
        options: MirrorOptions,
    ) -> StorageResult<Self> {
        let name = name.into();

        if mirrors.is_empty() {
            return Err(StorageError::InvalidConfig(format!(
                "mirror service '{}' has no mirrors",
                name
            )));
        }

        let mut seen = HashSet::new();
        for mirror in &mirrors {
            if mirror.name() == primary.name() {
                return Err(StorageError::InvalidConfig(format!(
                    "mirror service '{}' lists its primary '{}' as a mirror",
                    name,
                    primary.name()
                )));
            }
            if !seen.insert(mirror.name().to_string()) {
                return Err(StorageError::InvalidConfig(format!(
                    "mirror service '{}' lists '{}' more than once",
                    name,
                    mirror.name()
                )));
            }
        }

        Ok(Self {
            name,
            primary,
            mirrors,
            options,
            metrics: MetricsRegistry::new(),
        })
    }

    pub fn primary(&self) -> &Arc<dyn StorageBackend> {
        &self.primary
    }

    pub fn mirrors(&self) -> &[Arc<dyn StorageBackend>] {
        &self.mirrors
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Upload to the primary, then to every mirror.
    ///
    /// `io` is drained exactly once. The returned report lists the mirrors
    /// that did and did not receive the blob.
    pub fn upload_with_report(
        &self,
        key: &str,
        io: &mut dyn Read,
        options: &UploadOptions,
    ) -> StorageResult<FanOutReport> {
        let scope = ObservationScope::with_fields(
            "MIRROR_UPLOAD",
            &[("key", key), ("service", self.name.as_str())],
        );
        let deadline = self.deadline();

        let payload = match Payload::buffer(io, self.options.spool_threshold) {
            Ok(payload) => Arc::new(payload),
            Err(e) => {
                scope.fail(&e.to_string());
                return Err(e);
            }
        };

        let task: Task = {
            let key = key.to_string();
            let options = options.clone();
            let payload = Arc::clone(&payload);
            Arc::new(move |backend: &dyn StorageBackend| {
                let mut reader = payload.reader()?;
                backend.upload(&key, &mut reader, &options)
            })
        };

        if let Err(e) = self.run_on_primary("upload", &task, deadline) {
            self.metrics.increment_primary_failures();
            log_event(
                Event::PrimaryUploadFailed,
                &[
                    ("error", e.to_string().as_str()),
                    ("key", key),
                    ("primary", self.primary.name()),
                    ("service", self.name.as_str()),
                ],
            );
            scope.fail(&e.to_string());
            return Err(e);
        }
        self.metrics.increment_uploads();
        self.metrics.add_uploaded_bytes(payload.len());

        let outcomes = self.fan_out("upload", &self.mirrors, &task, deadline);
        let report = self.report(Event::MirrorUploadFailed, key, outcomes);
        self.metrics.add_mirror_uploads(report.succeeded.len() as u64);
        self.metrics
            .add_mirror_upload_failures(report.failed.len() as u64);

        scope.complete_with_fields(&[
            ("bytes", payload.len().to_string().as_str()),
            ("mirrors_failed", report.failed.len().to_string().as_str()),
            ("spooled", if payload.is_spooled() { "true" } else { "false" }),
        ]);
        Ok(report)
    }

    /// Delete `key` everywhere. See the module docs for failure handling.
    pub fn delete_with_report(&self, key: &str) -> StorageResult<FanOutReport> {
        let target = key.to_string();
        self.delete_everywhere("MIRROR_DELETE", key, move |backend: &dyn StorageBackend| {
            match backend.delete(&target) {
                Err(StorageError::ObjectNotFound(_)) => Ok(()),
                other => other,
            }
        })
    }

    /// Delete every key under `prefix` everywhere
    pub fn delete_prefixed_with_report(&self, prefix: &str) -> StorageResult<FanOutReport> {
        let target = prefix.to_string();
        self.delete_everywhere(
            "MIRROR_DELETE_PREFIXED",
            prefix,
            move |backend: &dyn StorageBackend| backend.delete_prefixed(&target),
        )
    }

    /// Copy `key` from the primary to every mirror that does not have it.
    ///
    /// This is how blobs that bypassed the mirror, such as direct uploads,
    /// are brought onto the mirrors. The primary copy is checked against
    /// `checksum` when one is given.
    pub fn mirror(&self, key: &str, checksum: Option<&str>) -> StorageResult<FanOutReport> {
        let scope = ObservationScope::with_fields(
            "MIRROR_COPY",
            &[("key", key), ("service", self.name.as_str())],
        );
        let deadline = self.deadline();

        // A mirror we cannot ask is treated as lagging
        let lagging: Vec<Arc<dyn StorageBackend>> = self
            .mirrors
            .iter()
            .filter(|mirror| !matches!(mirror.exists(key), Ok(true)))
            .cloned()
            .collect();

        if lagging.is_empty() {
            scope.complete_with_fields(&[("copied", "0")]);
            return Ok(FanOutReport::default());
        }

        let data = match self
            .primary
            .download(key)
            .and_then(|data| checksum::verify(key, &data, checksum).map(|_| data))
        {
            Ok(data) => data,
            Err(e) => {
                scope.fail(&e.to_string());
                return Err(e);
            }
        };

        let task: Task = {
            let key = key.to_string();
            let options = UploadOptions {
                checksum: checksum.map(str::to_string),
                content_type: None,
            };
            let payload = Arc::new(Payload::Memory(data));
            Arc::new(move |backend: &dyn StorageBackend| {
                let mut reader = payload.reader()?;
                backend.upload(&key, &mut reader, &options)
            })
        };

        let outcomes = self.fan_out("mirror", &lagging, &task, deadline);
        let report = self.report(Event::MirrorCopyFailed, key, outcomes);
        self.metrics.add_mirrored(report.succeeded.len() as u64);
        self.metrics
            .add_mirror_upload_failures(report.failed.len() as u64);

        scope.complete_with_fields(&[("copied", report.succeeded.len().to_string().as_str())]);
        Ok(report)
    }

    fn delete_everywhere<F>(
        &self,
        scope_name: &str,
        target: &str,
        op: F,
    ) -> StorageResult<FanOutReport>
    where
        F: Fn(&dyn StorageBackend) -> StorageResult<()> + Send + Sync + 'static,
    {
        let scope = ObservationScope::with_fields(
            scope_name,
            &[("key", target), ("service", self.name.as_str())],
        );
        let task: Task = Arc::new(op);

        let targets: Vec<Arc<dyn StorageBackend>> = std::iter::once(Arc::clone(&self.primary))
            .chain(self.mirrors.iter().cloned())
            .collect();

        let mut outcomes = self.fan_out("delete", &targets, &task, self.deadline());
        let (_, primary_result) = outcomes.remove(0);
        let report = self.report(Event::MirrorDeleteFailed, target, outcomes);

        self.metrics.increment_deletes();
        self.metrics
            .add_mirror_delete_failures(report.failed.len() as u64);

        match primary_result {
            Ok(()) => {
                scope.complete_with_fields(&[(
                    "mirrors_failed",
                    report.failed.len().to_string().as_str(),
                )]);
                Ok(report)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.options.deadline.map(|d| Instant::now() + d)
    }

    fn run_on_primary(
        &self,
        op: &str,
        task: &Task,
        deadline: Option<Instant>,
    ) -> StorageResult<()> {
        self.run_sequential(op, std::slice::from_ref(&self.primary), task, deadline)
            .remove(0)
            .1
    }

    fn fan_out(
        &self,
        op: &str,
        targets: &[Arc<dyn StorageBackend>],
        task: &Task,
        deadline: Option<Instant>,
    ) -> Vec<Outcome> {
        match self.options.fan_out {
            FanOut::Concurrent => self.run_concurrent(op, targets, task, deadline),
            FanOut::Sequential => self.run_sequential(op, targets, task, deadline),
        }
    }

    fn run_sequential(
        &self,
        op: &str,
        targets: &[Arc<dyn StorageBackend>],
        task: &Task,
        deadline: Option<Instant>,
    ) -> Vec<Outcome> {
        targets
            .iter()
            .map(|target| match deadline {
                None => (target.name().to_string(), task(target.as_ref())),
                Some(at) if Instant::now() >= at => (
                    target.name().to_string(),
                    Err(StorageError::DeadlineExceeded(target.name().to_string())),
                ),
                // Only a separate thread can be abandoned at the deadline
                Some(_) => self
                    .run_concurrent(op, std::slice::from_ref(target), task, deadline)
                    .remove(0),
            })
            .collect()
    }

    fn run_concurrent(
        &self,
        op: &str,
        targets: &[Arc<dyn StorageBackend>],
        task: &Task,
        deadline: Option<Instant>,
    ) -> Vec<Outcome> {
        let (tx, rx) = mpsc::channel();
        let mut results: Vec<Option<StorageResult<()>>> = vec![None; targets.len()];
        let mut pending = 0usize;

        for (index, target) in targets.iter().enumerate() {
            let target = Arc::clone(target);
            let task = Arc::clone(task);
            let tx = tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("{}-{}-{}", self.name, op, target.name()))
                .spawn(move || {
                    let result = task(target.as_ref());
                    // The receiver is gone once the deadline passed
                    let _ = tx.send((index, result));
                });

            match spawned {
                Ok(_) => pending += 1,
                Err(e) => {
                    results[index] = Some(Err(StorageError::Internal(format!(
                        "failed to start {} task: {}",
                        op, e
                    ))))
                }
            }
        }
        drop(tx);

        let mut timed_out = false;
        while pending > 0 {
            let received = match deadline {
                None => rx.recv().ok(),
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        timed_out = true;
                        break;
                    }
                    match rx.recv_timeout(at - now) {
                        Ok(message) => Some(message),
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            timed_out = true;
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Disconnected) => None,
                    }
                }
            };

            match received {
                Some((index, result)) => {
                    results[index] = Some(result);
                    pending -= 1;
                }
                None => break,
            }
        }

        targets
            .iter()
            .zip(results)
            .map(|(target, result)| {
                let name = target.name().to_string();
                let result = result.unwrap_or_else(|| {
                    Err(if timed_out {
                        StorageError::DeadlineExceeded(name.clone())
                    } else {
                        StorageError::Internal(format!("{} task on {} panicked", op, name))
                    })
                });
                (name, result)
            })
            .collect()
    }

    fn report(&self, event: Event, key: &str, outcomes: Vec<Outcome>) -> FanOutReport {
        let mut report = FanOutReport::default();

        for (mirror, result) in outcomes {
            match result {
                Ok(()) => report.succeeded.push(mirror),
                Err(error) => {
                    if matches!(error, StorageError::DeadlineExceeded(_)) {
                        self.metrics.increment_mirror_timeouts();
                    }
                    log_event(
                        event,
                        &[
                            ("error", error.to_string().as_str()),
                            ("key", key),
                            ("mirror", mirror.as_str()),
                            ("service", self.name.as_str()),
                        ],
                    );
                    report.failed.push(MirrorFailure { mirror, error });
                }
            }
        }

        report
    }
}

impl StorageBackend for MirrorBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn upload(&self, key: &str, io: &mut dyn Read, options: &UploadOptions) -> StorageResult<()> {
        self.upload_with_report(key, io, options).map(|_| ())
    }

    fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.primary.download(key)
    }

    fn download_chunk(&self, key: &str, range: Range<u64>) -> StorageResult<Vec<u8>> {
        self.primary.download_chunk(key, range)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.delete_with_report(key).map(|_| ())
    }

    fn delete_prefixed(&self, prefix: &str) -> StorageResult<()> {
        self.delete_prefixed_with_report(prefix).map(|_| ())
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        self.primary.exists(key)
    }

    fn url(&self, key: &str, options: &UrlOptions) -> StorageResult<String> {
        self.primary.url(key, options)
    }

    fn url_for_direct_upload(
        &self,
        key: &str,
        options: &DirectUploadOptions,
    ) -> StorageResult<String> {
        self.primary.url_for_direct_upload(key, options)
    }

    fn headers_for_direct_upload(
        &self,
        key: &str,
        options: &DirectUploadOptions,
    ) -> BTreeMap<String, String> {
        self.primary.headers_for_direct_upload(key, options)
    }
}
