//! Exclusive, time-bounded claims on a service identity.
//!
//! A run holds a [`LeaseGuard`] from before the build until it reaches a
//! terminal state. Within one process the [`LeaseRegistry`] table rejects a
//! second claim outright; with a lock directory configured, a lock file
//! extends the exclusion to other processes and machines sharing that
//! directory.

use std::collections::HashSet;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rollout_core::{LeaseConfig, ServiceIdentity};
use serde::{Deserialize, Serialize};

/// Contents of a lease file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    /// Hostname of the machine holding the lease
    pub holder: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    /// `project.region.service`
    pub identity: String,
}

impl LeaseInfo {
    fn for_current_process(identity: &ServiceIdentity) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
            identity: identity.key(),
        }
    }

    /// Whether the lease is older than `stale_after`.
    ///
    /// A timestamp in the future (clock skew) is never stale.
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        Utc::now()
            .signed_duration_since(self.acquired_at)
            .to_std()
            .is_ok_and(|age| age >= stale_after)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("another run holds the lease on {identity} ({held_by})")]
pub struct LeaseConflictError {
    pub identity: ServiceIdentity,
    /// Who holds it, as far as can be told
    pub held_by: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    #[error(transparent)]
    Conflict(#[from] LeaseConflictError),

    #[error("failed to {action} lease file {path}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode lease record")]
    Encode { source: serde_json::Error },
}

impl LeaseError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "lease_conflict",
            Self::Io { .. } | Self::Encode { .. } => "lease_unavailable",
        }
    }
}

/// Shared table of held leases. Clones share the same table.
#[derive(Debug, Clone)]
pub struct LeaseRegistry {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    held: Mutex<HashSet<ServiceIdentity>>,
    dir: Option<PathBuf>,
    stale_after: Duration,
}

impl Default for LeaseRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LeaseRegistry {
    /// Leases that only exclude runs within this process.
    pub fn in_memory() -> Self {
        Self::build(None, LeaseConfig::default().stale_after)
    }

    /// Leases that also take a lock file in `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self::build(Some(dir.into()), stale_after)
    }

    pub fn from_config(config: &LeaseConfig) -> Self {
        Self::build(config.dir.clone(), config.stale_after)
    }

    fn build(dir: Option<PathBuf>, stale_after: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                held: Mutex::new(HashSet::new()),
                dir,
                stale_after,
            }),
        }
    }

    /// Claim `identity` until the returned guard is dropped.
    pub fn acquire(&self, identity: &ServiceIdentity) -> Result<LeaseGuard, LeaseError> {
        if !self.inner.held.lock().insert(identity.clone()) {
            return Err(LeaseConflictError {
                identity: identity.clone(),
                held_by: "a run in this process".to_owned(),
            }
            .into());
        }

        let file = match &self.inner.dir {
            Some(dir) => match acquire_file(dir, identity, self.inner.stale_after) {
                Ok(held) => Some(held),
                Err(e) => {
                    self.inner.held.lock().remove(identity);
                    return Err(e);
                }
            },
            None => None,
        };

        tracing::debug!(
            %identity,
            file = ?file.as_ref().map(|held| &held.path),
            "lease acquired"
        );
        Ok(LeaseGuard {
            registry: self.clone(),
            identity: identity.clone(),
            file,
        })
    }

    pub fn is_held(&self, identity: &ServiceIdentity) -> bool {
        self.inner.held.lock().contains(identity)
    }

    /// Path of the lease file for `identity`, when file leases are enabled.
    pub fn lease_path(&self, identity: &ServiceIdentity) -> Option<PathBuf> {
        self.inner.dir.as_deref().map(|dir| lease_path(dir, identity))
    }
}

/// A held lease. Dropping it releases the claim.
#[derive(Debug)]
pub struct LeaseGuard {
    registry: LeaseRegistry,
    identity: ServiceIdentity,
    file: Option<HeldFile>,
}

/// A lease file this process wrote, with the exact bytes it wrote.
#[derive(Debug)]
struct HeldFile {
    path: PathBuf,
    body: Vec<u8>,
}

impl LeaseGuard {
    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Some(held) = &self.file {
            match remove_if_unchanged(&held.path, &held.body) {
                Ok(true) => {}
                Ok(false) => tracing::warn!(
                    path = %held.path.display(),
                    "lease file was taken over by another run, leaving it in place"
                ),
                Err(e) => tracing::warn!(error = %e, "failed to remove lease file"),
            }
        }
        self.registry.inner.held.lock().remove(&self.identity);
        tracing::debug!(identity = %self.identity, "lease released");
    }
}

fn lease_path(dir: &Path, identity: &ServiceIdentity) -> PathBuf {
    dir.join(format!("{}.lock", identity.key()))
}

/// Take the lease file, breaking it once if it is stale.
///
/// A record that does not parse is only stale once the file itself is older
/// than `stale_after`, so a file another run is still writing is respected.
fn acquire_file(
    dir: &Path,
    identity: &ServiceIdentity,
    stale_after: Duration,
) -> Result<HeldFile, LeaseError> {
    std::fs::create_dir_all(dir).map_err(|e| LeaseError::Io {
        action: "create directory for",
        path: dir.to_path_buf(),
        source: e,
    })?;

    let path = lease_path(dir, identity);
    let info = LeaseInfo::for_current_process(identity);
    let body = serde_json::to_vec(&info).map_err(|e| LeaseError::Encode { source: e })?;

    if link_into_place(dir, &path, &body)? {
        return Ok(HeldFile { path, body });
    }

    // None: released between the failed link and the read
    if let Some(existing) = ExistingLease::read(&path)? {
        if !existing.is_stale(stale_after) {
            return Err(LeaseConflictError {
                identity: identity.clone(),
                held_by: existing.holder(),
            }
            .into());
        }
        tracing::warn!(
            path = %path.display(),
            held_by = %existing.holder(),
            "breaking stale lease"
        );
        if !remove_if_unchanged(&path, &existing.raw)? {
            return Err(taken_while_breaking(identity));
        }
    }

    if link_into_place(dir, &path, &body)? {
        Ok(HeldFile { path, body })
    } else {
        Err(taken_while_breaking(identity))
    }
}

fn taken_while_breaking(identity: &ServiceIdentity) -> LeaseError {
    LeaseConflictError {
        identity: identity.clone(),
        held_by: "a run that took the lease while it was being broken".to_owned(),
    }
    .into()
}

/// A lease file found on disk.
struct ExistingLease {
    raw: Vec<u8>,
    record: Result<LeaseInfo, serde_json::Error>,
    modified: Option<SystemTime>,
}

impl ExistingLease {
    /// `Ok(None)` if there is no file.
    fn read(path: &Path) -> Result<Option<Self>, LeaseError> {
        let io_error = |source| LeaseError::Io {
            action: "read",
            path: path.to_path_buf(),
            source,
        };
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };
        let modified = match std::fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => Some(modified),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "lease file has no mtime");
                None
            }
        };
        let record = serde_json::from_slice(&raw);
        Ok(Some(Self {
            raw,
            record,
            modified,
        }))
    }

    fn is_stale(&self, stale_after: Duration) -> bool {
        match &self.record {
            Ok(info) => info.is_stale(stale_after),
            Err(_) => self
                .modified
                .is_some_and(|at| at.elapsed().is_ok_and(|age| age >= stale_after)),
        }
    }

    fn holder(&self) -> String {
        match &self.record {
            Ok(info) => format!("{} pid {} since {}", info.holder, info.pid, info.acquired_at),
            Err(e) => format!("an unreadable lease record ({e})"),
        }
    }
}

/// Publish `body` at `path` in one step, `Ok(false)` if `path` exists.
///
/// The record is written to a temporary file first and hard-linked into
/// place, so the lease file is never observed half-written.
fn link_into_place(dir: &Path, path: &Path, body: &[u8]) -> Result<bool, LeaseError> {
    let io_error = |action, source| LeaseError::Io {
        action,
        path: path.to_path_buf(),
        source,
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".lease-")
        .tempfile_in(dir)
        .map_err(|e| io_error("stage", e))?;
    staged
        .write_all(body)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|e| io_error("write", e))?;

    let linked = match std::fs::hard_link(staged.path(), path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => false,
        Err(e) => return Err(io_error("create", e)),
    };

    if let Err(e) = staged.close() {
        tracing::warn!(dir = %dir.display(), error = %e, "failed to remove staged lease record");
    }
    Ok(linked)
}

/// Remove `path` only if it still holds `expected`.
///
/// `Ok(false)` if another run has replaced the file. A missing file counts
/// as removed.
fn remove_if_unchanged(path: &Path, expected: &[u8]) -> Result<bool, LeaseError> {
    let io_error = |action, source| LeaseError::Io {
        action,
        path: path.to_path_buf(),
        source,
    };

    match std::fs::read(path) {
        Ok(current) if current != expected => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(io_error("read", e)),
    }
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
        Err(e) => Err(io_error("remove", e)),
    }
}
