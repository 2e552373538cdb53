//! Per-workspace reader/writer locks.
//!
//! Repositories share one working tree and one index, so mutations on the
//! same slug must not interleave. Different slugs never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::Slug;

/// Lock table keyed by slug.
///
/// Entries are created on first use and kept for the life of the store,
/// one per workspace ever touched.
#[derive(Default)]
pub(crate) struct LockRegistry {
    locks: Mutex<HashMap<Slug, Arc<RwLock<()>>>>,
}

impl LockRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn handle(&self, slug: &Slug) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        locks.entry(slug.clone()).or_default().clone()
    }

    /// Run `f` holding the shared lock for `slug`.
    pub(crate) fn read<T>(
        &self,
        slug: &Slug,
        timeout: Duration,
        f: impl FnOnce() -> StorageResult<T>,
    ) -> StorageResult<T> {
        let lock = self.handle(slug);
        let _guard = lock
            .try_read_for(timeout)
            .ok_or_else(|| timed_out(slug, timeout))?;
        f()
    }

    /// Run `f` holding the exclusive lock for `slug`.
    pub(crate) fn write<T>(
        &self,
        slug: &Slug,
        timeout: Duration,
        f: impl FnOnce() -> StorageResult<T>,
    ) -> StorageResult<T> {
        let lock = self.handle(slug);
        let started = Instant::now();
        let _guard = lock
            .try_write_for(timeout)
            .ok_or_else(|| timed_out(slug, timeout))?;
        debug!(slug = %slug, waited_ms = started.elapsed().as_millis() as u64, "acquired write lock");
        f()
    }

    /// Run `f` holding `source` shared and `target` exclusive.
    ///
    /// Both locks are taken in slug order so two opposite duplications cannot
    /// deadlock; the timeout bounds the combined wait.
    pub(crate) fn read_then_write<T>(
        &self,
        source: &Slug,
        target: &Slug,
        timeout: Duration,
        f: impl FnOnce() -> StorageResult<T>,
    ) -> StorageResult<T> {
        debug_assert_ne!(source, target);
        let deadline = Instant::now() + timeout;
        let remaining = || deadline.saturating_duration_since(Instant::now());

        let source_lock = self.handle(source);
        let target_lock = self.handle(target);

        if source < target {
            let _read = source_lock
                .try_read_for(remaining())
                .ok_or_else(|| timed_out(source, timeout))?;
            let _write = target_lock
                .try_write_for(remaining())
                .ok_or_else(|| timed_out(target, timeout))?;
            f()
        } else {
            let _write = target_lock
                .try_write_for(remaining())
                .ok_or_else(|| timed_out(target, timeout))?;
            let _read = source_lock
                .try_read_for(remaining())
                .ok_or_else(|| timed_out(source, timeout))?;
            f()
        }
    }
}

fn timed_out(slug: &Slug, waited: Duration) -> StorageError {
    StorageError::Timeout {
        slug: slug.to_string(),
        waited,
    }
}
