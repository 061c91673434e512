//! In-memory store backend for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::backend::StoreBackend;
use crate::model::Tables;
use nubz_common::{Error, Result};

/// In-memory store backend.
///
/// Useful for testing and development. The snapshot is lost on drop.
/// Persists can be made to fail on demand to exercise rollback paths.
pub struct MemoryBackend {
    snapshot: RwLock<Option<Tables>>,
    persists: AtomicUsize,
    failures_pending: AtomicUsize,
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
            persists: AtomicUsize::new(0),
            failures_pending: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` persists fail with an I/O error.
    pub fn fail_next_persists(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Number of successful persists so far.
    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    /// Last persisted snapshot.
    pub fn snapshot(&self) -> Option<Tables> {
        self.snapshot.read().unwrap().clone()
    }

    fn take_failure(&self) -> bool {
        self.failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Option<Tables>> {
        Ok(self.snapshot())
    }

    async fn persist(&self, tables: &Tables) -> Result<()> {
        if self.take_failure() {
            return Err(Error::Io(std::io::Error::other("injected persist failure")));
        }
        *self.snapshot.write().unwrap() = Some(tables.clone());
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nubz_common::{Version, VersionItem};

    #[tokio::test]
    async fn test_empty_backend_loads_nothing() {
        let backend = MemoryBackend::new();
        assert!(backend.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let backend = MemoryBackend::new();
        let mut tables = Tables::default();
        tables.set_version(VersionItem::Map, Version::new(1)).unwrap();

        backend.fail_next_persists(1);
        assert!(backend.persist(&tables).await.is_err());
        assert!(backend.snapshot().is_none());

        backend.persist(&tables).await.unwrap();
        assert_eq!(backend.snapshot(), Some(tables));
        assert_eq!(backend.persist_count(), 1);
    }
}
