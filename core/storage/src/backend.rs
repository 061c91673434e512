//! Store backend trait definition.

use async_trait::async_trait;

use crate::model::Tables;
use nubz_common::Result;

/// Persistence backend behind the durable store.
///
/// A backend only ever sees complete, committed snapshots of the store. It
/// does not need to understand transactions; it must make `persist` atomic
/// (a reader after a crash sees either the previous or the new snapshot).
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Get the backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Load the last persisted snapshot.
    ///
    /// # Returns
    /// `None` when nothing has been persisted yet.
    ///
    /// # Errors
    /// - I/O errors
    /// - Snapshot cannot be decoded
    async fn load(&self) -> Result<Option<Tables>>;

    /// Persist a snapshot, replacing the previous one.
    ///
    /// # Postconditions
    /// - On `Ok`, a later `load` returns `tables`
    /// - On `Err`, the previously persisted snapshot is untouched
    async fn persist(&self, tables: &Tables) -> Result<()>;
}
