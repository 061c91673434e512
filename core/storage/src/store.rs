//! Durable store with atomic read-modify-write transactions.
//!
//! Every public operation follows the same shape: open a handle (acquire the
//! store), begin a transaction, run the body against a working copy, commit.
//! If the body fails the transaction is cancelled and the fault is reported
//! as [`Error::Storage`]. The handle is released when the transaction goes
//! out of scope, on every path including unwinding.
//!
//! Versioned writes (exhibits, map, reports) update the version and the
//! payload in the same transaction, so a reader never sees one without the
//! other.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::backend::StoreBackend;
use crate::model::{Exhibit, ExhibitData, ReportRecord, Tables};
use nubz_common::{
    Error, ExhibitId, Floor, ReportId, ReportState, Result, ServerReportId, Version, VersionItem,
};

/// Durable key/value-style store for cached domain data.
pub struct DurableStore {
    backend: Arc<dyn StoreBackend>,
    committed: Mutex<Tables>,
}

/// Open handle on the store. Only one exists at a time.
struct StoreHandle<'a> {
    tables: MutexGuard<'a, Tables>,
    backend: &'a dyn StoreBackend,
}

impl<'a> StoreHandle<'a> {
    fn begin(self, op: &'static str) -> Transaction<'a> {
        debug!(op, "Begin transaction");
        Transaction {
            op,
            handle: self,
            working: None,
            finished: false,
        }
    }
}

/// Transaction over a working copy of the committed tables.
///
/// The working copy is created on first write; read-only transactions never
/// touch the backend.
struct Transaction<'a> {
    op: &'static str,
    handle: StoreHandle<'a>,
    working: Option<Tables>,
    finished: bool,
}

impl Transaction<'_> {
    fn tables(&self) -> &Tables {
        self.working.as_ref().unwrap_or(&*self.handle.tables)
    }

    fn tables_mut(&mut self) -> &mut Tables {
        let committed = &self.handle.tables;
        self.working.get_or_insert_with(|| Tables::clone(committed))
    }

    async fn commit(mut self) -> Result<()> {
        if let Some(working) = self.working.take() {
            self.handle.backend.persist(&working).await?;
            *self.handle.tables = working;
        }
        self.finished = true;
        debug!(op = self.op, "Commit transaction");
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(op = self.op, "Cancel transaction");
        }
    }
}

fn storage_fault(op: &'static str, err: Error) -> Error {
    warn!(op, "Store transaction rolled back: {}", err);
    match err {
        Error::Storage(msg) => Error::Storage(msg),
        other => Error::Storage(format!("{}: {}", op, other)),
    }
}

impl DurableStore {
    /// Open a store over the given backend, loading its last snapshot.
    ///
    /// # Errors
    /// - Backend cannot load its snapshot
    pub async fn open(backend: Arc<dyn StoreBackend>) -> Result<Self> {
        let tables = backend
            .load()
            .await
            .map_err(|e| storage_fault("open", e))?
            .unwrap_or_default();
        debug!(backend = backend.name(), "Opened durable store");
        Ok(Self {
            backend,
            committed: Mutex::new(tables),
        })
    }

    /// Name of the backend in use.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    async fn handle(&self) -> StoreHandle<'_> {
        StoreHandle {
            tables: self.committed.lock().await,
            backend: self.backend.as_ref(),
        }
    }

    /// Run `body` as one transaction.
    async fn transact<T, F>(&self, op: &'static str, body: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut txn = self.handle().await.begin(op);
        match body(&mut txn) {
            Ok(value) => {
                txn.commit().await.map_err(|e| storage_fault(op, e))?;
                Ok(value)
            }
            Err(err) => {
                drop(txn);
                Err(storage_fault(op, err))
            }
        }
    }

    async fn read<T, F>(&self, op: &'static str, body: F) -> Result<T>
    where
        F: FnOnce(&Tables) -> Result<T>,
    {
        self.transact(op, |txn| body(txn.tables())).await
    }

    async fn write<T, F>(&self, op: &'static str, body: F) -> Result<T>
    where
        F: FnOnce(&mut Tables) -> Result<T>,
    {
        self.transact(op, |txn| body(txn.tables_mut())).await
    }

    /// Current version of `item`, if any was stored.
    pub async fn get_version(&self, item: VersionItem) -> Result<Option<Version>> {
        self.read("get_version", |t| Ok(t.version(item))).await
    }

    /// Set the version of `item`.
    ///
    /// # Errors
    /// - `version` is older than the stored one
    pub async fn set_version(&self, item: VersionItem, version: Version) -> Result<()> {
        self.write("set_version", |t| t.set_version(item, version))
            .await
    }

    /// Map file recorded for `floor`.
    pub async fn get_map_file(&self, floor: Floor) -> Result<Option<PathBuf>> {
        self.read("get_map_file", |t| Ok(t.map_files.get(&floor).cloned()))
            .await
    }

    /// Record the map file for one floor.
    pub async fn set_map_file(&self, floor: Floor, path: &Path) -> Result<()> {
        self.write("set_map_file", |t| {
            t.map_files.insert(floor, path.to_path_buf());
            Ok(())
        })
        .await
    }

    /// Record a new map version together with its floor files.
    ///
    /// A `None` path leaves that floor's file untouched.
    pub async fn set_maps(
        &self,
        version: Version,
        floor0: Option<&Path>,
        floor1: Option<&Path>,
    ) -> Result<()> {
        self.write("set_maps", |t| {
            t.set_version(VersionItem::Map, version)?;
            if let Some(path) = floor0 {
                t.map_files.insert(Floor::GROUND, path.to_path_buf());
            }
            if let Some(path) = floor1 {
                t.map_files.insert(Floor::FIRST, path.to_path_buf());
            }
            Ok(())
        })
        .await
    }

    /// Exhibit with the given id.
    pub async fn get_exhibit(&self, id: ExhibitId) -> Result<Option<Exhibit>> {
        self.read("get_exhibit", |t| Ok(t.exhibits.get(&id).cloned()))
            .await
    }

    /// Add or replace one exhibit.
    pub async fn set_exhibit(&self, version: Version, id: ExhibitId, data: ExhibitData) -> Result<()> {
        self.write("set_exhibit", |t| {
            t.set_version(VersionItem::Exhibits, version)?;
            t.put_exhibit(Exhibit::new(id, data));
            Ok(())
        })
        .await
    }

    /// Every cached exhibit, ordered by id.
    pub async fn get_all_exhibits(&self) -> Result<Vec<Exhibit>> {
        self.read("get_all_exhibits", |t| Ok(t.exhibits.values().cloned().collect()))
            .await
    }

    /// Replace all cached exhibits.
    pub async fn set_all_exhibits(&self, version: Version, exhibits: Vec<Exhibit>) -> Result<()> {
        self.write("set_all_exhibits", |t| {
            t.set_version(VersionItem::Exhibits, version)?;
            t.exhibits.clear();
            for exhibit in exhibits {
                t.put_exhibit(exhibit);
            }
            Ok(())
        })
        .await
    }

    /// Exhibits placed on `floor`.
    pub async fn get_exhibits_for_floor(&self, floor: Floor) -> Result<Vec<Exhibit>> {
        self.read("get_exhibits_for_floor", |t| Ok(t.exhibits_on(floor)))
            .await
    }

    /// Replace the exhibits placed on `floor`.
    ///
    /// # Errors
    /// - An exhibit in `exhibits` is not placed on `floor`
    pub async fn set_exhibits_for_floor(
        &self,
        version: Version,
        exhibits: Vec<Exhibit>,
        floor: Floor,
    ) -> Result<()> {
        self.write("set_exhibits_for_floor", |t| {
            t.set_version(VersionItem::Exhibits, version)?;
            t.exhibits.retain(|_, e| e.floor() != Some(floor));
            for exhibit in exhibits {
                if exhibit.floor() != Some(floor) {
                    return Err(Error::InvalidInput(format!(
                        "Exhibit {} is not placed on floor {}",
                        exhibit.id, floor
                    )));
                }
                t.put_exhibit(exhibit);
            }
            Ok(())
        })
        .await
    }

    /// Insert new exhibits and update known ones.
    pub async fn add_or_update_exhibits(&self, version: Version, exhibits: Vec<Exhibit>) -> Result<()> {
        self.write("add_or_update_exhibits", |t| {
            t.set_version(VersionItem::Exhibits, version)?;
            for exhibit in exhibits {
                t.put_exhibit(exhibit);
            }
            Ok(())
        })
        .await
    }

    /// Allocate the next local report id.
    pub async fn next_report_id(&self) -> Result<ReportId> {
        self.write("next_report_id", |t| {
            let id = t.last_report_id.map_or(ReportId::new(1), ReportId::next);
            t.last_report_id = Some(id);
            t.bump_version(VersionItem::Reports);
            Ok(id)
        })
        .await
    }

    /// Register the snapshot file of a report being recorded.
    ///
    /// # Errors
    /// - The report is already registered past `Recording`
    pub async fn set_report_file(&self, id: ReportId, file: &Path) -> Result<()> {
        self.write("set_report_file", |t| {
            if let Some(existing) = t.reports.get(&id) {
                if existing.state != ReportState::Recording {
                    return Err(Error::InvalidState(format!(
                        "Report {} is already {}",
                        id, existing.state
                    )));
                }
            }
            t.reports.insert(
                id,
                ReportRecord {
                    id,
                    file: file.to_path_buf(),
                    state: ReportState::Recording,
                    server_id: None,
                },
            );
            t.bump_version(VersionItem::Reports);
            Ok(())
        })
        .await
    }

    /// Move a report forward in its lifecycle.
    ///
    /// Re-applying the current state is a no-op.
    ///
    /// # Errors
    /// - Report not registered
    /// - Backward or skipping transition
    pub async fn change_report_state(&self, id: ReportId, state: ReportState) -> Result<()> {
        self.write("change_report_state", |t| {
            let record = t.report_mut(id)?;
            if record.state == state {
                return Ok(());
            }
            if !record.state.can_transition_to(state) {
                return Err(Error::InvalidState(format!(
                    "Report {} cannot move from {} to {}",
                    id, record.state, state
                )));
            }
            record.state = state;
            t.bump_version(VersionItem::Reports);
            Ok(())
        })
        .await
    }

    /// Record the server-side id of a report.
    ///
    /// # Errors
    /// - Report not registered
    /// - A different server id is already recorded
    pub async fn set_report_server_id(&self, id: ReportId, server_id: ServerReportId) -> Result<()> {
        self.write("set_report_server_id", |t| {
            let record = t.report_mut(id)?;
            match record.server_id {
                Some(existing) if existing == server_id => return Ok(()),
                Some(existing) => {
                    return Err(Error::Conflict(format!(
                        "Report {} already has server id {}",
                        id, existing
                    )))
                }
                None => record.server_id = Some(server_id),
            }
            t.bump_version(VersionItem::Reports);
            Ok(())
        })
        .await
    }

    /// Bookkeeping record of one report.
    pub async fn get_report_record(&self, id: ReportId) -> Result<Option<ReportRecord>> {
        self.read("get_report_record", |t| Ok(t.reports.get(&id).cloned()))
            .await
    }

    /// Records of every report in `state`, ordered by id.
    pub async fn reports_in_state(&self, state: ReportState) -> Result<Vec<ReportRecord>> {
        self.read("reports_in_state", |t| {
            Ok(t.reports
                .values()
                .filter(|r| r.state == state)
                .cloned()
                .collect())
        })
        .await
    }

    /// Records of every registered report, ordered by id.
    pub async fn all_reports(&self) -> Result<Vec<ReportRecord>> {
        self.read("all_reports", |t| Ok(t.reports.values().cloned().collect()))
            .await
    }
}
