//! Records kept in the durable store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use nubz_common::{
    Error, ExhibitId, Floor, ReportId, ReportState, Result, ServerReportId, Version, VersionItem,
};

/// Location and size of an exhibit on a floor map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapFrame {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub floor: Floor,
}

/// Exhibit payload as delivered by the remote service, without its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExhibitData {
    pub name: String,
    pub frame: Option<MapFrame>,
}

/// Cached exhibit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exhibit {
    pub id: ExhibitId,
    pub name: String,
    pub frame: Option<MapFrame>,
}

impl Exhibit {
    /// Build an exhibit from its id and payload.
    pub fn new(id: ExhibitId, data: ExhibitData) -> Self {
        Self {
            id,
            name: data.name,
            frame: data.frame,
        }
    }

    /// Floor the exhibit is placed on, if it is placed at all.
    pub fn floor(&self) -> Option<Floor> {
        self.frame.as_ref().map(|frame| frame.floor)
    }
}

/// Bookkeeping for one report file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: ReportId,
    /// Canonical snapshot file of the report.
    pub file: PathBuf,
    pub state: ReportState,
    /// Assigned by the remote service on first upload.
    pub server_id: Option<ServerReportId>,
}

/// Complete content of the store.
///
/// Backends persist this as a single unit, which is what makes a commit
/// all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub(crate) versions: BTreeMap<VersionItem, Version>,
    pub(crate) exhibits: BTreeMap<ExhibitId, Exhibit>,
    pub(crate) map_files: BTreeMap<Floor, PathBuf>,
    pub(crate) reports: BTreeMap<ReportId, ReportRecord>,
    pub(crate) last_report_id: Option<ReportId>,
}

impl Tables {
    pub(crate) fn version(&self, item: VersionItem) -> Option<Version> {
        self.versions.get(&item).copied()
    }

    /// Versions never move backwards.
    pub(crate) fn set_version(&mut self, item: VersionItem, version: Version) -> Result<()> {
        if let Some(current) = self.version(item) {
            if version < current {
                return Err(Error::Conflict(format!(
                    "{} version {} is older than stored version {}",
                    item, version, current
                )));
            }
        }
        self.versions.insert(item, version);
        Ok(())
    }

    pub(crate) fn bump_version(&mut self, item: VersionItem) {
        let next = self.version(item).map_or(1, |v| v.get() + 1);
        self.versions.insert(item, Version::new(next));
    }

    pub(crate) fn put_exhibit(&mut self, exhibit: Exhibit) {
        self.exhibits.insert(exhibit.id, exhibit);
    }

    pub(crate) fn exhibits_on(&self, floor: Floor) -> Vec<Exhibit> {
        self.exhibits
            .values()
            .filter(|e| e.floor() == Some(floor))
            .cloned()
            .collect()
    }

    pub(crate) fn report_mut(&mut self, id: ReportId) -> Result<&mut ReportRecord> {
        self.reports
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Report {} is not registered", id)))
    }
}
