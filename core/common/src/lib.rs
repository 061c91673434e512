//! Common utilities and types shared across the nubz synchronization core.
//!
//! This module provides the error taxonomy and the identifier types used by
//! the store, the report lifecycle and the sync tasks.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    ExhibitId, ExperimentId, Floor, ReportId, ReportState, ServerReportId, Version, VersionItem,
    FLOOR_COUNT,
};
