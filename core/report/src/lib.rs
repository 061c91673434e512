//! Report lifecycle for the nubz guide.
//!
//! A report records a visitor's walk through the museum. It is created
//! while the visitor is guided, appended to as they go, finalized when the
//! walk ends and finally uploaded. This crate provides:
//! - The report model and its forward-only state machine
//! - Crash-safe snapshots of a report on disk
//! - A manager owning the current report and its background saver
//! - The set of finished reports waiting for upload

pub mod config;
pub mod manager;
pub mod ready;
pub mod report;
pub mod saver;
pub mod snapshot;

pub use config::ReportConfig;
pub use manager::ReportManager;
pub use ready::{ReadyReport, ReadyReports};
pub use report::{Experiment, Report, ReportEvent, SurveyAnswers};
pub use saver::BackgroundSaver;
