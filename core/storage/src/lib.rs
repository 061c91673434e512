//! Durable local store for the nubz synchronization core.
//!
//! This module provides the transactional store used to cache exhibits, map
//! files and report bookkeeping, the backend trait it persists through, and a
//! backend registry for resolving backends from configuration.
//!
//! # Design Principles
//! - Atomic operations: every public operation is one transaction
//! - Versioned writes: version and payload commit together
//! - Backend isolation: backends persist whole snapshots, nothing more
//! - Unified error semantics: faults surface as `Error::Storage`

pub mod backend;
pub mod local;
pub mod memory;
pub mod model;
pub mod registry;
pub mod store;

pub use backend::StoreBackend;
pub use local::{temp_path_for, write_atomic, write_atomic_via, FileBackend};
pub use memory::MemoryBackend;
pub use model::{Exhibit, ExhibitData, MapFrame, ReportRecord, Tables};
pub use registry::{create_default_registry, BackendFactory, BackendRegistry, StoreConfig};
pub use store::DurableStore;
