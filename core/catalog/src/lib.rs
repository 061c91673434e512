//! Cached museum catalog for the nubz guide.
//!
//! Holds the in-memory views over the exhibits and floor maps kept in the
//! durable store, and lets interested parties subscribe to their updates.

pub mod exhibits;
pub mod map;
pub mod notify;

pub use exhibits::ExhibitsData;
pub use map::{FloorMap, MapData, Resolution, ZoomLevel};
pub use notify::{Notifier, Subscription};
