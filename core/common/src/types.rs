//! Common types used throughout the nubz synchronization core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of floors the guide knows about.
pub const FLOOR_COUNT: u8 = 2;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Wrap a raw value.
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Get the raw value.
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_type!(
    /// Locally generated report identifier.
    ReportId(u32)
);

id_type!(
    /// Report identifier assigned by the remote service.
    ServerReportId(i32)
);

id_type!(
    /// Exhibit identifier, shared with the remote service.
    ExhibitId(i32)
);

id_type!(
    /// Experiment identifier, shared with the remote service.
    ExperimentId(i32)
);

id_type!(
    /// Version number of a cached item category.
    Version(u32)
);

impl ReportId {
    /// The id following this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// A museum floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Floor(u8);

impl Floor {
    /// Ground floor.
    pub const GROUND: Floor = Floor(0);
    /// First floor.
    pub const FIRST: Floor = Floor(1);

    /// Create a floor.
    ///
    /// # Errors
    /// - Returns error if `number` is not below [`FLOOR_COUNT`]
    pub fn new(number: u8) -> crate::Result<Self> {
        if number >= FLOOR_COUNT {
            return Err(crate::Error::InvalidInput(format!(
                "Floor {} out of range (floors: {})",
                number, FLOOR_COUNT
            )));
        }
        Ok(Self(number))
    }

    /// Get the floor number.
    pub fn number(self) -> u8 {
        self.0
    }

    /// Iterate over every floor.
    pub fn all() -> impl Iterator<Item = Floor> {
        (0..FLOOR_COUNT).map(Floor)
    }
}

impl TryFrom<u8> for Floor {
    type Error = crate::Error;

    fn try_from(value: u8) -> crate::Result<Self> {
        Floor::new(value)
    }
}

impl From<Floor> for u8 {
    fn from(floor: Floor) -> u8 {
        floor.0
    }
}

impl fmt::Display for Floor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Item categories carrying a version in the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VersionItem {
    Exhibits,
    Map,
    Reports,
}

impl fmt::Display for VersionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionItem::Exhibits => write!(f, "exhibits"),
            VersionItem::Map => write!(f, "map"),
            VersionItem::Reports => write!(f, "reports"),
        }
    }
}

/// Lifecycle state of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReportState {
    /// Events are still being appended.
    Recording,
    /// Finished, waiting for upload.
    ReadyToSend,
    /// Acknowledged by the remote service.
    Sent,
}

impl ReportState {
    /// Whether moving to `next` is a forward transition.
    ///
    /// Only `Recording -> ReadyToSend` and `ReadyToSend -> Sent` are allowed.
    pub fn can_transition_to(self, next: ReportState) -> bool {
        matches!(
            (self, next),
            (ReportState::Recording, ReportState::ReadyToSend)
                | (ReportState::ReadyToSend, ReportState::Sent)
        )
    }
}

impl fmt::Display for ReportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportState::Recording => f.pad("recording"),
            ReportState::ReadyToSend => f.pad("ready-to-send"),
            ReportState::Sent => f.pad("sent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_range() {
        assert_eq!(Floor::new(1).unwrap(), Floor::FIRST);
        assert!(Floor::new(FLOOR_COUNT).is_err());
        assert_eq!(Floor::all().count(), FLOOR_COUNT as usize);
    }

    #[test]
    fn test_floor_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Floor>("7").is_err());
        assert_eq!(serde_json::from_str::<Floor>("0").unwrap(), Floor::GROUND);
    }

    #[test]
    fn test_report_state_forward_only() {
        use ReportState::*;
        assert!(Recording.can_transition_to(ReadyToSend));
        assert!(ReadyToSend.can_transition_to(Sent));
        assert!(!Recording.can_transition_to(Sent));
        assert!(!ReadyToSend.can_transition_to(Recording));
        assert!(!Sent.can_transition_to(ReadyToSend));
        assert!(!Sent.can_transition_to(Sent));
    }

    #[test]
    fn test_report_id_next() {
        assert_eq!(ReportId::new(6).next(), ReportId::new(7));
    }

    proptest::proptest! {
        #[test]
        fn prop_floor_accepts_exactly_known_floors(number in proptest::prelude::any::<u8>()) {
            proptest::prop_assert_eq!(Floor::new(number).is_ok(), number < FLOOR_COUNT);
        }
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&ExhibitId::new(12)).unwrap();
        assert_eq!(json, "12");
    }
}
