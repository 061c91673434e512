//! Remote service contract.
//!
//! The remote service is reached through an RPC client with fixed method
//! signatures. A [`Connector`] opens a transport and hands back a
//! [`RemoteSession`] to issue calls on; the wire codec lives behind these
//! traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use nubz_common::{ExhibitId, Result, ServerReportId, Version};

/// Opens sessions with the remote service.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to the remote service.
    ///
    /// # Errors
    /// - `Error::Network` when the service cannot be reached
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>>;
}

/// An open session with the remote service.
#[async_trait]
pub trait RemoteSession: Send {
    /// Map images newer than the version the caller already has.
    async fn get_new_map_images(
        &mut self,
        request: NewMapImagesRequest,
    ) -> Result<NewMapImagesResponse>;

    /// Exhibits changed since the version the caller already has.
    async fn get_new_exhibits(&mut self, request: NewExhibitsRequest)
        -> Result<NewExhibitsResponse>;

    /// Reserve a remote id for a report about to be uploaded.
    async fn get_id_for_new_report(&mut self) -> Result<ServerReportId>;

    /// Upload a report's content.
    async fn save_report(&mut self, report: RawReport) -> Result<()>;

    /// Close the transport.
    async fn close(&mut self);
}

/// Size in pixels, as sent by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

/// Tile grid of one zoom level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomLevel {
    pub scaled_size: Size,
    pub tile_size: Size,
    pub tiles_urls: Vec<Vec<String>>,
}

/// Map image of one floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapImage {
    pub resolution: Size,
    pub zoom_levels: Vec<ZoomLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMapImagesRequest {
    /// Version of the maps the caller holds, if any.
    pub acquired_version: Option<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMapImagesResponse {
    pub version: Version,
    /// Map image per floor number.
    pub floors: BTreeMap<i32, MapImage>,
}

/// Placement of an exhibit on a floor map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub map_level: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExhibit {
    pub id: ExhibitId,
    pub name: String,
    pub frame: Option<RawFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExhibitsRequest {
    /// Version of the exhibits the caller holds, if any.
    pub acquired_version: Option<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExhibitsResponse {
    pub version: Version,
    pub exhibits: Vec<RawExhibit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReportEvent {
    pub actions: Vec<String>,
    pub duration_in_secs: u32,
    pub exhibit_id: Option<ExhibitId>,
}

/// Report content as uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReport {
    pub report_id: ServerReportId,
    pub history: Vec<RawReportEvent>,
}
