//! Cached floor maps.
//!
//! Each floor map is a JSON document describing the original image size and
//! the tile grid of every zoom level. Documents of one map version live in
//! their own `v<version>` directory; the store records which document is
//! current for each floor together with the map version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::notify::{Notifier, Subscription};
use nubz_common::{Error, Floor, Result, Version, VersionItem};
use nubz_storage::{write_atomic, DurableStore};

/// Size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One zoom level of a floor map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomLevel {
    /// Size of the whole image at this zoom level.
    pub scaled_size: Resolution,
    /// Size of a single tile.
    pub tile_size: Resolution,
    /// Tile locations, row by row.
    pub tile_urls: Vec<Vec<String>>,
}

impl ZoomLevel {
    /// Check that the tile grid is rectangular and non-empty.
    ///
    /// # Errors
    /// - Empty sizes, empty grid, or rows of different length
    pub fn validate(&self) -> Result<()> {
        if self.scaled_size.is_empty() || self.tile_size.is_empty() {
            return Err(Error::InvalidInput(
                "Zoom level with empty size".to_string(),
            ));
        }
        let columns = self.tile_urls.first().map(Vec::len).unwrap_or(0);
        if columns == 0 {
            return Err(Error::InvalidInput("Zoom level without tiles".to_string()));
        }
        if self.tile_urls.iter().any(|row| row.len() != columns) {
            return Err(Error::InvalidInput(
                "Zoom level tile grid is not rectangular".to_string(),
            ));
        }
        Ok(())
    }
}

/// Map of one floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorMap {
    pub floor: Floor,
    /// Size of the original image.
    pub resolution: Resolution,
    /// Zoom levels, from the least to the most detailed.
    pub zoom_levels: Vec<ZoomLevel>,
}

impl FloorMap {
    /// Check the map is usable.
    ///
    /// # Errors
    /// - Empty resolution, no zoom level, or an invalid zoom level
    pub fn validate(&self) -> Result<()> {
        if self.resolution.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Map of floor {} has an empty resolution",
                self.floor
            )));
        }
        if self.zoom_levels.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Map of floor {} has no zoom levels",
                self.floor
            )));
        }
        for level in &self.zoom_levels {
            level.validate()?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct MapState {
    version: Option<Version>,
    floors: BTreeMap<Floor, FloorMap>,
}

/// In-memory view of the cached floor maps.
pub struct MapData {
    store: Arc<DurableStore>,
    maps_dir: PathBuf,
    state: RwLock<MapState>,
    observers: Notifier<Version>,
}

impl MapData {
    /// Create an empty view; map documents are written under `maps_dir`.
    pub fn new(store: Arc<DurableStore>, maps_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            maps_dir: maps_dir.into(),
            state: RwLock::new(MapState::default()),
            observers: Notifier::new(),
        }
    }

    /// Directory holding the map documents.
    pub fn maps_dir(&self) -> &Path {
        &self.maps_dir
    }

    /// Rebuild the view from the files recorded in the store.
    ///
    /// A recorded file that is missing or unreadable is logged and its floor
    /// left without a map.
    pub async fn load_from_store(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let mut fresh = MapState {
            version: self.store.get_version(VersionItem::Map).await?,
            floors: BTreeMap::new(),
        };

        for floor in Floor::all() {
            let Some(path) = self.store.get_map_file(floor).await? else {
                continue;
            };
            match read_floor_map(&path).await {
                Ok(map) => {
                    fresh.floors.insert(floor, map);
                }
                Err(e) => warn!(%floor, "Cannot read map file {}: {}", path.display(), e),
            }
        }

        debug!(version = ?fresh.version, floors = fresh.floors.len(), "Loaded maps from store");
        *state = fresh;
        Ok(())
    }

    /// Replace the cached maps with a new version.
    ///
    /// Every document is written before the store is touched; the version
    /// and the file locations then change in one store transaction.
    ///
    /// # Returns
    /// `false` if `version` is not newer than the cached one and nothing changed.
    ///
    /// # Errors
    /// - Invalid map, duplicated floor, I/O failure, store fault
    pub async fn set_maps(&self, version: Version, maps: Vec<FloorMap>) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.version.is_some_and(|current| version <= current) {
            debug!(%version, current = ?state.version, "Map version is not newer, skipping");
            return Ok(false);
        }

        let mut by_floor = BTreeMap::new();
        for map in maps {
            map.validate()?;
            if by_floor.insert(map.floor, map).is_some() {
                return Err(Error::InvalidInput(
                    "Map set contains the same floor twice".to_string(),
                ));
            }
        }

        let dir = self.maps_dir.join(format!("v{}", version));
        tokio::fs::create_dir_all(&dir).await?;

        let mut paths = BTreeMap::new();
        for (floor, map) in &by_floor {
            let path = dir.join(format!("floor{}.json", floor));
            write_atomic(&path, &serde_json::to_vec_pretty(map)?).await?;
            paths.insert(*floor, path);
        }

        self.store
            .set_maps(
                version,
                paths.get(&Floor::GROUND).map(PathBuf::as_path),
                paths.get(&Floor::FIRST).map(PathBuf::as_path),
            )
            .await?;

        state.version = Some(version);
        state.floors.extend(by_floor);
        drop(state);

        info!(%version, "Maps updated");
        self.observers.notify(&version);
        Ok(true)
    }

    /// Cached map of `floor`.
    pub async fn floor_map(&self, floor: Floor) -> Option<FloorMap> {
        self.state.read().await.floors.get(&floor).cloned()
    }

    /// Version of the cached maps.
    pub async fn version(&self) -> Option<Version> {
        self.state.read().await.version
    }

    /// Be told about every new map version.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Version) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Stop receiving updates.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.observers.unsubscribe(subscription)
    }
}

async fn read_floor_map(path: &Path) -> Result<FloorMap> {
    let content = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&content)?)
}
