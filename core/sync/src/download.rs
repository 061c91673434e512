//! Map and exhibit download.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::remote::{
    MapImage, NewExhibitsRequest, NewExhibitsResponse, NewMapImagesRequest,
    NewMapImagesResponse, RawExhibit, RemoteSession, Size,
};
use crate::session::SessionBody;
use nubz_catalog::{ExhibitsData, FloorMap, MapData, Resolution, ZoomLevel};
use nubz_common::{Error, Floor, Result};
use nubz_storage::{Exhibit, MapFrame};

fn floor_of(level: i32) -> Result<Floor> {
    u8::try_from(level)
        .map_err(|_| Error::InvalidInput(format!("Floor {} out of range", level)))
        .and_then(Floor::new)
}

fn resolution(size: Size) -> Result<Resolution> {
    match (u32::try_from(size.width), u32::try_from(size.height)) {
        (Ok(width), Ok(height)) => Ok(Resolution::new(width, height)),
        _ => Err(Error::InvalidInput(format!(
            "Negative size {}x{}",
            size.width, size.height
        ))),
    }
}

fn translate_floor(floor: i32, image: &MapImage) -> Result<FloorMap> {
    let zoom_levels = image
        .zoom_levels
        .iter()
        .map(|level| {
            Ok(ZoomLevel {
                scaled_size: resolution(level.scaled_size)?,
                tile_size: resolution(level.tile_size)?,
                tile_urls: level.tiles_urls.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let map = FloorMap {
        floor: floor_of(floor)?,
        resolution: resolution(image.resolution)?,
        zoom_levels,
    };
    map.validate()?;
    Ok(map)
}

/// Translate every floor of a map response.
///
/// # Errors
/// - Any floor is out of range or its image is malformed; nothing is returned
pub fn translate_maps(response: &NewMapImagesResponse) -> Result<Vec<FloorMap>> {
    response
        .floors
        .iter()
        .map(|(floor, image)| translate_floor(*floor, image))
        .collect()
}

fn translate_exhibit(raw: &RawExhibit) -> Result<Exhibit> {
    let frame = match raw.frame {
        Some(frame) => Some(MapFrame {
            x: frame.x,
            y: frame.y,
            width: frame.width,
            height: frame.height,
            floor: floor_of(frame.map_level)?,
        }),
        None => None,
    };
    Ok(Exhibit {
        id: raw.id,
        name: raw.name.clone(),
        frame,
    })
}

/// Translate every exhibit of an exhibits response.
///
/// # Errors
/// - An exhibit is placed on an unknown floor
pub fn translate_exhibits(response: &NewExhibitsResponse) -> Result<Vec<Exhibit>> {
    response.exhibits.iter().map(translate_exhibit).collect()
}

/// Session body fetching floor maps newer than the cached ones.
pub struct DownloadMap {
    maps: Arc<MapData>,
}

impl DownloadMap {
    pub fn new(maps: Arc<MapData>) -> Self {
        Self { maps }
    }
}

#[async_trait]
impl SessionBody for DownloadMap {
    fn name(&self) -> &str {
        "download-map"
    }

    async fn perform_in_session(&self, session: &mut dyn RemoteSession) -> Result<()> {
        let acquired = self.maps.version().await;
        info!(acquired = ?acquired, "Downloading map tiles addresses");
        let response = session
            .get_new_map_images(NewMapImagesRequest {
                acquired_version: acquired,
            })
            .await?;

        if acquired.is_some_and(|current| response.version <= current) {
            debug!(version = %response.version, "Maps are up to date");
            return Ok(());
        }

        let floors = translate_maps(&response)?;
        self.maps.set_maps(response.version, floors).await?;
        info!(version = %response.version, "Map update complete");
        Ok(())
    }
}

/// Session body fetching exhibits changed since the cached version.
pub struct DownloadExhibits {
    exhibits: Arc<ExhibitsData>,
}

impl DownloadExhibits {
    pub fn new(exhibits: Arc<ExhibitsData>) -> Self {
        Self { exhibits }
    }
}

#[async_trait]
impl SessionBody for DownloadExhibits {
    fn name(&self) -> &str {
        "download-exhibits"
    }

    async fn perform_in_session(&self, session: &mut dyn RemoteSession) -> Result<()> {
        let acquired = self.exhibits.version().await;
        let response = session
            .get_new_exhibits(NewExhibitsRequest {
                acquired_version: acquired,
            })
            .await?;

        let exhibits = translate_exhibits(&response)?;
        info!(count = exhibits.len(), version = %response.version, "Exhibits downloaded");
        self.exhibits.set_exhibits(exhibits, response.version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnector, RecordingSleeper};
    use crate::remote::{RawFrame, ZoomLevel as RawZoomLevel};
    use crate::session::SessionTask;
    use crate::task::{ChannelCompletion, FailureReason, Task, TaskOutcome};
    use nubz_common::{ExhibitId, Version, VersionItem};
    use nubz_storage::{DurableStore, MemoryBackend};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn size(width: i32, height: i32) -> Size {
        Size { width, height }
    }

    fn image(tag: &str) -> MapImage {
        MapImage {
            resolution: size(2048, 1024),
            zoom_levels: vec![RawZoomLevel {
                scaled_size: size(512, 256),
                tile_size: size(256, 256),
                tiles_urls: vec![vec![format!("{}/a", tag), format!("{}/b", tag)]],
            }],
        }
    }

    fn response(version: u32, floors: Vec<(i32, MapImage)>) -> NewMapImagesResponse {
        NewMapImagesResponse {
            version: Version::new(version),
            floors: floors.into_iter().collect::<BTreeMap<_, _>>(),
        }
    }

    struct Fixture {
        _temp: TempDir,
        store: Arc<DurableStore>,
        maps: Arc<MapData>,
        exhibits: Arc<ExhibitsData>,
        connector: Arc<MockConnector>,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DurableStore::open(Arc::new(MemoryBackend::new())).await.unwrap());
        let maps = Arc::new(MapData::new(store.clone(), temp.path().join("maps")));
        let exhibits = Arc::new(ExhibitsData::new(store.clone()));
        Fixture {
            _temp: temp,
            store,
            maps,
            exhibits,
            connector: Arc::new(MockConnector::new()),
        }
    }

    async fn run<B: SessionBody + 'static>(body: B, connector: Arc<MockConnector>) -> TaskOutcome {
        let (completion, rx) = ChannelCompletion::new();
        SessionTask::new(body, connector, Arc::new(completion))
            .with_sleeper(Arc::new(RecordingSleeper::default()))
            .run(2)
            .await;
        rx.await.unwrap()
    }

    #[test]
    fn test_translate_rejects_bad_floor_and_size() {
        assert!(translate_maps(&response(1, vec![(5, image("x"))])).is_err());

        let mut broken = image("x");
        broken.resolution = size(-1, 10);
        assert!(translate_maps(&response(1, vec![(0, broken)])).is_err());
    }

    #[tokio::test]
    async fn test_map_update_replaces_old_version() {
        let f = fixture().await;
        f.maps
            .set_maps(Version::new(4), translate_maps(&response(4, vec![(0, image("v4"))])).unwrap())
            .await
            .unwrap();

        f.connector
            .set_map_response(response(5, vec![(0, image("v5")), (1, image("v5"))]));
        let outcome = run(DownloadMap::new(f.maps.clone()), f.connector.clone()).await;

        assert_eq!(outcome, TaskOutcome::Succeeded);
        assert_eq!(
            f.connector.map_requests()[0].acquired_version,
            Some(Version::new(4))
        );
        assert_eq!(
            f.store.get_version(VersionItem::Map).await.unwrap(),
            Some(Version::new(5))
        );
        let ground = f.maps.floor_map(Floor::GROUND).await.unwrap();
        assert_eq!(ground.zoom_levels[0].tile_urls[0][0], "v5/a");
        assert!(f.maps.floor_map(Floor::FIRST).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_translation_keeps_old_version() {
        let f = fixture().await;
        f.maps
            .set_maps(Version::new(4), translate_maps(&response(4, vec![(0, image("v4"))])).unwrap())
            .await
            .unwrap();

        let mut broken = image("v5");
        broken.zoom_levels[0].tile_size = size(0, 256);
        f.connector
            .set_map_response(response(5, vec![(0, image("v5")), (1, broken)]));
        let outcome = run(DownloadMap::new(f.maps.clone()), f.connector.clone()).await;

        assert_eq!(outcome, TaskOutcome::Failed(FailureReason::SessionFailed));
        assert_eq!(
            f.store.get_version(VersionItem::Map).await.unwrap(),
            Some(Version::new(4))
        );
        let ground = f.maps.floor_map(Floor::GROUND).await.unwrap();
        assert_eq!(ground.zoom_levels[0].tile_urls[0][0], "v4/a");
        assert!(f.store.get_map_file(Floor::FIRST).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_version_is_ignored() {
        let f = fixture().await;
        f.maps
            .set_maps(Version::new(4), translate_maps(&response(4, vec![(0, image("v4"))])).unwrap())
            .await
            .unwrap();
        f.connector.set_map_response(response(4, vec![(0, image("other"))]));

        let outcome = run(DownloadMap::new(f.maps.clone()), f.connector.clone()).await;

        assert_eq!(outcome, TaskOutcome::Succeeded);
        let ground = f.maps.floor_map(Floor::GROUND).await.unwrap();
        assert_eq!(ground.zoom_levels[0].tile_urls[0][0], "v4/a");
    }

    #[tokio::test]
    async fn test_exhibits_download() {
        let f = fixture().await;
        f.connector.set_exhibits_response(NewExhibitsResponse {
            version: Version::new(2),
            exhibits: vec![
                RawExhibit {
                    id: ExhibitId::new(1),
                    name: "Pendulum".to_string(),
                    frame: Some(RawFrame {
                        x: 10,
                        y: 20,
                        width: 30,
                        height: 40,
                        map_level: 1,
                    }),
                },
                RawExhibit {
                    id: ExhibitId::new(2),
                    name: "Storage".to_string(),
                    frame: None,
                },
            ],
        });

        let outcome = run(DownloadExhibits::new(f.exhibits.clone()), f.connector.clone()).await;

        assert_eq!(outcome, TaskOutcome::Succeeded);
        assert_eq!(f.connector.exhibits_requests()[0].acquired_version, None);
        assert_eq!(f.exhibits.version().await, Some(Version::new(2)));
        assert_eq!(f.exhibits.exhibits_of_floor(Floor::FIRST).await.len(), 1);
        assert_eq!(f.store.get_all_exhibits().await.unwrap().len(), 2);
    }
}
