//! Cached exhibit catalog, indexed by floor.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::notify::{Notifier, Subscription};
use nubz_common::{ExhibitId, Floor, Result, Version, VersionItem};
use nubz_storage::{DurableStore, Exhibit};

#[derive(Default)]
struct ExhibitsState {
    version: Option<Version>,
    floors: BTreeMap<Floor, BTreeMap<ExhibitId, Exhibit>>,
}

impl ExhibitsState {
    /// Move an exhibit to its current floor, dropping any older placement.
    fn place(&mut self, exhibit: Exhibit) {
        for floor in self.floors.values_mut() {
            floor.remove(&exhibit.id);
        }
        if let Some(floor) = exhibit.floor() {
            self.floors.entry(floor).or_default().insert(exhibit.id, exhibit);
        }
    }
}

/// In-memory view of the exhibits cached in the durable store.
pub struct ExhibitsData {
    store: Arc<DurableStore>,
    state: RwLock<ExhibitsState>,
    observers: Notifier<Vec<Exhibit>>,
}

impl ExhibitsData {
    /// Create an empty view over `store`. Call [`load_from_store`](Self::load_from_store) next.
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self {
            store,
            state: RwLock::new(ExhibitsState::default()),
            observers: Notifier::new(),
        }
    }

    /// Rebuild the view from the store.
    pub async fn load_from_store(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let mut fresh = ExhibitsState {
            version: self.store.get_version(VersionItem::Exhibits).await?,
            floors: BTreeMap::new(),
        };
        for floor in Floor::all() {
            let exhibits = self.store.get_exhibits_for_floor(floor).await?;
            fresh.floors.insert(
                floor,
                exhibits.into_iter().map(|e| (e.id, e)).collect(),
            );
        }
        debug!(version = ?fresh.version, "Loaded exhibits from store");
        *state = fresh;
        Ok(())
    }

    /// Store new or changed exhibits and notify subscribers.
    ///
    /// An empty list changes nothing, not even the version.
    pub async fn set_exhibits(&self, exhibits: Vec<Exhibit>, version: Version) -> Result<()> {
        if exhibits.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.state.write().await;
            self.store
                .add_or_update_exhibits(version, exhibits.clone())
                .await?;
            state.version = Some(version);
            for exhibit in exhibits.iter().cloned() {
                state.place(exhibit);
            }
        }

        info!(count = exhibits.len(), %version, "Exhibits updated");
        self.observers.notify(&exhibits);
        Ok(())
    }

    /// Exhibits placed on `floor`, ordered by id.
    pub async fn exhibits_of_floor(&self, floor: Floor) -> Vec<Exhibit> {
        self.state
            .read()
            .await
            .floors
            .get(&floor)
            .map(|exhibits| exhibits.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Placed exhibit with the given id.
    pub async fn exhibit(&self, id: ExhibitId) -> Option<Exhibit> {
        let state = self.state.read().await;
        state.floors.values().find_map(|f| f.get(&id).cloned())
    }

    /// Version of the cached exhibits.
    pub async fn version(&self) -> Option<Version> {
        self.state.read().await.version
    }

    /// Be told about every batch of changed exhibits.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Vec<Exhibit>) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Stop receiving updates.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.observers.unsubscribe(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nubz_storage::{MapFrame, MemoryBackend};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn exhibit(id: i32, floor: Option<Floor>) -> Exhibit {
        Exhibit {
            id: ExhibitId::new(id),
            name: format!("exhibit-{}", id),
            frame: floor.map(|floor| MapFrame {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
                floor,
            }),
        }
    }

    async fn data() -> (Arc<DurableStore>, ExhibitsData) {
        let store = Arc::new(
            DurableStore::open(Arc::new(MemoryBackend::new()))
                .await
                .unwrap(),
        );
        (store.clone(), ExhibitsData::new(store))
    }

    #[tokio::test]
    async fn test_set_exhibits_moves_between_floors() {
        let (_, data) = data().await;
        data.set_exhibits(vec![exhibit(1, Some(Floor::GROUND))], Version::new(1))
            .await
            .unwrap();
        data.set_exhibits(vec![exhibit(1, Some(Floor::FIRST))], Version::new(2))
            .await
            .unwrap();

        assert!(data.exhibits_of_floor(Floor::GROUND).await.is_empty());
        assert_eq!(data.exhibits_of_floor(Floor::FIRST).await.len(), 1);
        assert_eq!(data.version().await, Some(Version::new(2)));
    }

    #[tokio::test]
    async fn test_unplaced_exhibit_leaves_map() {
        let (_, data) = data().await;
        data.set_exhibits(vec![exhibit(4, Some(Floor::GROUND))], Version::new(1))
            .await
            .unwrap();
        data.set_exhibits(vec![exhibit(4, None)], Version::new(2))
            .await
            .unwrap();
        assert!(data.exhibit(ExhibitId::new(4)).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_update_is_noop() {
        let (store, data) = data().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let _subscription = data.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        data.set_exhibits(Vec::new(), Version::new(9)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.get_version(VersionItem::Exhibits).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_receive_changes() {
        let (_, data) = data().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let subscription = data.subscribe(move |changed| {
            seen.fetch_add(changed.len(), Ordering::SeqCst);
        });

        data.set_exhibits(
            vec![exhibit(1, Some(Floor::GROUND)), exhibit(2, None)],
            Version::new(1),
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(data.unsubscribe(subscription));
    }

    #[tokio::test]
    async fn test_load_from_store() {
        let (store, data) = data().await;
        store
            .set_all_exhibits(
                Version::new(3),
                vec![exhibit(1, Some(Floor::GROUND)), exhibit(2, Some(Floor::FIRST))],
            )
            .await
            .unwrap();

        data.load_from_store().await.unwrap();

        assert_eq!(data.version().await, Some(Version::new(3)));
        assert_eq!(data.exhibits_of_floor(Floor::FIRST).await[0].id, ExhibitId::new(2));
    }

    #[tokio::test]
    async fn test_stale_version_keeps_view() {
        let (_, data) = data().await;
        data.set_exhibits(vec![exhibit(1, Some(Floor::GROUND))], Version::new(5))
            .await
            .unwrap();
        assert!(data
            .set_exhibits(vec![exhibit(1, Some(Floor::FIRST))], Version::new(4))
            .await
            .is_err());
        assert_eq!(data.exhibits_of_floor(Floor::GROUND).await.len(), 1);
    }
}
