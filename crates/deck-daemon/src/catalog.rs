use deck_proto::catalog::{favorites_to_media, load_or_init_catalog, merge, scan_albums};
use deck_proto::config::Config;
use deck_proto::protocol::{Favorite, MediaObject};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    Changed { count: usize },
}

/// The ordered media list, swapped as a whole on refresh.
pub struct MediaCatalog {
    items: RwLock<Arc<Vec<Arc<MediaObject>>>>,
    events: broadcast::Sender<CatalogEvent>,
}

impl MediaCatalog {
    pub fn new(items: Vec<MediaObject>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            items: RwLock::new(Arc::new(items.into_iter().map(Arc::new).collect())),
            events,
        }
    }

    fn current(&self) -> Arc<Vec<Arc<MediaObject>>> {
        match self.items.read() {
            Ok(items) => Arc::clone(&items),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<MediaObject>> {
        self.current().iter().find(|m| m.id == id).cloned()
    }

    pub fn ordered(&self) -> Arc<Vec<Arc<MediaObject>>> {
        self.current()
    }

    pub fn ordered_ids(&self) -> Vec<String> {
        self.current().iter().map(|m| m.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap in a new list and notify subscribers.
    pub fn replace(&self, items: Vec<MediaObject>) {
        let next = Arc::new(items.into_iter().map(Arc::new).collect::<Vec<_>>());
        let count = next.len();
        match self.items.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        info!("catalog: {} media objects", count);
        // no receivers is fine
        let _ = self.events.send(CatalogEvent::Changed { count });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }
}

/// Configured entries, then scanned albums, then speaker favorites.
pub fn build_catalog(config: &Config, favorites: &[Favorite]) -> Vec<MediaObject> {
    let configured = match load_or_init_catalog(&config.media.catalog_file) {
        Ok(entries) => entries.into_iter().map(|e| e.into_media_object()).collect(),
        Err(e) => {
            warn!(
                "catalog: failed to load {}: {}",
                config.media.catalog_file.display(),
                e
            );
            Vec::new()
        }
    };

    let albums = if config.media.enable_local_albums {
        scan_albums(&config.media.music_dir).unwrap_or_else(|e| {
            warn!("catalog: album scan failed: {}", e);
            Vec::new()
        })
    } else {
        Vec::new()
    };

    merge([configured, albums, favorites_to_media(favorites)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_proto::protocol::MediaPayload;

    fn radio(id: &str) -> MediaObject {
        MediaObject::new(id, id.to_uppercase(), MediaPayload::Radio { url: format!("http://{}", id) })
    }

    #[tokio::test]
    async fn test_replace_notifies() {
        let catalog = MediaCatalog::new(vec![radio("p1")]);
        let mut rx = catalog.subscribe();
        catalog.replace(vec![radio("p1"), radio("p2")]);
        assert_eq!(rx.recv().await.unwrap(), CatalogEvent::Changed { count: 2 });
        assert_eq!(catalog.ordered_ids(), vec!["p1", "p2"]);
        assert!(catalog.get("p2").is_some());
        assert!(catalog.get("p3").is_none());
    }

    #[test]
    fn test_build_catalog_order() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("music").join("blue");
        std::fs::create_dir_all(&album).unwrap();
        std::fs::write(album.join("01.All I Want.mp3"), b"").unwrap();

        let mut config = Config::default();
        config.media.catalog_file = dir.path().join("media.toml");
        config.media.music_dir = dir.path().join("music");

        let favorites = vec![Favorite {
            title: "Jazz".into(),
            uri: "x-rincon:jazz".into(),
        }];
        let ids: Vec<_> = build_catalog(&config, &favorites)
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["sr_p1", "sr_p2", "sr_p3", "album_blue", "remote_0_jazz"]);
    }
}
