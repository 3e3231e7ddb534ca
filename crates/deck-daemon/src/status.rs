use chrono::Utc;
use deck_proto::protocol::{PlaybackStatus, PlayerState};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct Inner {
    status: PlaybackStatus,
    /// Generation of the writer currently allowed to publish.
    owner: u64,
}

/// Holder of the one shared `PlaybackStatus`.
///
/// Every change is applied to a copy and published as a whole, so readers only
/// ever observe complete snapshots.  Workers publish through a `StatusWriter`;
/// once the orchestrator revokes it (on stop or on the next play) its updates
/// are dropped, so a slow worker can never overwrite its successor's state.
pub struct StatusStore {
    inner: RwLock<Inner>,
}

impl StatusStore {
    pub fn new(volume: f32) -> Self {
        Self {
            inner: RwLock::new(Inner {
                status: PlaybackStatus::stopped(volume),
                owner: 0,
            }),
        }
    }

    pub async fn snapshot(&self) -> PlaybackStatus {
        self.inner.read().await.status.clone()
    }

    /// Apply `f` and publish the result unconditionally.
    pub async fn replace_with(&self, f: impl FnOnce(&mut PlaybackStatus)) -> PlaybackStatus {
        let mut inner = self.inner.write().await;
        publish(&mut inner.status, f)
    }

    /// Hand out write access to a new worker, revoking the previous one.
    pub async fn claim(self: &Arc<Self>) -> StatusWriter {
        let mut inner = self.inner.write().await;
        inner.owner += 1;
        debug!("status: writer {} claimed", inner.owner);
        StatusWriter {
            store: Arc::clone(self),
            generation: inner.owner,
        }
    }

    /// Revoke the current writer without granting a new one.
    pub async fn revoke(&self) {
        self.inner.write().await.owner += 1;
    }
}

fn publish(current: &mut PlaybackStatus, f: impl FnOnce(&mut PlaybackStatus)) -> PlaybackStatus {
    let mut next = current.clone();
    f(&mut next);
    next.rev = current.rev + 1;
    next.updated_at = Utc::now();
    *current = next.clone();
    next
}

/// A worker's write access to the status store.
#[derive(Clone)]
pub struct StatusWriter {
    store: Arc<StatusStore>,
    generation: u64,
}

impl StatusWriter {
    /// Publish `f` applied to the current status.  `false` if this writer has
    /// been revoked, in which case nothing changes.
    pub async fn update(&self, f: impl FnOnce(&mut PlaybackStatus)) -> bool {
        let mut inner = self.store.inner.write().await;
        if inner.owner != self.generation {
            debug!("status: dropped update from stale writer {}", self.generation);
            return false;
        }
        publish(&mut inner.status, f);
        true
    }

    pub async fn fail(&self, error: impl std::fmt::Display) -> bool {
        let message = error.to_string();
        self.update(|s| {
            s.state = PlayerState::Error;
            s.error_message = Some(message);
        })
        .await
    }

    pub async fn snapshot(&self) -> PlaybackStatus {
        self.store.snapshot().await
    }
}
