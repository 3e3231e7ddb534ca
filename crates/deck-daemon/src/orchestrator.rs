use deck_proto::protocol::{Favorite, MediaKind, MediaObject, MediaPayload, PlaybackStatus, PlayerState};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::catalog::MediaCatalog;
use crate::engine::SharedEngine;
use crate::error::{PlayerError, PlayerResult};
use crate::speaker::{self, SpeakerDiscovery};
use crate::status::StatusStore;
use crate::workers::{AlbumWorker, RadioWorker, RemoteSpeakerWorker, WorkerTimings};

struct Backends {
    radio: RadioWorker,
    album: AlbumWorker,
    remote: Option<RemoteSpeakerWorker>,
    active: Option<MediaKind>,
}

/// Single entry point for playback control.
///
/// All commands are serialized on the backends lock.  `play` stops whatever
/// is active before starting the next backend, so at most one worker runs at
/// any time.
pub struct Orchestrator {
    catalog: Arc<MediaCatalog>,
    engine: SharedEngine,
    status: Arc<StatusStore>,
    timings: WorkerTimings,
    backends: Mutex<Backends>,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<MediaCatalog>,
        engine: SharedEngine,
        timings: WorkerTimings,
        volume: f32,
    ) -> Self {
        Self {
            catalog,
            status: Arc::new(StatusStore::new(volume)),
            backends: Mutex::new(Backends {
                radio: RadioWorker::new(Arc::clone(&engine), timings),
                album: AlbumWorker::new(Arc::clone(&engine), timings),
                remote: None,
                active: None,
            }),
            timings,
            engine,
        }
    }

    /// Enable speaker favorites.  Without a speaker they fail as unsupported.
    pub async fn attach_remote_speaker(&self, worker: RemoteSpeakerWorker) {
        info!("orchestrator: remote speaker {} attached", worker.device_name());
        self.backends.lock().await.remote = Some(worker);
    }

    /// Discover a speaker (`preferred` by name, else the first) and attach it.
    pub async fn connect_remote_speaker(
        &self,
        discovery: &dyn SpeakerDiscovery,
        preferred: Option<&str>,
    ) -> PlayerResult<()> {
        let device = speaker::connect(discovery, preferred).await?;
        let name = device.name();
        let worker = RemoteSpeakerWorker::connect(device, self.timings)
            .await
            .map_err(|e| PlayerError::DeviceUnavailable(format!("{}: {}", name, e)))?;
        self.attach_remote_speaker(worker).await;
        Ok(())
    }

    pub async fn remote_favorites(&self) -> Vec<Favorite> {
        match &self.backends.lock().await.remote {
            Some(remote) => remote.favorites().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn reload_remote_favorites(&self) -> anyhow::Result<()> {
        if let Some(remote) = self.backends.lock().await.remote.as_mut() {
            remote.reload_favorites().await?;
        }
        Ok(())
    }

    pub fn catalog(&self) -> &Arc<MediaCatalog> {
        &self.catalog
    }

    pub async fn status(&self) -> PlaybackStatus {
        self.status.snapshot().await
    }

    pub async fn active_backend(&self) -> Option<MediaKind> {
        self.backends.lock().await.active
    }

    /// Play `media_id` from the 1-based `track_number` (ignored for streams).
    pub async fn play(&self, media_id: &str, track_number: usize) -> PlayerResult<()> {
        let Some(media) = self.catalog.get(media_id) else {
            let err = PlayerError::NotFound(media_id.to_string());
            warn!("orchestrator: {}", err);
            self.record_error(&err).await;
            return Err(err);
        };
        let mut backends = self.backends.lock().await;
        self.play_locked(&mut backends, media, track_number).await
    }

    async fn play_locked(
        &self,
        backends: &mut Backends,
        media: Arc<MediaObject>,
        track_number: usize,
    ) -> PlayerResult<()> {
        self.stop_locked(backends).await;
        info!("orchestrator: play {} ({})", media.id, media.kind());

        let summary = media.summary();
        self.status
            .replace_with(|s| {
                s.state = PlayerState::Loading;
                s.current_media = Some(summary);
                s.current_track = None;
                s.track_position = 0;
                s.error_message = None;
            })
            .await;

        let writer = self.status.claim().await;
        let result = match &media.payload {
            MediaPayload::Radio { .. } => backends.radio.start(&media, writer).await,
            MediaPayload::Album { .. } => {
                backends
                    .album
                    .start(Arc::clone(&media), track_number, writer)
                    .await
            }
            MediaPayload::RemoteFavorite { .. } => match backends.remote.as_mut() {
                Some(remote) => remote.start(&media, writer).await,
                None => Err(PlayerError::UnsupportedType(media.kind())),
            },
        };

        match result {
            Ok(()) => {
                backends.active = Some(media.kind());
                Ok(())
            }
            Err(err) => {
                error!("orchestrator: failed to play {}: {}", media.id, err);
                self.record_error(&err).await;
                Err(err)
            }
        }
    }

    async fn record_error(&self, err: &PlayerError) {
        let message = err.to_string();
        self.status
            .replace_with(|s| {
                s.state = PlayerState::Error;
                s.error_message = Some(message);
            })
            .await;
    }

    /// Stop every backend, collecting teardown errors.
    async fn stop_locked(&self, backends: &mut Backends) -> Vec<String> {
        self.status.revoke().await;
        let mut errors = Vec::new();
        if let Err(e) = backends.radio.stop().await {
            errors.push(format!("radio: {}", e));
        }
        if let Err(e) = backends.album.stop().await {
            errors.push(format!("album: {}", e));
        }
        if let Some(remote) = backends.remote.as_mut() {
            if let Err(e) = remote.stop().await {
                errors.push(format!("speaker: {}", e));
            }
        }
        backends.active = None;
        for e in &errors {
            warn!("orchestrator: stop error: {}", e);
        }
        errors
    }

    /// Always ends in `Stopped`; `false` when a backend reported a teardown
    /// error, which is kept in `error_message`.
    pub async fn stop(&self) -> bool {
        let mut backends = self.backends.lock().await;
        let errors = self.stop_locked(&mut backends).await;
        let message = (!errors.is_empty()).then(|| errors.join("; "));
        self.status
            .replace_with(|s| {
                s.state = PlayerState::Stopped;
                s.current_media = None;
                s.current_track = None;
                s.track_position = 0;
                s.error_message = message;
            })
            .await;
        info!("orchestrator: stopped");
        errors.is_empty()
    }

    pub async fn pause(&self) -> bool {
        self.transition(PlayerState::Playing, PlayerState::Paused).await
    }

    pub async fn resume(&self) -> bool {
        self.transition(PlayerState::Paused, PlayerState::Playing).await
    }

    async fn transition(&self, from: PlayerState, to: PlayerState) -> bool {
        let backends = self.backends.lock().await;
        if self.status.snapshot().await.state != from {
            return false;
        }
        let pausing = to == PlayerState::Paused;
        let result = match (backends.active, backends.remote.as_ref()) {
            (Some(MediaKind::Radio | MediaKind::Album), _) => {
                if pausing {
                    self.engine.pause().await
                } else {
                    self.engine.resume().await
                }
            }
            (Some(MediaKind::RemoteFavorite), Some(remote)) => {
                if pausing {
                    remote.pause().await
                } else {
                    remote.resume().await
                }
            }
            _ => return false,
        };
        match result {
            Ok(()) => {
                self.status.replace_with(|s| s.state = to).await;
                info!("orchestrator: {:?}", to);
                true
            }
            Err(e) => {
                warn!("orchestrator: {:?} failed: {}", to, e);
                false
            }
        }
    }

    /// Clamp to 0.0..=1.0 and apply.  NaN is rejected.
    pub async fn set_volume(&self, volume: f32) -> bool {
        if volume.is_nan() {
            return false;
        }
        let volume = volume.clamp(0.0, 1.0);
        let backends = self.backends.lock().await;

        let mut result = self.engine.set_volume(volume).await;
        if backends.active == Some(MediaKind::RemoteFavorite) {
            if let Some(remote) = backends.remote.as_ref() {
                result = result.and(remote.set_volume(volume).await);
            }
        }
        match result {
            Ok(()) => {
                self.status.replace_with(|s| s.volume = volume).await;
                true
            }
            Err(e) => {
                warn!("orchestrator: set_volume failed: {}", e);
                false
            }
        }
    }

    pub async fn next_track(&self) -> bool {
        self.skip(true).await
    }

    pub async fn previous_track(&self) -> bool {
        self.skip(false).await
    }

    /// Albums restart from the target track; speakers skip in their own queue.
    async fn skip(&self, forward: bool) -> bool {
        let mut backends = self.backends.lock().await;
        let active = backends.active;
        match active {
            Some(MediaKind::Album) => {
                let target = if forward {
                    backends.album.next_target()
                } else {
                    backends.album.previous_target()
                };
                match target {
                    Some((media, track)) => self.play_locked(&mut backends, media, track).await.is_ok(),
                    None => false,
                }
            }
            Some(MediaKind::RemoteFavorite) => {
                let Some(remote) = backends.remote.as_ref() else {
                    return false;
                };
                let result = if forward {
                    remote.next().await
                } else {
                    remote.previous().await
                };
                result
                    .map_err(|e| warn!("orchestrator: speaker skip failed: {}", e))
                    .is_ok()
            }
            _ => false,
        }
    }

    /// Stop playback and release the engine.
    pub async fn close(&self) {
        self.stop().await;
        self.engine.shutdown().await;
        info!("orchestrator: closed");
    }
}
