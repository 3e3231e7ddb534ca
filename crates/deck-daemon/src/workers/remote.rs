use deck_proto::protocol::{Favorite, MediaObject, MediaPayload, PlayerState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{WorkerTask, WorkerTimings};
use crate::error::{PlayerError, PlayerResult};
use crate::speaker::{default_attempts, run_fallback_chain, Attempt, SpeakerDevice, TransportState};
use crate::status::StatusWriter;

/// Plays speaker favorites on a remote device.  Does not touch the local engine.
pub struct RemoteSpeakerWorker {
    device: Arc<dyn SpeakerDevice>,
    favorites: Vec<Favorite>,
    attempts: Arc<Vec<Attempt>>,
    timings: WorkerTimings,
    task: Option<WorkerTask>,
}

impl RemoteSpeakerWorker {
    /// Wrap `device` and load its favorites.
    pub async fn connect(device: Arc<dyn SpeakerDevice>, timings: WorkerTimings) -> anyhow::Result<Self> {
        let favorites = device.favorites().await?;
        info!("speaker: {} has {} favorites", device.name(), favorites.len());
        Ok(Self {
            device,
            favorites,
            attempts: Arc::new(default_attempts()),
            timings,
            task: None,
        })
    }

    pub fn with_attempts(mut self, attempts: Vec<Attempt>) -> Self {
        self.attempts = Arc::new(attempts);
        self
    }

    pub fn device_name(&self) -> String {
        self.device.name()
    }

    pub fn favorites(&self) -> &[Favorite] {
        &self.favorites
    }

    pub async fn reload_favorites(&mut self) -> anyhow::Result<()> {
        self.favorites = self.device.favorites().await?;
        Ok(())
    }

    /// Favorites carry no stable id on the device; match on the URI.
    pub fn find_favorite(&self, uri: &str) -> Option<&Favorite> {
        self.favorites.iter().find(|f| f.uri == uri)
    }

    pub async fn start(&mut self, media: &MediaObject, writer: StatusWriter) -> PlayerResult<()> {
        let uri = match &media.payload {
            MediaPayload::RemoteFavorite { uri } => uri,
            _ => return Err(PlayerError::UnsupportedType(media.kind())),
        };
        let favorite = self
            .find_favorite(uri)
            .cloned()
            .ok_or_else(|| PlayerError::NotFound(format!("speaker favorite {}", media.name)))?;
        info!("speaker: starting {} on {}", favorite.title, self.device.name());

        let device = Arc::clone(&self.device);
        let attempts = Arc::clone(&self.attempts);
        let timings = self.timings;
        self.task = Some(WorkerTask::spawn("remote", move |cancel| {
            play_favorite(device, attempts, favorite, writer, timings, cancel)
        }));
        Ok(())
    }

    /// Idempotent: a no-op when nothing is running.
    pub async fn stop(&mut self) -> anyhow::Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.shutdown(self.timings.stop_timeout).await;
        self.device.stop().await
    }

    pub async fn pause(&self) -> anyhow::Result<()> {
        self.device.pause().await
    }

    pub async fn resume(&self) -> anyhow::Result<()> {
        self.device.play().await
    }

    pub async fn next(&self) -> anyhow::Result<()> {
        self.device.next().await
    }

    pub async fn previous(&self) -> anyhow::Result<()> {
        self.device.previous().await
    }

    pub async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        let pct = (volume.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.device.set_volume(pct).await
    }
}

async fn play_favorite(
    device: Arc<dyn SpeakerDevice>,
    attempts: Arc<Vec<Attempt>>,
    favorite: Favorite,
    writer: StatusWriter,
    timings: WorkerTimings,
    cancel: CancellationToken,
) {
    // Either may fail on an idle device.
    let _ = device.stop().await;
    let _ = device.clear_queue().await;
    if cancel.is_cancelled() {
        return;
    }

    match run_fallback_chain(&attempts, device.as_ref(), &favorite).await {
        Ok(method) => info!("speaker: playing {} ({})", favorite.title, method),
        Err(e) => {
            warn!("speaker: {}: {:?}", e, e.failures);
            writer
                .fail(format!("failed to start playback of {}", favorite.title))
                .await;
            return;
        }
    }
    writer
        .update(|s| {
            s.state = PlayerState::Playing;
            s.error_message = None;
        })
        .await;

    let mut seen_playing = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(timings.poll_interval) => {}
        }
        match device.transport_state().await {
            Ok(TransportState::Playing) => seen_playing = true,
            Ok(TransportState::Stopped) if seen_playing => {
                info!("speaker: {} stopped on the device", favorite.title);
                return;
            }
            Ok(_) => {}
            Err(e) => debug!("speaker: transport state unavailable: {}", e),
        }
    }
}
