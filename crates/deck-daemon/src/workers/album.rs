use deck_proto::protocol::{MediaObject, PlayerState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{await_completion, await_playing, Completion, Confirmation, WorkerTask, WorkerTimings};
use crate::engine::{EngineState, SharedEngine};
use crate::error::{PlayerError, PlayerResult};
use crate::status::StatusWriter;

/// Plays an album's tracks one file at a time on the shared engine.
pub struct AlbumWorker {
    engine: SharedEngine,
    timings: WorkerTimings,
    task: Option<WorkerTask>,
    media: Option<Arc<MediaObject>>,
}

impl AlbumWorker {
    pub fn new(engine: SharedEngine, timings: WorkerTimings) -> Self {
        Self {
            engine,
            timings,
            task: None,
            media: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Start at the 1-based `track_number`.
    pub async fn start(
        &mut self,
        media: Arc<MediaObject>,
        track_number: usize,
        writer: StatusWriter,
    ) -> PlayerResult<()> {
        let count = media.tracks().len();
        if track_number < 1 || track_number > count {
            return Err(PlayerError::OutOfRange {
                track: track_number,
                count,
            });
        }
        media.set_track_position(track_number - 1);
        info!("album: starting {} at track {}/{}", media.name, track_number, count);

        let engine = Arc::clone(&self.engine);
        let timings = self.timings;
        let owned = Arc::clone(&media);
        self.task = Some(WorkerTask::spawn("album", move |cancel| {
            play_tracks(engine, owned, writer, timings, cancel)
        }));
        self.media = Some(media);
        Ok(())
    }

    /// 1-based number of the track after the current one, if any.
    pub fn next_target(&self) -> Option<(Arc<MediaObject>, usize)> {
        let media = self.running_media()?;
        let position = media.track_position();
        (position + 1 < media.tracks().len()).then(|| (Arc::clone(media), position + 2))
    }

    pub fn previous_target(&self) -> Option<(Arc<MediaObject>, usize)> {
        let media = self.running_media()?;
        let position = media.track_position();
        (position > 0).then(|| (Arc::clone(media), position))
    }

    fn running_media(&self) -> Option<&Arc<MediaObject>> {
        if self.is_running() {
            self.media.as_ref()
        } else {
            None
        }
    }

    /// Idempotent: a no-op when nothing is running.
    pub async fn stop(&mut self) -> anyhow::Result<()> {
        self.media = None;
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.shutdown(self.timings.stop_timeout).await;
        self.engine.stop().await
    }
}

async fn play_tracks(
    engine: SharedEngine,
    media: Arc<MediaObject>,
    writer: StatusWriter,
    timings: WorkerTimings,
    cancel: CancellationToken,
) {
    let tracks = media.tracks();
    let mut position = media.track_position();

    while position < tracks.len() {
        let track = &tracks[position];
        media.set_track_position(position);
        let published = writer
            .update(|s| {
                s.state = PlayerState::Loading;
                s.current_track = Some(track.clone());
                s.track_position = position + 1;
                s.error_message = None;
            })
            .await;
        if !published || cancel.is_cancelled() {
            return;
        }

        let uri = track.source_path.to_string_lossy();
        match engine.play(&uri).await {
            Ok(true) => {}
            Ok(false) => {
                writer.fail(PlayerError::engine(format!("failed to play track: {}", track.title))).await;
                return;
            }
            Err(e) => {
                warn!("album: engine rejected {}: {}", uri, e);
                writer.fail(PlayerError::engine(format!("failed to play track: {}", track.title))).await;
                return;
            }
        }

        match await_playing(engine.as_ref(), &cancel, timings.track_grace, timings.poll_interval).await {
            Confirmation::Playing => {}
            Confirmation::Cancelled => return,
            Confirmation::TimedOut | Confirmation::Failed => {
                writer.fail(PlayerError::engine(format!("failed to play track: {}", track.title))).await;
                return;
            }
        }
        writer.update(|s| s.state = PlayerState::Playing).await;
        debug!("album: playing {}. {}", track.number, track.title);

        match await_completion(engine.as_ref(), &cancel, timings.poll_interval).await {
            Completion::Cancelled => return,
            Completion::Finished(EngineState::Error) => {
                writer.fail(PlayerError::engine(format!("playback failed: {}", track.title))).await;
                return;
            }
            Completion::Finished(_) => {}
        }
        position += 1;
    }

    info!("album: {} finished", media.name);
    writer
        .update(|s| {
            s.state = PlayerState::Stopped;
            s.current_media = None;
            s.current_track = None;
            s.track_position = 0;
        })
        .await;
}
