use deck_proto::protocol::{MediaObject, MediaPayload, PlayerState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{await_completion, await_playing, Completion, Confirmation, WorkerTask, WorkerTimings};
use crate::engine::{EngineState, SharedEngine};
use crate::error::{PlayerError, PlayerResult};
use crate::status::StatusWriter;

/// Plays a network stream on the shared engine.
pub struct RadioWorker {
    engine: SharedEngine,
    timings: WorkerTimings,
    task: Option<WorkerTask>,
}

impl RadioWorker {
    pub fn new(engine: SharedEngine, timings: WorkerTimings) -> Self {
        Self {
            engine,
            timings,
            task: None,
        }
    }

    pub async fn start(&mut self, media: &MediaObject, writer: StatusWriter) -> PlayerResult<()> {
        let url = match &media.payload {
            MediaPayload::Radio { url } => url.clone(),
            _ => return Err(PlayerError::UnsupportedType(media.kind())),
        };
        info!("radio: starting {} ({})", media.name, url);

        let engine = Arc::clone(&self.engine);
        let timings = self.timings;
        self.task = Some(WorkerTask::spawn("radio", move |cancel| {
            stream(engine, url, writer, timings, cancel)
        }));
        Ok(())
    }

    /// Idempotent: a no-op when nothing is running.
    pub async fn stop(&mut self) -> anyhow::Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.shutdown(self.timings.stop_timeout).await;
        self.engine.stop().await
    }
}

async fn stream(
    engine: SharedEngine,
    url: String,
    writer: StatusWriter,
    timings: WorkerTimings,
    cancel: CancellationToken,
) {
    match engine.play(&url).await {
        Ok(true) => {}
        Ok(false) => {
            writer.fail(PlayerError::engine("failed to start streaming")).await;
            return;
        }
        Err(e) => {
            warn!("radio: engine rejected {}: {}", url, e);
            writer.fail(PlayerError::engine(format!("failed to start streaming: {}", e))).await;
            return;
        }
    }

    match await_playing(engine.as_ref(), &cancel, timings.stream_grace, timings.poll_interval).await {
        Confirmation::Playing => {}
        Confirmation::Cancelled => return,
        Confirmation::TimedOut | Confirmation::Failed => {
            warn!("radio: {} did not start within {:?}", url, timings.stream_grace);
            writer.fail(PlayerError::engine("failed to start streaming")).await;
            return;
        }
    }

    writer
        .update(|s| {
            s.state = PlayerState::Playing;
            s.error_message = None;
        })
        .await;

    // Stopped is published by the orchestrator, not here.
    match await_completion(engine.as_ref(), &cancel, timings.poll_interval).await {
        Completion::Cancelled => debug!("radio: cancelled"),
        Completion::Finished(EngineState::Error) => {
            warn!("radio: stream failed: {}", url);
            writer.fail(PlayerError::engine("stream failed")).await;
        }
        Completion::Finished(state) => info!("radio: stream ended ({:?})", state),
    }
}
