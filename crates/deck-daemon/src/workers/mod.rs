//! Background workers, one per media kind.
//!
//! A worker owns at most one tokio task.  The task watches a
//! `CancellationToken` at every wait, and `stop` joins it within a bounded
//! time before returning.

mod album;
mod radio;
mod remote;

pub use album::AlbumWorker;
pub use radio::RadioWorker;
pub use remote::RemoteSpeakerWorker;

use deck_proto::config::EngineConfig;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{Engine, EngineState};

#[derive(Debug, Clone, Copy)]
pub struct WorkerTimings {
    pub stream_grace: Duration,
    pub track_grace: Duration,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for WorkerTimings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for WorkerTimings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            stream_grace: Duration::from_millis(config.stream_grace_ms),
            track_grace: Duration::from_millis(config.track_grace_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
        }
    }
}

/// A spawned worker loop and the token that stops it.
pub struct WorkerTask {
    name: &'static str,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerTask {
    pub fn spawn<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run(cancel.clone()));
        debug!("{} worker started", name);
        Self { name, cancel, join }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the loop and wait for it to finish, at most `timeout`.
    ///
    /// Returns `false` when the task had to be aborted after the timeout.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.cancel.cancel();
        let abort = self.join.abort_handle();
        match tokio::time::timeout(timeout, self.join).await {
            Ok(_) => {
                debug!("{} worker joined", self.name);
                true
            }
            Err(_) => {
                warn!("{} worker did not stop within {:?}, aborting", self.name, timeout);
                abort.abort();
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Playing,
    TimedOut,
    Failed,
    Cancelled,
}

/// Wait up to `grace` for the engine to report `Playing`.
pub async fn await_playing(
    engine: &dyn Engine,
    cancel: &CancellationToken,
    grace: Duration,
    poll: Duration,
) -> Confirmation {
    let deadline = Instant::now() + grace;
    loop {
        match engine.state().await {
            EngineState::Playing => return Confirmation::Playing,
            EngineState::Error => return Confirmation::Failed,
            _ => {}
        }
        if Instant::now() >= deadline {
            return Confirmation::TimedOut;
        }
        tokio::select! {
            _ = cancel.cancelled() => return Confirmation::Cancelled,
            _ = tokio::time::sleep(poll) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Cancelled,
    Finished(EngineState),
}

/// Poll until the engine leaves its active states or the token fires.
/// A paused item is still ongoing.
pub async fn await_completion(
    engine: &dyn Engine,
    cancel: &CancellationToken,
    poll: Duration,
) -> Completion {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Completion::Cancelled,
            _ = tokio::time::sleep(poll) => {}
        }
        let state = engine.state().await;
        if state.is_terminal() {
            return Completion::Finished(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timings_from_config() {
        let timings = WorkerTimings::default();
        assert_eq!(timings.stream_grace, Duration::from_secs(1));
        assert_eq!(timings.track_grace, Duration::from_millis(500));
        assert_eq!(timings.stop_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_shutdown_joins_cooperative_task() {
        let task = WorkerTask::spawn("test", |cancel| async move {
            cancel.cancelled().await;
        });
        assert!(!task.is_finished());
        assert!(task.shutdown(Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded() {
        let task = WorkerTask::spawn("stuck", |_cancel| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let started = Instant::now();
        assert!(!task.shutdown(Duration::from_millis(50)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
