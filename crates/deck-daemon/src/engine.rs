use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// What the playback engine reports about its current item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Nothing loaded.
    Idle,
    Opening,
    Buffering,
    Playing,
    Paused,
    /// The loaded item played to its end.
    Ended,
    Error,
}

impl EngineState {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            EngineState::Opening | EngineState::Buffering | EngineState::Playing | EngineState::Paused
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EngineState::Idle | EngineState::Ended | EngineState::Error)
    }
}

/// The single audio engine shared by the radio and album workers.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Load `uri` and start playing it.  `false` when the engine refused the item.
    async fn play(&self, uri: &str) -> anyhow::Result<bool>;
    async fn stop(&self) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn resume(&self) -> anyhow::Result<()>;
    /// `volume` is in 0.0..=1.0.
    async fn set_volume(&self, volume: f32) -> anyhow::Result<()>;
    async fn state(&self) -> EngineState;

    async fn is_active(&self) -> bool {
        self.state().await.is_active()
    }

    /// Release the engine's resources; called once at daemon shutdown.
    async fn shutdown(&self) {}
}

pub type SharedEngine = Arc<dyn Engine>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classes() {
        assert!(EngineState::Buffering.is_active());
        assert!(EngineState::Paused.is_active());
        assert!(!EngineState::Ended.is_active());
        assert!(EngineState::Ended.is_terminal());
        assert!(EngineState::Idle.is_terminal());
        assert!(!EngineState::Playing.is_terminal());
    }
}
