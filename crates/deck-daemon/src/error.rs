use deck_proto::protocol::MediaKind;
use thiserror::Error;

/// Failures the orchestrator reports to its callers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlayerError {
    #[error("media not found: {0}")]
    NotFound(String),

    #[error("no backend available for {0} media")]
    UnsupportedType(MediaKind),

    #[error("track number {track} out of range (album has {count} tracks)")]
    OutOfRange { track: usize, count: usize },

    /// The engine refused an item or never confirmed it.
    #[error("{0}")]
    EngineFailure(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl PlayerError {
    pub fn engine(err: impl std::fmt::Display) -> Self {
        PlayerError::EngineFailure(err.to_string())
    }
}

pub type PlayerResult<T> = Result<T, PlayerError>;
