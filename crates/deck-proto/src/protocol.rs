use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The three kinds of media the daemon knows how to play.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Radio,
    Album,
    RemoteFavorite,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Radio => f.write_str("radio"),
            MediaKind::Album => f.write_str("album"),
            MediaKind::RemoteFavorite => f.write_str("remote favorite"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub number: u32,
    pub title: String,
    pub source_path: PathBuf,
}

/// Kind-specific part of a media object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaPayload {
    Radio { url: String },
    Album { tracks: Vec<Track> },
    RemoteFavorite { uri: String },
}

/// A favorite stored on a remote speaker.  Favorites have no stable id on the
/// device, they are matched by URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Favorite {
    pub title: String,
    pub uri: String,
}

/// One entry of the media catalog.
///
/// Everything is immutable after construction except the track cursor, which
/// only the album worker that currently owns the object moves.
#[derive(Debug, Serialize)]
pub struct MediaObject {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_path: Option<PathBuf>,
    pub payload: MediaPayload,
    #[serde(skip)]
    current_track_position: AtomicUsize,
}

impl MediaObject {
    pub fn new(id: impl Into<String>, name: impl Into<String>, payload: MediaPayload) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            image_path: None,
            payload,
            current_track_position: AtomicUsize::new(0),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_image(mut self, image_path: Option<PathBuf>) -> Self {
        self.image_path = image_path;
        self
    }

    pub fn kind(&self) -> MediaKind {
        match self.payload {
            MediaPayload::Radio { .. } => MediaKind::Radio,
            MediaPayload::Album { .. } => MediaKind::Album,
            MediaPayload::RemoteFavorite { .. } => MediaKind::RemoteFavorite,
        }
    }

    /// Tracks of an album; empty for every other kind.
    pub fn tracks(&self) -> &[Track] {
        match &self.payload {
            MediaPayload::Album { tracks } => tracks,
            _ => &[],
        }
    }

    /// 0-based index of the track the owning worker is on.
    pub fn track_position(&self) -> usize {
        self.current_track_position.load(Ordering::Acquire)
    }

    pub fn set_track_position(&self, position: usize) {
        self.current_track_position.store(position, Ordering::Release);
    }

    pub fn summary(&self) -> MediaSummary {
        MediaSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind(),
            image_path: self.image_path.clone(),
        }
    }
}

/// The part of a media object carried inside a status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaSummary {
    pub id: String,
    pub name: String,
    pub kind: MediaKind,
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
    Error,
}

/// Snapshot of the unified playback state.  Always published and read as a
/// whole value; `rev` increases on every publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackStatus {
    #[serde(default)]
    pub rev: u64,
    pub state: PlayerState,
    pub current_media: Option<MediaSummary>,
    pub current_track: Option<Track>,
    /// 1-based index of `current_track`, 0 when there is none.
    pub track_position: usize,
    pub volume: f32,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PlaybackStatus {
    pub fn stopped(volume: f32) -> Self {
        Self {
            rev: 0,
            state: PlayerState::Stopped,
            current_media: None,
            current_track: None,
            track_position: 0,
            volume: volume.clamp(0.0, 1.0),
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    /// True when `media_id` is the media this snapshot refers to.
    pub fn is_current(&self, media_id: &str) -> bool {
        self.current_media
            .as_ref()
            .map(|m| m.id == media_id)
            .unwrap_or(false)
    }
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self::stopped(0.7)
    }
}
