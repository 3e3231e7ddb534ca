#![allow(dead_code)]

use async_trait::async_trait;
use deck_daemon::catalog::MediaCatalog;
use deck_daemon::engine::{Engine, EngineState};
use deck_daemon::orchestrator::Orchestrator;
use deck_daemon::speaker::{SpeakerDevice, TransportState};
use deck_daemon::workers::WorkerTimings;
use deck_proto::protocol::{Favorite, MediaObject, MediaPayload, PlaybackStatus, Track};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub fn timings() -> WorkerTimings {
    WorkerTimings {
        stream_grace: Duration::from_millis(300),
        track_grace: Duration::from_millis(300),
        poll_interval: Duration::from_millis(5),
        stop_timeout: Duration::from_millis(500),
    }
}

pub fn radio(id: &str) -> MediaObject {
    MediaObject::new(
        id,
        id.to_uppercase(),
        MediaPayload::Radio {
            url: format!("http://stream.example/{}", id),
        },
    )
}

pub fn album(id: &str, tracks: u32) -> MediaObject {
    let tracks = (1..=tracks)
        .map(|n| Track {
            number: n,
            title: format!("Track {}", n),
            source_path: format!("/music/{}/{:02}.Track {}.mp3", id, n, n).into(),
        })
        .collect();
    MediaObject::new(id, id.to_uppercase(), MediaPayload::Album { tracks })
}

pub fn remote(id: &str, uri: &str) -> MediaObject {
    MediaObject::new(id, id.to_uppercase(), MediaPayload::RemoteFavorite { uri: uri.into() })
}

pub fn orchestrator(items: Vec<MediaObject>, engine: &Arc<FakeEngine>) -> Arc<Orchestrator> {
    let catalog = Arc::new(MediaCatalog::new(items));
    Arc::new(Orchestrator::new(catalog, engine.clone(), timings(), 0.5))
}

/// Poll the status until `pred` holds; panics after two seconds.
pub async fn wait_for(
    orchestrator: &Orchestrator,
    pred: impl Fn(&PlaybackStatus) -> bool,
) -> PlaybackStatus {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let status = orchestrator.status().await;
        if pred(&status) {
            return status;
        }
        if Instant::now() >= deadline {
            panic!("condition not reached, last status: {:?}", status);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

struct EngineInner {
    state: EngineState,
    current: Option<String>,
    played: Vec<String>,
    confirm_at: Option<Instant>,
    finish_at: Option<Instant>,
    stops: usize,
    overlaps: usize,
    volume: f32,
}

/// Engine double.  Items confirm `confirm_delay` after `play` and, with a
/// track length, end on their own.
pub struct FakeEngine {
    inner: Mutex<EngineInner>,
    confirm_delay: Duration,
    track_length: Option<Duration>,
    refused: HashSet<String>,
    stalled: HashSet<String>,
    stop_error: Option<String>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                state: EngineState::Idle,
                current: None,
                played: Vec::new(),
                confirm_at: None,
                finish_at: None,
                stops: 0,
                overlaps: 0,
                volume: 0.5,
            }),
            confirm_delay: Duration::from_millis(20),
            track_length: None,
            refused: HashSet::new(),
            stalled: HashSet::new(),
            stop_error: None,
        }
    }

    pub fn with_track_length(mut self, length: Duration) -> Self {
        self.track_length = Some(length);
        self
    }

    pub fn refusing(mut self, uri: &str) -> Self {
        self.refused.insert(uri.to_string());
        self
    }

    pub fn stalling(mut self, uri: &str) -> Self {
        self.stalled.insert(uri.to_string());
        self
    }

    /// `stop` still goes idle but reports `message` as an error.
    pub fn failing_stop(mut self, message: &str) -> Self {
        self.stop_error = Some(message.to_string());
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn played(&self) -> Vec<String> {
        self.inner.lock().unwrap().played.clone()
    }

    pub fn stops(&self) -> usize {
        self.inner.lock().unwrap().stops
    }

    /// Plays issued while a previous item was still active.
    pub fn overlaps(&self) -> usize {
        self.inner.lock().unwrap().overlaps
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().unwrap().volume
    }

    pub fn force_state(&self, state: EngineState) {
        self.inner.lock().unwrap().state = state;
    }

    fn advance(&self, inner: &mut EngineInner) {
        let now = Instant::now();
        if inner.state == EngineState::Opening {
            let stalled = inner
                .current
                .as_ref()
                .map(|uri| self.stalled.contains(uri))
                .unwrap_or(false);
            if !stalled && inner.confirm_at.map(|t| now >= t).unwrap_or(false) {
                inner.state = EngineState::Playing;
                inner.finish_at = self.track_length.map(|len| now + len);
            }
        }
        if inner.state == EngineState::Playing && inner.finish_at.map(|t| now >= t).unwrap_or(false) {
            inner.state = EngineState::Ended;
        }
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn play(&self, uri: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        self.advance(&mut inner);
        if inner.state.is_active() {
            inner.overlaps += 1;
        }
        if self.refused.contains(uri) {
            return Ok(false);
        }
        inner.played.push(uri.to_string());
        inner.current = Some(uri.to_string());
        inner.state = EngineState::Opening;
        inner.confirm_at = Some(Instant::now() + self.confirm_delay);
        inner.finish_at = None;
        Ok(true)
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.state = EngineState::Idle;
        inner.current = None;
        inner.stops += 1;
        match &self.stop_error {
            Some(message) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(()),
        }
    }

    async fn pause(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.advance(&mut inner);
        if inner.state == EngineState::Playing {
            inner.state = EngineState::Paused;
            inner.finish_at = None;
        }
        Ok(())
    }

    async fn resume(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == EngineState::Paused {
            inner.state = EngineState::Playing;
            inner.finish_at = self.track_length.map(|len| Instant::now() + len);
        }
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        self.inner.lock().unwrap().volume = volume;
        Ok(())
    }

    async fn state(&self) -> EngineState {
        let mut inner = self.inner.lock().unwrap();
        self.advance(&mut inner);
        inner.state
    }
}

struct SpeakerInner {
    calls: Vec<String>,
    transport: TransportState,
    volume: u8,
}

/// Speaker double; methods named in `broken` fail.
pub struct FakeSpeaker {
    favorites: Vec<Favorite>,
    broken: HashSet<&'static str>,
    inner: Mutex<SpeakerInner>,
}

impl FakeSpeaker {
    pub fn new(favorites: Vec<Favorite>) -> Self {
        Self {
            favorites,
            broken: HashSet::new(),
            inner: Mutex::new(SpeakerInner {
                calls: Vec::new(),
                transport: TransportState::Stopped,
                volume: 20,
            }),
        }
    }

    pub fn breaking(mut self, method: &'static str) -> Self {
        self.broken.insert(method);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn volume(&self) -> u8 {
        self.inner.lock().unwrap().volume
    }

    fn call(&self, method: &'static str, next: Option<TransportState>) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(method.to_string());
        if self.broken.contains(method) {
            anyhow::bail!("{} not supported by this firmware", method);
        }
        if let Some(state) = next {
            inner.transport = state;
        }
        Ok(())
    }
}

#[async_trait]
impl SpeakerDevice for FakeSpeaker {
    fn name(&self) -> String {
        "Living Room".to_string()
    }

    async fn favorites(&self) -> anyhow::Result<Vec<Favorite>> {
        Ok(self.favorites.clone())
    }

    async fn clear_queue(&self) -> anyhow::Result<()> {
        self.call("clear_queue", None)
    }

    async fn add_to_queue(&self, _favorite: &Favorite) -> anyhow::Result<()> {
        self.call("add_to_queue", None)
    }

    async fn add_uri_to_queue(&self, _uri: &str) -> anyhow::Result<()> {
        self.call("add_uri_to_queue", None)
    }

    async fn play_from_queue(&self, _index: usize) -> anyhow::Result<()> {
        self.call("play_from_queue", Some(TransportState::Playing))
    }

    async fn play_uri(&self, _uri: &str) -> anyhow::Result<()> {
        self.call("play_uri", Some(TransportState::Playing))
    }

    async fn play(&self) -> anyhow::Result<()> {
        self.call("play", Some(TransportState::Playing))
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.call("pause", Some(TransportState::Paused))
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.call("stop", Some(TransportState::Stopped))
    }

    async fn next(&self) -> anyhow::Result<()> {
        self.call("next", None)
    }

    async fn previous(&self) -> anyhow::Result<()> {
        self.call("previous", None)
    }

    async fn set_volume(&self, volume: u8) -> anyhow::Result<()> {
        self.call("set_volume", None)?;
        self.inner.lock().unwrap().volume = volume;
        Ok(())
    }

    async fn transport_state(&self) -> anyhow::Result<TransportState> {
        Ok(self.inner.lock().unwrap().transport)
    }
}
