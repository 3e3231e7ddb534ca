use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use deck_proto::config::Config;
use deck_proto::protocol::{MediaKind, PlaybackStatus};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::carousel::Direction;
use crate::catalog::build_catalog;
use crate::error::PlayerError;
use crate::orchestrator::Orchestrator;
use crate::surface::VirtualDeck;
use crate::synchronizer::DeckControl;

#[derive(Clone)]
pub struct HttpState {
    orchestrator: Arc<Orchestrator>,
    config: Arc<Config>,
    deck: Option<DeckControl>,
    virtual_deck: Option<VirtualDeck>,
}

impl HttpState {
    pub fn new(orchestrator: Arc<Orchestrator>, config: Arc<Config>) -> Self {
        Self {
            orchestrator,
            config,
            deck: None,
            virtual_deck: None,
        }
    }

    pub fn with_deck(mut self, control: DeckControl, virtual_deck: Option<VirtualDeck>) -> Self {
        self.deck = Some(control);
        self.virtual_deck = virtual_deck;
        self
    }
}

#[derive(Serialize)]
struct MediaInfo {
    id: String,
    name: String,
    kind: MediaKind,
    description: String,
    image_path: Option<PathBuf>,
    track_count: usize,
}

#[derive(Serialize)]
pub struct CommandResult {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

type Reply = (StatusCode, Json<CommandResult>);

fn ok() -> Reply {
    (StatusCode::OK, Json(CommandResult { ok: true, error: None }))
}

fn fail(status: StatusCode, error: impl Into<String>) -> Reply {
    (
        status,
        Json(CommandResult {
            ok: false,
            error: Some(error.into()),
        }),
    )
}

fn from_bool(done: bool, what: &str) -> Reply {
    if done {
        ok()
    } else {
        fail(StatusCode::CONFLICT, format!("{} not possible in the current state", what))
    }
}

fn from_player_error(err: PlayerError) -> Reply {
    let status = match err {
        PlayerError::NotFound(_) => StatusCode::NOT_FOUND,
        PlayerError::UnsupportedType(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PlayerError::OutOfRange { .. } => StatusCode::BAD_REQUEST,
        PlayerError::EngineFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PlayerError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    fail(status, err.to_string())
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/media", get(list_media))
        .route("/api/media/reload", post(reload_media))
        .route("/api/play/:id", get(play).post(play))
        .route("/api/play/:id/:track", get(play_track).post(play_track))
        .route("/api/stop", get(stop).post(stop))
        .route("/api/pause", get(pause).post(pause))
        .route("/api/resume", get(resume).post(resume))
        .route("/api/next", get(next_track).post(next_track))
        .route("/api/previous", get(previous_track).post(previous_track))
        .route("/api/volume/:volume", get(set_volume).post(set_volume))
        .route("/api/navigate/:direction", post(navigate))
        .route("/api/deck", get(get_deck))
        .route("/api/deck/keys/:index/press", post(press_key))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn start_server(bind_address: String, port: u16, state: HttpState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };
        info!("HTTP API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, router(state)).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_status(State(state): State<HttpState>) -> Json<PlaybackStatus> {
    Json(state.orchestrator.status().await)
}

async fn list_media(State(state): State<HttpState>) -> Json<Vec<MediaInfo>> {
    let media = state
        .orchestrator
        .catalog()
        .ordered()
        .iter()
        .map(|m| MediaInfo {
            id: m.id.clone(),
            name: m.name.clone(),
            kind: m.kind(),
            description: m.description.clone(),
            image_path: m.image_path.clone(),
            track_count: m.tracks().len(),
        })
        .collect();
    Json(media)
}

async fn reload_media(State(state): State<HttpState>) -> Reply {
    info!("HTTP API: reload media");
    if let Err(e) = state.orchestrator.reload_remote_favorites().await {
        warn!("HTTP API: speaker favorites not reloaded: {}", e);
    }
    let favorites = state.orchestrator.remote_favorites().await;
    let config = Arc::clone(&state.config);
    match tokio::task::spawn_blocking(move || build_catalog(&config, &favorites)).await {
        Ok(items) => {
            state.orchestrator.catalog().replace(items);
            ok()
        }
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn play(State(state): State<HttpState>, Path(id): Path<String>) -> Reply {
    info!("HTTP API: play {}", id);
    match state.orchestrator.play(&id, 1).await {
        Ok(()) => ok(),
        Err(e) => from_player_error(e),
    }
}

async fn play_track(
    State(state): State<HttpState>,
    Path((id, track)): Path<(String, usize)>,
) -> Reply {
    info!("HTTP API: play {} track {}", id, track);
    match state.orchestrator.play(&id, track).await {
        Ok(()) => ok(),
        Err(e) => from_player_error(e),
    }
}

async fn stop(State(state): State<HttpState>) -> Reply {
    info!("HTTP API: stop");
    if state.orchestrator.stop().await {
        ok()
    } else {
        let status = state.orchestrator.status().await;
        fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            status.error_message.unwrap_or_else(|| "stop failed".to_string()),
        )
    }
}

async fn pause(State(state): State<HttpState>) -> Reply {
    from_bool(state.orchestrator.pause().await, "pause")
}

async fn resume(State(state): State<HttpState>) -> Reply {
    from_bool(state.orchestrator.resume().await, "resume")
}

async fn next_track(State(state): State<HttpState>) -> Reply {
    from_bool(state.orchestrator.next_track().await, "next track")
}

async fn previous_track(State(state): State<HttpState>) -> Reply {
    from_bool(state.orchestrator.previous_track().await, "previous track")
}

async fn set_volume(State(state): State<HttpState>, Path(volume): Path<f32>) -> Reply {
    info!("HTTP API: volume {}", volume);
    from_bool(state.orchestrator.set_volume(volume).await, "volume")
}

async fn navigate(State(state): State<HttpState>, Path(direction): Path<String>) -> Reply {
    let Some(deck) = &state.deck else {
        return fail(StatusCode::SERVICE_UNAVAILABLE, "no control surface");
    };
    match direction.parse::<Direction>() {
        Ok(direction) => from_bool(deck.navigate(direction).await, "navigate"),
        Err(e) => fail(StatusCode::BAD_REQUEST, e),
    }
}

/// Faces currently shown on the virtual deck, one entry per key.
async fn get_deck(State(state): State<HttpState>) -> Result<Json<Vec<Option<serde_json::Value>>>, StatusCode> {
    let deck = state.virtual_deck.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    let faces = deck
        .snapshot()
        .into_iter()
        .map(|image| image.and_then(|bytes| serde_json::from_slice(&bytes).ok()))
        .collect();
    Ok(Json(faces))
}

async fn press_key(State(state): State<HttpState>, Path(index): Path<usize>) -> Reply {
    if let Some(deck) = &state.virtual_deck {
        return match deck.press(index) {
            Ok(()) => ok(),
            Err(e) => fail(StatusCode::BAD_REQUEST, e.to_string()),
        };
    }
    match &state.deck {
        Some(control) => from_bool(control.press(index).await, "key press"),
        None => fail(StatusCode::SERVICE_UNAVAILABLE, "no control surface"),
    }
}
