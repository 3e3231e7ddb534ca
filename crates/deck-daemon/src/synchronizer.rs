//! Mirrors playback state onto the control surface and turns key presses
//! into orchestrator commands.
//!
//! ```text
//!  key 0   key 1   key 2   key 3         key 4   key 5
//!  [ carousel window  ]    [now playing] [  ◄  ] [  ►  ]
//! ```

use deck_proto::config::{CarouselConfig, ColorScheme, DeckConfig};
use deck_proto::protocol::{MediaObject, PlaybackStatus, PlayerState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::carousel::{CarouselNavigator, Direction, WINDOW_SIZE};
use crate::catalog::CatalogEvent;
use crate::error::{PlayerError, PlayerResult};
use crate::orchestrator::Orchestrator;
use crate::surface::{ControlSurface, Glyph, KeyFace, KeyRenderer, SurfaceError};

pub const NOW_PLAYING_PLACEHOLDER: &str = "NOW\nPLAYING";
pub const ARROW_PREVIOUS: &str = "◄";
pub const ARROW_NEXT: &str = "►";

/// Which physical key does what.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonLayout {
    pub carousel: [usize; WINDOW_SIZE],
    pub now_playing: usize,
    pub previous: usize,
    pub next: usize,
}

impl Default for ButtonLayout {
    fn default() -> Self {
        Self {
            carousel: [0, 1, 2],
            now_playing: 3,
            previous: 4,
            next: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyRole {
    Carousel(usize),
    NowPlaying,
    Previous,
    Next,
}

impl ButtonLayout {
    pub fn required_keys(&self) -> usize {
        let highest = self.carousel.iter().copied().max().unwrap_or(0);
        highest.max(self.now_playing).max(self.previous).max(self.next) + 1
    }

    fn role(&self, key: usize) -> Option<KeyRole> {
        if let Some(slot) = self.carousel.iter().position(|&k| k == key) {
            return Some(KeyRole::Carousel(slot));
        }
        match key {
            k if k == self.now_playing => Some(KeyRole::NowPlaying),
            k if k == self.previous => Some(KeyRole::Previous),
            k if k == self.next => Some(KeyRole::Next),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub update_interval: Duration,
    pub brightness: u8,
    pub colors: ColorScheme,
    pub carousel: CarouselConfig,
    pub layout: ButtonLayout,
}

impl From<&DeckConfig> for SyncOptions {
    fn from(config: &DeckConfig) -> Self {
        Self {
            update_interval: config.update_interval(),
            brightness: config.brightness,
            colors: config.colors,
            carousel: config.carousel.clone(),
            layout: ButtonLayout::default(),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&DeckConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckCommand {
    Key { index: usize, pressed: bool },
    Navigate(Direction),
    Refresh,
}

/// Sends commands to a running synchronizer.
#[derive(Clone)]
pub struct DeckControl {
    tx: mpsc::Sender<DeckCommand>,
}

impl DeckControl {
    pub async fn send(&self, command: DeckCommand) -> bool {
        self.tx.send(command).await.is_ok()
    }

    pub async fn navigate(&self, direction: Direction) -> bool {
        self.send(DeckCommand::Navigate(direction)).await
    }

    pub async fn press(&self, index: usize) -> bool {
        self.send(DeckCommand::Key { index, pressed: true }).await
            && self.send(DeckCommand::Key { index, pressed: false }).await
    }
}

/// Glyph baked into the now-playing key for `state`.
pub fn glyph_for(state: PlayerState) -> Option<Glyph> {
    match state {
        PlayerState::Playing => Some(Glyph::PauseBars),
        PlayerState::Paused => Some(Glyph::PlayTriangle),
        PlayerState::Loading => Some(Glyph::LoadingDots),
        PlayerState::Stopped | PlayerState::Error => None,
    }
}

/// Face of a carousel slot holding `media` (or nothing).
pub fn slot_face(media: Option<&MediaObject>, status: &PlaybackStatus, colors: &ColorScheme) -> KeyFace {
    let Some(media) = media else {
        return KeyFace::blank(colors.inactive);
    };
    let color = if status.is_current(&media.id) {
        match status.state {
            PlayerState::Playing => colors.playing,
            PlayerState::Loading => colors.loading,
            PlayerState::Error => colors.error,
            PlayerState::Paused | PlayerState::Stopped => colors.available,
        }
    } else {
        colors.available
    };
    KeyFace {
        label: media.name.clone(),
        thumbnail: media.image_path.clone(),
        color,
        glyph: None,
    }
}

pub fn now_playing_face(status: &PlaybackStatus, colors: &ColorScheme) -> KeyFace {
    let Some(media) = &status.current_media else {
        return KeyFace::text(NOW_PLAYING_PLACEHOLDER, colors.inactive);
    };
    let color = match status.state {
        PlayerState::Playing => colors.playing,
        PlayerState::Paused | PlayerState::Loading => colors.loading,
        PlayerState::Error => colors.error,
        PlayerState::Stopped => colors.inactive,
    };
    let label = match &status.current_track {
        Some(track) => format!("{}\n{}", media.name, track.title),
        None => media.name.clone(),
    };
    KeyFace {
        label,
        thumbnail: media.image_path.clone(),
        color,
        glyph: glyph_for(status.state),
    }
}

pub fn arrow_face(arrow: &str, enabled: bool, colors: &ColorScheme) -> KeyFace {
    KeyFace::text(arrow, if enabled { colors.available } else { colors.inactive })
}

pub struct ButtonSynchronizer {
    orchestrator: Arc<Orchestrator>,
    surface: Arc<dyn ControlSurface>,
    renderer: Arc<dyn KeyRenderer>,
    navigator: CarouselNavigator,
    options: SyncOptions,
    /// Last face pushed per key; unchanged keys are not re-sent.
    pushed: Vec<Option<KeyFace>>,
}

impl ButtonSynchronizer {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        surface: Arc<dyn ControlSurface>,
        renderer: Arc<dyn KeyRenderer>,
        options: SyncOptions,
    ) -> Self {
        let ids = orchestrator.catalog().ordered_ids();
        let navigator = CarouselNavigator::from_config(ids, &options.carousel);
        let keys = surface.key_count();
        Self {
            orchestrator,
            surface,
            renderer,
            navigator,
            options,
            pushed: vec![None; keys],
        }
    }

    pub fn navigator(&self) -> &CarouselNavigator {
        &self.navigator
    }

    /// Check the key count, apply brightness and blank the keys.
    pub fn setup(&mut self) -> Result<(), SurfaceError> {
        let need = self.options.layout.required_keys();
        let have = self.surface.key_count();
        if have < need {
            return Err(SurfaceError::TooFewKeys { have, need });
        }
        self.surface.set_brightness(self.options.brightness)?;
        self.surface.reset()?;
        self.pushed.iter_mut().for_each(|f| *f = None);
        info!("deck: {} ready", self.surface.name());
        Ok(())
    }

    /// One periodic update: auto-reset, then redraw what changed.
    pub async fn tick(&mut self) {
        if self.navigator.check_auto_reset() {
            debug!("deck: carousel reset to {}", self.navigator.offset());
        }
        self.render_all().await;
    }

    pub async fn render_all(&mut self) {
        let status = self.orchestrator.status().await;
        let colors = self.options.colors;
        let layout = self.options.layout;
        let catalog = Arc::clone(self.orchestrator.catalog());

        let window: Vec<Option<String>> = self
            .navigator
            .window()
            .into_iter()
            .map(|id| id.map(str::to_string))
            .collect();
        for (slot, id) in window.iter().enumerate() {
            let media = id.as_deref().and_then(|id| catalog.get(id));
            let face = slot_face(media.as_deref(), &status, &colors);
            self.push(layout.carousel[slot], face);
        }

        self.push(layout.now_playing, now_playing_face(&status, &colors));
        let (prev, next) = (
            self.navigator.can_navigate_previous(),
            self.navigator.can_navigate_next(),
        );
        self.push(layout.previous, arrow_face(ARROW_PREVIOUS, prev, &colors));
        self.push(layout.next, arrow_face(ARROW_NEXT, next, &colors));
    }

    fn push(&mut self, key: usize, face: KeyFace) {
        if self.pushed.get(key).and_then(Option::as_ref) == Some(&face) {
            return;
        }
        let result = self
            .renderer
            .render(&face, self.surface.key_image_format())
            .and_then(|image| self.surface.set_key_image(key, &image));
        match result {
            Ok(()) => {
                if let Some(slot) = self.pushed.get_mut(key) {
                    *slot = Some(face);
                }
            }
            Err(e) => warn!("deck: key {} not updated: {}", key, e),
        }
    }

    /// Re-read the catalog order and redraw everything.
    pub async fn on_media_catalog_changed(&mut self) {
        let ids = self.orchestrator.catalog().ordered_ids();
        debug!("deck: catalog changed, {} items", ids.len());
        self.navigator.set_ids(ids);
        self.pushed.iter_mut().for_each(|f| *f = None);
        self.render_all().await;
    }

    pub async fn navigate(&mut self, direction: Direction) -> bool {
        let moved = self.navigator.navigate(direction);
        if moved {
            self.render_all().await;
        }
        moved
    }

    /// Act on a key transition.  Only presses do anything.
    pub async fn handle_key(&mut self, index: usize, pressed: bool) {
        if !pressed {
            return;
        }
        match self.options.layout.role(index) {
            Some(KeyRole::Carousel(slot)) => self.press_slot(slot).await,
            Some(KeyRole::NowPlaying) => self.press_now_playing().await,
            Some(KeyRole::Previous) => {
                self.navigate(Direction::Previous).await;
            }
            Some(KeyRole::Next) => {
                self.navigate(Direction::Next).await;
            }
            None => debug!("deck: key {} has no role", index),
        }
    }

    async fn press_slot(&mut self, slot: usize) {
        let Some(id) = self.navigator.button_to_media_id(slot).map(str::to_string) else {
            return;
        };
        self.navigator.touch();
        let status = self.orchestrator.status().await;
        let busy = matches!(status.state, PlayerState::Playing | PlayerState::Loading);
        if status.is_current(&id) && busy {
            info!("deck: stop {}", id);
            self.orchestrator.stop().await;
        } else {
            info!("deck: play {}", id);
            if let Err(e) = self.orchestrator.play(&id, 1).await {
                warn!("deck: play {} failed: {}", id, e);
            }
        }
        self.render_all().await;
    }

    async fn press_now_playing(&mut self) {
        let status = self.orchestrator.status().await;
        match (status.state, status.current_media) {
            (PlayerState::Playing, _) => {
                self.orchestrator.pause().await;
            }
            (PlayerState::Paused, _) => {
                self.orchestrator.resume().await;
            }
            (_, Some(media)) => {
                if let Err(e) = self.orchestrator.play(&media.id, 1).await {
                    warn!("deck: replay {} failed: {}", media.id, e);
                }
            }
            (_, None) => return,
        }
        self.render_all().await;
    }

    async fn handle_command(&mut self, command: DeckCommand) {
        match command {
            DeckCommand::Key { index, pressed } => self.handle_key(index, pressed).await,
            DeckCommand::Navigate(direction) => {
                self.navigate(direction).await;
            }
            DeckCommand::Refresh => self.on_media_catalog_changed().await,
        }
    }

    /// Blank the keys and release the surface.
    pub fn close(&mut self) {
        if let Err(e) = self.surface.reset() {
            debug!("deck: reset on close failed: {}", e);
        }
        self.surface.close();
        info!("deck: closed");
    }

    /// Set up the surface, then run the tick loop on its own task.  Key
    /// presses from the surface callback and `DeckControl` commands are
    /// handled on the same task.  A surface that fails setup is left alone
    /// and reported as `DeviceUnavailable`.
    pub fn spawn(mut self) -> PlayerResult<SynchronizerHandle> {
        if let Err(e) = self.setup() {
            warn!("deck: setup failed: {}", e);
            return Err(PlayerError::DeviceUnavailable(format!("{}: {}", self.surface.name(), e)));
        }

        let (tx, mut rx) = mpsc::channel(64);
        let key_tx = tx.clone();
        self.surface.set_key_callback(Arc::new(move |index: usize, pressed: bool| {
            if let Err(e) = key_tx.try_send(DeckCommand::Key { index, pressed }) {
                warn!("deck: dropped key event: {}", e);
            }
        }));

        let mut catalog_rx = self.orchestrator.catalog().subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            self.on_media_catalog_changed().await;

            let mut ticker = tokio::time::interval(self.options.update_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut catalog_open = true;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => self.tick().await,
                    Some(command) = rx.recv() => self.handle_command(command).await,
                    event = catalog_rx.recv(), if catalog_open => match event {
                        Ok(CatalogEvent::Changed { .. }) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            self.on_media_catalog_changed().await
                        }
                        Err(broadcast::error::RecvError::Closed) => catalog_open = false,
                    },
                }
            }
            self.close();
        });

        Ok(SynchronizerHandle {
            cancel,
            join,
            control: DeckControl { tx },
        })
    }
}

pub struct SynchronizerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
    control: DeckControl,
}

impl SynchronizerHandle {
    pub fn control(&self) -> DeckControl {
        self.control.clone()
    }

    pub async fn close(self, timeout: Duration) {
        self.cancel.cancel();
        if tokio::time::timeout(timeout, self.join).await.is_err() {
            warn!("deck: synchronizer did not stop within {:?}", timeout);
        }
    }
}
