//! Control-surface driver interface and the key faces the synchronizer draws.

mod render;
mod virtual_deck;

pub use render::{JsonFaceRenderer, KeyRenderer};
pub use virtual_deck::{VirtualDeck, VirtualDriver};

use deck_proto::config::Rgb;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::error::{PlayerError, PlayerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyImageFormat {
    pub width: u32,
    pub height: u32,
}

/// Called with `(key_index, pressed)` on every key transition.
pub type KeyCallback = Arc<dyn Fn(usize, bool) + Send + Sync>;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("key {index} out of range ({count} keys)")]
    KeyOutOfRange { index: usize, count: usize },

    #[error("surface has {have} keys, {need} required")]
    TooFewKeys { have: usize, need: usize },

    #[error("surface closed")]
    Closed,

    #[error("render failed: {0}")]
    Render(String),
}

/// An open button surface.  Images are in the device's native format, as
/// produced by a `KeyRenderer`.
pub trait ControlSurface: Send + Sync {
    fn name(&self) -> String;
    fn key_count(&self) -> usize;
    fn key_image_format(&self) -> KeyImageFormat;
    fn set_key_image(&self, index: usize, image: &[u8]) -> Result<(), SurfaceError>;
    fn set_key_callback(&self, callback: KeyCallback);
    fn set_brightness(&self, percent: u8) -> Result<(), SurfaceError>;
    /// Blank every key.
    fn reset(&self) -> Result<(), SurfaceError>;
    fn close(&self) {}
}

pub trait SurfaceDriver: Send + Sync {
    fn enumerate(&self) -> Vec<Arc<dyn ControlSurface>>;
}

pub fn open_first(driver: &dyn SurfaceDriver) -> PlayerResult<Arc<dyn ControlSurface>> {
    match driver.enumerate().into_iter().next() {
        Some(surface) => {
            info!("surface: opened {} ({} keys)", surface.name(), surface.key_count());
            Ok(surface)
        }
        None => Err(PlayerError::DeviceUnavailable(
            "no control surface found".to_string(),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Glyph {
    PauseBars,
    PlayTriangle,
    LoadingDots,
}

/// Everything needed to draw one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFace {
    pub label: String,
    pub thumbnail: Option<PathBuf>,
    pub color: Rgb,
    /// Drawn in the bottom-right corner.
    pub glyph: Option<Glyph>,
}

impl KeyFace {
    pub fn text(label: impl Into<String>, color: Rgb) -> Self {
        Self {
            label: label.into(),
            thumbnail: None,
            color,
            glyph: None,
        }
    }

    pub fn blank(color: Rgb) -> Self {
        Self::text("", color)
    }
}
