use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::{ControlSurface, KeyCallback, KeyImageFormat, SurfaceDriver, SurfaceError};

const KEY_SIZE: u32 = 72;

struct DeckState {
    images: Vec<Option<Vec<u8>>>,
    brightness: u8,
    callback: Option<KeyCallback>,
    closed: bool,
}

/// In-process control surface.  Keys are pressed through `press` and the
/// pushed images can be read back.
#[derive(Clone)]
pub struct VirtualDeck {
    name: String,
    state: Arc<RwLock<DeckState>>,
}

impl VirtualDeck {
    pub fn new(name: impl Into<String>, key_count: usize) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(DeckState {
                images: vec![None; key_count],
                brightness: 100,
                callback: None,
                closed: false,
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DeckState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DeckState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn key_image(&self, index: usize) -> Option<Vec<u8>> {
        self.read().images.get(index).cloned().flatten()
    }

    pub fn snapshot(&self) -> Vec<Option<Vec<u8>>> {
        self.read().images.clone()
    }

    pub fn brightness(&self) -> u8 {
        self.read().brightness
    }

    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    /// Press and release `index`.
    pub fn press(&self, index: usize) -> Result<(), SurfaceError> {
        let callback = {
            let state = self.read();
            if state.closed {
                return Err(SurfaceError::Closed);
            }
            if index >= state.images.len() {
                return Err(SurfaceError::KeyOutOfRange {
                    index,
                    count: state.images.len(),
                });
            }
            state.callback.clone()
        };
        debug!("virtual deck: key {} pressed", index);
        if let Some(callback) = callback {
            callback(index, true);
            callback(index, false);
        }
        Ok(())
    }
}

impl ControlSurface for VirtualDeck {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn key_count(&self) -> usize {
        self.read().images.len()
    }

    fn key_image_format(&self) -> KeyImageFormat {
        KeyImageFormat {
            width: KEY_SIZE,
            height: KEY_SIZE,
        }
    }

    fn set_key_image(&self, index: usize, image: &[u8]) -> Result<(), SurfaceError> {
        let mut state = self.write();
        if state.closed {
            return Err(SurfaceError::Closed);
        }
        let count = state.images.len();
        match state.images.get_mut(index) {
            Some(slot) => {
                *slot = Some(image.to_vec());
                Ok(())
            }
            None => Err(SurfaceError::KeyOutOfRange { index, count }),
        }
    }

    fn set_key_callback(&self, callback: KeyCallback) {
        self.write().callback = Some(callback);
    }

    fn set_brightness(&self, percent: u8) -> Result<(), SurfaceError> {
        self.write().brightness = percent.min(100);
        Ok(())
    }

    fn reset(&self) -> Result<(), SurfaceError> {
        self.write().images.iter_mut().for_each(|img| *img = None);
        Ok(())
    }

    fn close(&self) {
        let mut state = self.write();
        state.callback = None;
        state.closed = true;
    }
}

/// Driver that "discovers" a fixed set of virtual decks.
#[derive(Clone, Default)]
pub struct VirtualDriver {
    decks: Vec<VirtualDeck>,
}

impl VirtualDriver {
    pub fn new(decks: Vec<VirtualDeck>) -> Self {
        Self { decks }
    }
}

impl SurfaceDriver for VirtualDriver {
    fn enumerate(&self) -> Vec<Arc<dyn ControlSurface>> {
        self.decks
            .iter()
            .map(|d| Arc::new(d.clone()) as Arc<dyn ControlSurface>)
            .collect()
    }
}
