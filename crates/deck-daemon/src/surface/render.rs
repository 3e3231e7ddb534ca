use serde::Serialize;

use super::{KeyFace, KeyImageFormat, SurfaceError};

/// Turns a key face into the bytes a surface accepts.
pub trait KeyRenderer: Send + Sync {
    fn render(&self, face: &KeyFace, format: KeyImageFormat) -> Result<Vec<u8>, SurfaceError>;
}

/// Encodes the face itself as JSON.  Used with the virtual deck, whose
/// "images" are read back by the HTTP API.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFaceRenderer;

#[derive(Serialize)]
struct RenderedFace<'a> {
    width: u32,
    height: u32,
    #[serde(flatten)]
    face: &'a KeyFace,
}

impl KeyRenderer for JsonFaceRenderer {
    fn render(&self, face: &KeyFace, format: KeyImageFormat) -> Result<Vec<u8>, SurfaceError> {
        serde_json::to_vec(&RenderedFace {
            width: format.width,
            height: format.height,
            face,
        })
        .map_err(|e| SurfaceError::Render(e.to_string()))
    }
}
