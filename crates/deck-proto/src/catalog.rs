use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::protocol::{Favorite, MediaObject, MediaPayload, Track};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "m4a"];
const ALBUM_ART: &str = "album_art.png";

/// One `[[media]]` table of the catalog file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CatalogEntry {
    Radio {
        id: String,
        name: String,
        url: String,
        #[serde(default)]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_path: Option<PathBuf>,
    },
    RemoteFavorite {
        id: String,
        name: String,
        uri: String,
        #[serde(default)]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_path: Option<PathBuf>,
    },
}

impl CatalogEntry {
    pub fn id(&self) -> &str {
        match self {
            CatalogEntry::Radio { id, .. } | CatalogEntry::RemoteFavorite { id, .. } => id,
        }
    }

    pub fn into_media_object(self) -> MediaObject {
        match self {
            CatalogEntry::Radio {
                id,
                name,
                url,
                description,
                image_path,
            } => MediaObject::new(id, name, MediaPayload::Radio { url })
                .with_description(description)
                .with_image(image_path),
            CatalogEntry::RemoteFavorite {
                id,
                name,
                uri,
                description,
                image_path,
            } => MediaObject::new(id, name, MediaPayload::RemoteFavorite { uri })
                .with_description(description)
                .with_image(image_path),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub media: Vec<CatalogEntry>,
}

pub fn default_catalog() -> CatalogFile {
    let radio = |n: u8| CatalogEntry::Radio {
        id: format!("sr_p{}", n),
        name: format!("SR P{}", n),
        url: format!("https://http-live.sr.se/p{}-mp3-192", n),
        description: format!("Sveriges Radio P{}", n),
        image_path: None,
    };
    CatalogFile {
        media: vec![radio(1), radio(2), radio(3)],
    }
}

pub fn parse_catalog_str(content: &str) -> anyhow::Result<Vec<CatalogEntry>> {
    let file: CatalogFile = toml::from_str(content)?;
    Ok(file.media)
}

pub fn load_catalog_file(path: &Path) -> anyhow::Result<Vec<CatalogEntry>> {
    let content = std::fs::read_to_string(path)?;
    parse_catalog_str(&content)
}

/// Load the catalog file, seeding it with the default stations on first run.
pub fn load_or_init_catalog(path: &Path) -> anyhow::Result<Vec<CatalogEntry>> {
    if !path.exists() {
        let defaults = default_catalog();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(&defaults)?)?;
        return Ok(defaults.media);
    }
    load_catalog_file(path)
}

/// Split `NN.Title` into its track number and title.
///
/// A stem without a numeric prefix keeps the whole stem as title and gets
/// number 0.
pub fn parse_track_file_name(stem: &str) -> (u32, String) {
    if let Some((prefix, rest)) = stem.split_once('.') {
        if let Ok(number) = prefix.trim().parse::<u32>() {
            return (number, rest.trim().to_string());
        }
    }
    (0, stem.to_string())
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn scan_album_dir(dir: &Path) -> anyhow::Result<Option<MediaObject>> {
    let folder = match dir.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_string(),
        None => return Ok(None),
    };

    let mut tracks = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || !is_audio_file(&path) {
            continue;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => continue,
        };
        let (number, title) = parse_track_file_name(stem);
        tracks.push(Track {
            number,
            title,
            source_path: path.clone(),
        });
    }

    if tracks.is_empty() {
        return Ok(None);
    }
    tracks.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.title.cmp(&b.title)));

    let art = dir.join(ALBUM_ART);
    let count = tracks.len();
    let media = MediaObject::new(
        format!("album_{}", folder),
        folder.clone(),
        MediaPayload::Album { tracks },
    )
    .with_description(format!("{} tracks", count))
    .with_image(art.exists().then_some(art));

    Ok(Some(media))
}

/// Every sub-directory of `music_dir` holding audio files becomes an album,
/// ordered by folder name.  A missing directory yields no albums.
pub fn scan_albums(music_dir: &Path) -> anyhow::Result<Vec<MediaObject>> {
    if !music_dir.is_dir() {
        debug!("Music dir {} not found, no albums", music_dir.display());
        return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(music_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let mut albums = Vec::new();
    for dir in dirs {
        match scan_album_dir(&dir) {
            Ok(Some(album)) => albums.push(album),
            Ok(None) => {}
            Err(e) => warn!("Skipping album {}: {}", dir.display(), e),
        }
    }
    Ok(albums)
}

fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Favorites of a remote speaker as catalog entries, in device order.
pub fn favorites_to_media(favorites: &[Favorite]) -> Vec<MediaObject> {
    favorites
        .iter()
        .enumerate()
        .map(|(i, fav)| {
            MediaObject::new(
                format!("remote_{}_{}", i, slug(&fav.title)),
                fav.title.clone(),
                MediaPayload::RemoteFavorite {
                    uri: fav.uri.clone(),
                },
            )
            .with_description("Speaker favorite")
        })
        .collect()
}

/// Concatenate sources in order, keeping the first object for each id.
pub fn merge(sources: impl IntoIterator<Item = Vec<MediaObject>>) -> Vec<MediaObject> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for media in sources.into_iter().flatten() {
        if seen.insert(media.id.clone()) {
            merged.push(media);
        } else {
            warn!("Duplicate media id {}, keeping the first", media.id);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MediaKind;

    #[test]
    fn test_parse_catalog_entries() {
        let entries = parse_catalog_str(
            r#"
            [[media]]
            type = "radio"
            id = "p2"
            name = "P2"
            url = "https://example.com/p2"

            [[media]]
            type = "remote_favorite"
            id = "jazz"
            name = "Jazz"
            uri = "x-sonosapi-stream:s1234"
            description = "Jazz on the kitchen speaker"
            "#,
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id(), "p2");

        let jazz = entries[1].clone().into_media_object();
        assert_eq!(jazz.kind(), MediaKind::RemoteFavorite);
        assert_eq!(jazz.description, "Jazz on the kitchen speaker");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = parse_catalog_str(
            r#"
            [[media]]
            type = "podcast"
            id = "x"
            name = "X"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.toml");
        let entries = load_or_init_catalog(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(path.exists());
        assert_eq!(load_catalog_file(&path).unwrap(), entries);
    }

    #[test]
    fn test_parse_track_file_name() {
        assert_eq!(parse_track_file_name("03.Little Green"), (3, "Little Green".into()));
        assert_eq!(parse_track_file_name("intro"), (0, "intro".into()));
        assert_eq!(parse_track_file_name("Side A.Intro"), (0, "Side A.Intro".into()));
    }

    #[test]
    fn test_scan_albums() {
        let dir = tempfile::tempdir().unwrap();
        let blue = dir.path().join("blue");
        std::fs::create_dir(&blue).unwrap();
        std::fs::write(blue.join("02.My Old Man.mp3"), b"").unwrap();
        std::fs::write(blue.join("01.All I Want.mp3"), b"").unwrap();
        std::fs::write(blue.join("notes.txt"), b"").unwrap();
        std::fs::write(blue.join(ALBUM_ART), b"").unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();

        let albums = scan_albums(dir.path()).unwrap();
        assert_eq!(albums.len(), 1);
        let album = &albums[0];
        assert_eq!(album.id, "album_blue");
        assert_eq!(album.image_path, Some(blue.join(ALBUM_ART)));
        let titles: Vec<_> = album.tracks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["All I Want", "My Old Man"]);
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let albums = scan_albums(Path::new("/definitely/not/here")).unwrap();
        assert!(albums.is_empty());
    }

    #[test]
    fn test_favorites_and_merge() {
        let favorites = vec![
            Favorite {
                title: "Morning Jazz!".into(),
                uri: "x-rincon:1".into(),
            },
            Favorite {
                title: "News".into(),
                uri: "x-rincon:2".into(),
            },
        ];
        let remote = favorites_to_media(&favorites);
        assert_eq!(remote[0].id, "remote_0_morning_jazz");
        assert_eq!(remote[1].id, "remote_1_news");

        let radio = vec![MediaObject::new(
            "remote_1_news",
            "Shadow",
            MediaPayload::Radio { url: "http://x".into() },
        )];
        let merged = merge([radio, remote]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "Shadow");
        assert_eq!(merged[1].id, "remote_0_morning_jazz");
    }
}
