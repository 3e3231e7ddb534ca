use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

pub type Rgb = [u8; 3];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub deck: DeckConfig,
    #[serde(default)]
    pub speaker: SpeakerConfig,
}

/// Remote speaker selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeakerConfig {
    /// Speaker to attach by name; the first one discovered when unset.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Playback engine and worker timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// How long a radio worker waits for the engine to report playing.
    #[serde(default = "default_stream_grace_ms")]
    pub stream_grace_ms: u64,
    /// Same, per album track.
    #[serde(default = "default_track_grace_ms")]
    pub track_grace_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on how long `stop` waits for a worker to finish.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// TOML file holding the configured `[[media]]` entries.
    #[serde(default = "default_catalog_file")]
    pub catalog_file: PathBuf,
    /// Each sub-directory with audio files becomes an album.
    #[serde(default = "platform::default_music_dir")]
    pub music_dir: PathBuf,
    #[serde(default = "default_true")]
    pub enable_local_albums: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default)]
    pub carousel: CarouselConfig,
    #[serde(default)]
    pub colors: ColorScheme,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarouselConfig {
    #[serde(default = "default_true")]
    pub infinite_wrap: bool,
    /// Idle time before the carousel returns to `default_position`.  0 disables it.
    #[serde(default = "default_auto_reset_seconds")]
    pub auto_reset_seconds: u64,
    #[serde(default)]
    pub default_position: usize,
}

/// Key background colors, one per button role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorScheme {
    #[serde(default = "default_inactive")]
    pub inactive: Rgb,
    #[serde(default = "default_playing")]
    pub playing: Rgb,
    #[serde(default = "default_loading")]
    pub loading: Rgb,
    #[serde(default = "default_error")]
    pub error: Rgb,
    #[serde(default = "default_available")]
    pub available: Rgb,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            stream_grace_ms: default_stream_grace_ms(),
            track_grace_ms: default_track_grace_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            catalog_file: default_catalog_file(),
            music_dir: platform::default_music_dir(),
            enable_local_albums: true,
        }
    }
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            brightness: default_brightness(),
            update_interval_ms: default_update_interval_ms(),
            carousel: CarouselConfig::default(),
            colors: ColorScheme::default(),
        }
    }
}

impl DeckConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(10))
    }
}

impl Default for CarouselConfig {
    fn default() -> Self {
        Self {
            infinite_wrap: true,
            auto_reset_seconds: default_auto_reset_seconds(),
            default_position: 0,
        }
    }
}

impl CarouselConfig {
    pub fn idle_threshold(&self) -> Option<Duration> {
        (self.auto_reset_seconds > 0).then(|| Duration::from_secs(self.auto_reset_seconds))
    }
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            inactive: default_inactive(),
            playing: default_playing(),
            loading: default_loading(),
            error: default_error(),
            available: default_available(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_volume() -> f32 {
    0.7
}

fn default_stream_grace_ms() -> u64 {
    1000
}

fn default_track_grace_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_stop_timeout_ms() -> u64 {
    2000
}

fn default_catalog_file() -> PathBuf {
    platform::config_dir().join("media.toml")
}

fn default_brightness() -> u8 {
    50
}

fn default_update_interval_ms() -> u64 {
    500
}

fn default_auto_reset_seconds() -> u64 {
    30
}

fn default_inactive() -> Rgb {
    [50, 50, 50]
}

fn default_playing() -> Rgb {
    [0, 150, 0]
}

fn default_loading() -> Rgb {
    [255, 165, 0]
}

fn default_error() -> Rgb {
    [150, 0, 0]
}

fn default_available() -> Rgb {
    [0, 100, 200]
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
