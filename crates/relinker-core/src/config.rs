use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::engine::AudioOutput;
use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit mpv binary. Empty means search `MPV_PATH`, beside the exe, then PATH.
    #[serde(default)]
    pub mpv_path: PathBuf,
    #[serde(default)]
    pub audio_output: AudioOutput,
    /// How close to the end of a track the next one is handed to mpv.
    #[serde(default = "default_prefetch_lead_secs")]
    pub prefetch_lead_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_seek_step_secs")]
    pub seek_step_secs: u64,
    #[serde(default = "default_fine_seek_step_secs")]
    pub fine_seek_step_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default)]
    pub theme: ThemeMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

impl std::str::FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            other => Err(format!("unknown theme '{}' (expected dark or light)", other)),
        }
    }
}

/// Where the player keeps its state files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Per-playlist resume positions.
    #[serde(default = "default_positions_file")]
    pub positions_file: PathBuf,
    /// Saved playlists and their display names.
    #[serde(default = "default_registry_file")]
    pub registry_file: PathBuf,
    /// Extracted cover art, one file per track.
    #[serde(default = "default_art_cache_dir")]
    pub art_cache_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mpv_path: PathBuf::new(),
            audio_output: AudioOutput::default(),
            prefetch_lead_secs: default_prefetch_lead_secs(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            seek_step_secs: default_seek_step_secs(),
            fine_seek_step_secs: default_fine_seek_step_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            positions_file: default_positions_file(),
            registry_file: default_registry_file(),
            art_cache_dir: default_art_cache_dir(),
        }
    }
}

fn default_prefetch_lead_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_seek_step_secs() -> u64 {
    5
}

fn default_fine_seek_step_secs() -> u64 {
    1
}

fn default_positions_file() -> PathBuf {
    platform::data_dir().join("positions.toml")
}

fn default_registry_file() -> PathBuf {
    platform::data_dir().join("playlists.json")
}

fn default_art_cache_dir() -> PathBuf {
    platform::cache_dir().join("art")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Read `config_path`, writing the defaults there first if it is missing.
    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn mpv_path(&self) -> Option<&Path> {
        let p = self.engine.mpv_path.as_path();
        (!p.as_os_str().is_empty()).then_some(p)
    }
}
