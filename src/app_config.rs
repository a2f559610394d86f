use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles loading, validating and saving the engine settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Article server
    #[serde(default)]
    pub server: ServerConfig,

    /// Waveform geometry
    #[serde(default)]
    pub waveform: WaveformConfig,

    /// Reading location persistence
    #[serde(default)]
    pub reading: ReadingConfig,

    /// Game controller mapping
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Audio output
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Article server configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Root URL of the reader server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Article the session works on
    #[serde(default)]
    pub article_id: i64,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            article_id: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Waveform rendering configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WaveformConfig {
    /// Resolution before any coarsening
    #[serde(default = "default_ms_per_pixel")]
    pub ms_per_pixel: f64,

    /// Largest raster width the surface accepts
    #[serde(default = "default_max_width_px")]
    pub max_width_px: u32,

    /// Narrowest waveform drawn, even for very short sentences
    #[serde(default = "default_min_width_px")]
    pub min_width_px: u32,

    #[serde(default = "default_height_px")]
    pub height_px: u32,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            ms_per_pixel: default_ms_per_pixel(),
            max_width_px: default_max_width_px(),
            min_width_px: default_min_width_px(),
            height_px: default_height_px(),
        }
    }
}

/// Reading location configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReadingConfig {
    /// Navigation activations between automatic saves
    #[serde(default = "default_autosave_threshold")]
    pub autosave_threshold: u32,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            autosave_threshold: default_autosave_threshold(),
        }
    }
}

/// Game controller configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Minimum time between two triggered actions
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Interval of the polling task
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Button index mapped to "next sentence"
    #[serde(default = "default_next_button")]
    pub next_button: usize,

    /// Button index mapped to "play / pause"
    #[serde(default = "default_play_pause_button")]
    pub play_pause_button: usize,

    /// Button index mapped to "previous sentence"
    #[serde(default = "default_previous_button")]
    pub previous_button: usize,

    /// Button index mapped to "toggle translation"
    #[serde(default = "default_toggle_translation_button")]
    pub toggle_translation_button: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            next_button: default_next_button(),
            play_pause_button: default_play_pause_button(),
            previous_button: default_previous_button(),
            toggle_translation_button: default_toggle_translation_button(),
        }
    }
}

/// Audio output type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Records clips and never completes them on its own
    #[default]
    Null,
    /// Completes each clip after its real duration
    Timer,
    /// Plays through the default sound device (needs the `device` feature)
    Device,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Timer => write!(f, "timer"),
            Self::Device => write!(f, "device"),
        }
    }
}

impl std::str::FromStr for OutputKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "null" => Ok(Self::Null),
            "timer" => Ok(Self::Timer),
            "device" => Ok(Self::Device),
            _ => Err(anyhow!("Invalid output type: {}", s)),
        }
    }
}

/// Playback configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub output: OutputKind,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_ms_per_pixel() -> f64 {
    10.0
}

fn default_max_width_px() -> u32 {
    16384
}

fn default_min_width_px() -> u32 {
    50
}

fn default_height_px() -> u32 {
    75
}

fn default_autosave_threshold() -> u32 {
    crate::reading_location::DEFAULT_AUTOSAVE_THRESHOLD
}

fn default_cooldown_ms() -> u64 {
    250
}

fn default_poll_interval_ms() -> u64 {
    16 // one display frame at 60 Hz
}

fn default_next_button() -> usize {
    0
}

fn default_play_pause_button() -> usize {
    1
}

fn default_previous_button() -> usize {
    2
}

fn default_toggle_translation_button() -> usize {
    3
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.server.base_url)
            .with_context(|| format!("Invalid server base URL: {}", self.server.base_url))?;

        if self.server.timeout_secs == 0 {
            return Err(anyhow!("Server timeout must be at least one second"));
        }

        let waveform = &self.waveform;
        if !(waveform.ms_per_pixel > 0.0) {
            return Err(anyhow!("Waveform resolution must be positive"));
        }
        if waveform.min_width_px == 0 || waveform.min_width_px > waveform.max_width_px {
            return Err(anyhow!(
                "Waveform widths must satisfy 0 < min ({}) <= max ({})",
                waveform.min_width_px,
                waveform.max_width_px
            ));
        }
        if waveform.height_px == 0 {
            return Err(anyhow!("Waveform height must be positive"));
        }

        if self.reading.autosave_threshold == 0 {
            return Err(anyhow!("Autosave threshold must be at least 1"));
        }

        let controller = &self.controller;
        let mut buttons = vec![
            controller.next_button,
            controller.play_pause_button,
            controller.previous_button,
            controller.toggle_translation_button,
        ];
        buttons.sort_unstable();
        buttons.dedup();
        if buttons.len() != 4 {
            return Err(anyhow!("Each controller action needs its own button"));
        }
        if controller.poll_interval_ms == 0 {
            return Err(anyhow!("Controller poll interval must be positive"));
        }

        Ok(())
    }

    /// Read a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {:?}", path))?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load a configuration, writing the defaults first if the file is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        warn!("Config file not found at {:?}, creating default config.", path);
        let config = Config::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {:?}", path))?;
        Ok(config)
    }

    /// Path used when none is given: `syncread.json` in the working directory if
    /// present, otherwise the per-user config directory
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from("syncread.json");
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("syncread").join("config.json"))
            .unwrap_or(local)
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            waveform: WaveformConfig::default(),
            reading: ReadingConfig::default(),
            controller: ControllerConfig::default(),
            playback: PlaybackConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
