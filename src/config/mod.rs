//! Configuration management for the Mayra engine
//!
//! Sources, lowest priority first: built-in defaults, the TOML overlay
//! (`~/.config/mayra/config.toml`), then environment variables.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::Result;
use file::MayraConfigFile;

/// Default live model identifier
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Kore";

/// Grace period between the shutdown tool and the power-down signal
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(3500);

/// Engine configuration
#[derive(Debug)]
pub struct Config {
    /// Live session configuration
    pub session: SessionConfig,

    /// Audio pipeline configuration
    pub audio: AudioConfig,

    /// Directory holding the state database
    pub data_dir: PathBuf,

    /// Directory receiving exported documents
    pub downloads_dir: PathBuf,

    /// Screen width hint in logical pixels (None = desktop)
    pub screen_width: Option<u32>,
}

/// Live session configuration
#[derive(Debug)]
pub struct SessionConfig {
    /// API key for the conversation service
    pub api_key: Option<SecretString>,

    /// Model identifier
    pub model: String,

    /// Prebuilt voice name
    pub voice: String,

    /// Offer the search grounding tool
    pub google_search: bool,

    /// Delay before the shutdown tool powers the assistant down
    pub shutdown_grace: Duration,
}

/// Audio pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioConfig {
    /// Capture sample rate (Hz)
    pub input_sample_rate: u32,

    /// Playback sample rate of inbound speech (Hz)
    pub output_sample_rate: u32,

    /// Samples per capture frame
    pub frame_size: usize,

    /// Weight of the previous value in volume smoothing
    pub volume_smoothing: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: crate::voice::CAPTURE_SAMPLE_RATE,
            output_sample_rate: crate::voice::PLAYBACK_SAMPLE_RATE,
            frame_size: crate::voice::FRAME_SIZE,
            volume_smoothing: crate::voice::VOLUME_SMOOTHING,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            google_search: true,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl Config {
    /// Build a configuration rooted at a data directory, with defaults elsewhere
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            session: SessionConfig::default(),
            audio: AudioConfig::default(),
            downloads_dir: data_dir.join("downloads"),
            data_dir,
            screen_width: None,
        }
    }

    /// Load configuration from the config file and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be created
    pub fn load() -> Result<Self> {
        let file = file::load_config_file();
        let config = Self::from_sources(file, |key| std::env::var(key).ok());

        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Merge a parsed config file with an environment lookup
    pub fn from_sources<F>(file: MayraConfigFile, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // ~/.local/share/mayra on Linux
        let default_data_dir = directories::ProjectDirs::from("dev", "mayra", "mayra")
            .map_or_else(|| PathBuf::from(".mayra"), |d| d.data_dir().to_path_buf());

        let default_downloads = directories::UserDirs::new()
            .and_then(|d| d.download_dir().map(PathBuf::from))
            .unwrap_or_else(|| default_data_dir.join("downloads"));

        let data_dir = env("MAYRA_DATA_DIR")
            .or(file.paths.data_dir)
            .map_or(default_data_dir, PathBuf::from);

        let downloads_dir = env("MAYRA_DOWNLOADS_DIR")
            .or(file.paths.downloads_dir)
            .map_or(default_downloads, PathBuf::from);

        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("API_KEY"))
            .or(file.session.api_key)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let session = SessionConfig {
            api_key,
            model: env("MAYRA_MODEL")
                .or(file.session.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voice: env("MAYRA_VOICE")
                .or(file.session.voice)
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            google_search: env("MAYRA_GOOGLE_SEARCH")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(file.session.google_search)
                .unwrap_or(true),
            shutdown_grace: file
                .session
                .shutdown_grace_ms
                .map_or(DEFAULT_SHUTDOWN_GRACE, Duration::from_millis),
        };

        let defaults = AudioConfig::default();
        let audio = AudioConfig {
            input_sample_rate: file
                .audio
                .input_sample_rate
                .filter(|r| *r > 0)
                .unwrap_or(defaults.input_sample_rate),
            output_sample_rate: file
                .audio
                .output_sample_rate
                .filter(|r| *r > 0)
                .unwrap_or(defaults.output_sample_rate),
            frame_size: file
                .audio
                .frame_size
                .filter(|n| *n > 0)
                .unwrap_or(defaults.frame_size),
            volume_smoothing: file
                .audio
                .volume_smoothing
                .filter(|f| (0.0..1.0).contains(f))
                .unwrap_or(defaults.volume_smoothing),
        };

        let screen_width = env("MAYRA_SCREEN_WIDTH")
            .and_then(|s| s.parse().ok())
            .or(file.display.screen_width);

        Self {
            session,
            audio,
            data_dir,
            downloads_dir,
            screen_width,
        }
    }

    /// Path of the state database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("mayra.db")
    }
}
