//! TOML configuration file loading
//!
//! Supports `~/.config/mayra/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MayraConfigFile {
    /// Live session configuration
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Audio pipeline configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Storage locations
    #[serde(default)]
    pub paths: PathsFileConfig,

    /// Display hints used by the system instruction
    #[serde(default)]
    pub display: DisplayFileConfig,
}

/// Live session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// API key for the conversation service
    pub api_key: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Kore")
    pub voice: Option<String>,

    /// Offer the search grounding tool to the agent
    pub google_search: Option<bool>,

    /// Delay between the shutdown tool and the power-down signal
    pub shutdown_grace_ms: Option<u64>,
}

/// Audio pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Capture sample rate sent to the service
    pub input_sample_rate: Option<u32>,

    /// Sample rate of inbound speech
    pub output_sample_rate: Option<u32>,

    /// Samples per capture frame
    pub frame_size: Option<usize>,

    /// Weight of the previous value in volume smoothing
    pub volume_smoothing: Option<f32>,
}

/// Storage locations
#[derive(Debug, Default, Deserialize)]
pub struct PathsFileConfig {
    /// Directory holding the state database
    pub data_dir: Option<String>,

    /// Directory receiving exported documents
    pub downloads_dir: Option<String>,
}

/// Display hints
#[derive(Debug, Default, Deserialize)]
pub struct DisplayFileConfig {
    /// Screen width in logical pixels
    pub screen_width: Option<u32>,
}

/// Load the TOML config file from the standard path
///
/// Returns `MayraConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> MayraConfigFile {
    let Some(path) = config_file_path() else {
        return MayraConfigFile::default();
    };

    if !path.exists() {
        return MayraConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            MayraConfigFile::default()
        }),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MayraConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the content is not valid TOML for this schema
pub fn parse_config(content: &str) -> crate::Result<MayraConfigFile> {
    let config = toml::from_str(content)?;
    Ok(config)
}

/// Return the config file path: `~/.config/mayra/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("mayra").join("config.toml"))
}
