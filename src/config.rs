//! Configuration file handling for cpu-reveal.
//!
//! Loads configuration from `~/.config/cpu-reveal/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::interactive::SaveSettings;
use crate::presentation::DEFAULT_DOWNLOAD_FILENAME;
use crate::request::{AspectRatio, ModelTier, RequestBuilder, Resolution};
use crate::veo::VEO_API_BASE_URL;

/// Configuration file structure for cpu-reveal.
/// Loaded from ~/.config/cpu-reveal/config.toml (or custom path via --config).
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub tier: ModelTier,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Replaces the built-in prompt when set.
    pub prompt: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
            tier: ModelTier::default(),
            poll_interval_secs: default_poll_interval_secs(),
            prompt: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct OutputConfig {
    pub directory: Option<PathBuf>,
    pub filename: Option<String>,
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the default file doesn't exist.
    /// An explicitly given path must exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path.is_some();
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if !path.exists() {
            if explicit {
                return Err(ConfigError::NotFound { path });
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })?;

        if config.generation.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                path,
                message: "generation.poll_interval_secs must be at least 1".to_string(),
            });
        }

        Ok(config)
    }

    /// API base URL, defaulting to the public endpoint.
    pub fn base_url(&self) -> &str {
        self.api.base_url.as_deref().unwrap_or(VEO_API_BASE_URL)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.generation.poll_interval_secs)
    }

    /// Request builder seeded with the configured defaults.
    pub fn request_builder(&self) -> RequestBuilder {
        let builder = match &self.generation.prompt {
            Some(prompt) => RequestBuilder::new(prompt.clone()),
            None => RequestBuilder::default(),
        };
        builder
            .aspect_ratio(self.generation.aspect_ratio)
            .resolution(self.generation.resolution)
            .tier(self.generation.tier)
    }

    /// Download directory and filename. A leading `~` means the home directory.
    pub fn save_settings(&self) -> SaveSettings {
        SaveSettings {
            directory: self
                .output
                .directory
                .as_deref()
                .map(expand_home)
                .unwrap_or_else(|| PathBuf::from(".")),
            filename: self
                .output
                .filename
                .clone()
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_FILENAME.to_string()),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    NotFound {
        path: PathBuf,
    },
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: PathBuf,
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound { path } => {
                write!(f, "Config file '{}' does not exist", path.display())
            }
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, message } => {
                write!(f, "Invalid config file '{}': {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::NotFound { .. } | ConfigError::InvalidValue { .. } => None,
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("cpu-reveal").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/cpu-reveal/config.toml")
        })
}

/// Replace a leading `~` component with the home directory, when known.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Template written by `config init`.
pub const DEFAULT_CONFIG: &str = r#"# cpu-reveal configuration

[api]
# Gemini API endpoint
# base_url = "https://generativelanguage.googleapis.com/v1beta"

[generation]
# Aspect ratio: "16:9" or "9:16"
aspect_ratio = "16:9"
# Resolution: "720p" or "1080p"
resolution = "1080p"
# Render engine: "fast" or "quality"
tier = "fast"
# Seconds between status checks
poll_interval_secs = 5
# Replace the built-in visual directive
# prompt = "A macro shot of a glowing CPU die"

[output]
# Where downloaded videos go (default: current directory, ~ is your home)
# directory = "~/Videos"
filename = "cpu_reveal_cinematic.mp4"
"#;
