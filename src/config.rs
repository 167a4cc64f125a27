//! Configuration system for Narrator
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (NARRATOR_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Longest pause a persona may take between turns
pub const MAX_PHRASE_DELAY_SECS: u64 = 86_400;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    /// Logging configuration
    pub logging: LoggingSettings,

    /// Text generation provider
    pub provider: ProviderSettings,

    /// Commentary pipeline policy knobs
    pub commentary: CommentarySettings,

    /// Speech output
    pub speech: SpeechSettings,

    /// Player identity used in prompts
    pub player: PlayerSettings,

    /// Persona roster, in speaking order
    pub personas: Vec<PersonaSettings>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

/// OpenAI-compatible provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Display name used in logs and usage accounting
    pub name: String,

    /// API base URL (e.g., "https://api.openai.com/v1", "http://localhost:11434/v1")
    pub base_url: String,

    /// API key (empty string for local servers like Ollama)
    pub api_key: String,

    /// Primary model identifier
    pub model_id: String,

    /// Secondary (usually stronger) model identifier
    pub secondary_model_id: String,

    /// Rotate to the secondary model every `model_switch_ratio` calls
    pub use_secondary_model: bool,

    pub model_switch_ratio: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Model id fragments that support forced JSON output
    pub json_mode_markers: Vec<String>,
}

/// Commentary pipeline policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentarySettings {
    /// Retries shared by every failure kind within one generation request
    pub max_retries: u32,

    /// History entries kept before compaction kicks in
    pub history_cap: usize,

    /// Maximum number of queued speech jobs
    pub queue_capacity: usize,

    /// Edit distance at or below which an utterance counts as a repeat
    pub penalty_threshold: usize,

    pub max_penalty: f32,

    /// Penalty a persona starts a session with
    pub initial_penalty: f32,

    pub temperature: f32,

    /// Persona tick interval in milliseconds
    pub tick_interval_ms: u64,

    /// Speech consumer poll interval in milliseconds
    pub poll_interval_ms: u64,
}

/// Speech output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    pub enabled: bool,

    /// Console playback pace; 0 prints utterances without pausing
    pub words_per_minute: u32,

    /// Language used when a persona does not set one
    pub default_language: String,
}

/// Player settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlayerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One configured persona
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaSettings {
    pub name: String,

    /// Personality description; `PLAYERNAME` is replaced with the player reference
    pub personality: String,

    /// Chronicler (balanced storytelling) instead of improviser
    pub is_chronicler: bool,

    /// Phrases taken from the shared pool per hand-off
    pub phrases_limit: usize,

    pub phrase_max_word_count: u32,

    pub history_max_word_count: u32,

    /// Minimum pause before this persona speaks again
    pub phrase_delay_min_secs: u64,

    /// Maximum pause before this persona speaks again
    pub phrase_delay_max_secs: u64,

    pub voice: String,

    pub voice_style: String,

    /// Voice locale fragment, e.g. "en-US"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_language: Option<String>,
}

// Default implementations

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            logging: LoggingSettings::default(),
            provider: ProviderSettings::default(),
            commentary: CommentarySettings::default(),
            speech: SpeechSettings::default(),
            player: PlayerSettings::default(),
            personas: vec![PersonaSettings::default()],
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: String::new(),
            model_id: "llama3".to_string(),
            secondary_model_id: String::new(),
            use_secondary_model: false,
            model_switch_ratio: 10,
            timeout_secs: 120,
            json_mode_markers: vec!["1106".to_string(), "0125".to_string()],
        }
    }
}

impl Default for CommentarySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            history_cap: 5,
            queue_capacity: 3,
            penalty_threshold: 30,
            max_penalty: 2.0,
            initial_penalty: 0.5,
            temperature: 0.5,
            tick_interval_ms: 1000,
            poll_interval_ms: 200,
        }
    }
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            words_per_minute: 0,
            default_language: "en-US".to_string(),
        }
    }
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            name: "Narrator".to_string(),
            personality: "You are a commentator watching the player play the popular game Rimworld."
                .to_string(),
            is_chronicler: false,
            phrases_limit: 20,
            phrase_max_word_count: 40,
            history_max_word_count: 200,
            phrase_delay_min_secs: 5,
            phrase_delay_max_secs: 10,
            voice: String::new(),
            voice_style: "default".to_string(),
            voice_language: None,
        }
    }
}

impl SpeechSettings {
    /// Whether speech jobs may be queued at all
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.default_language.trim().is_empty()
    }
}

impl NarratorConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e.message()),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        config.apply_env_overrides();
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("narrator.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("narrator").join("narrator.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".narrator").join("narrator.toml"))
                .unwrap_or_default(),
        ];

        for path in &search_paths {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Provider settings
        if let Ok(val) = std::env::var("NARRATOR_BASE_URL") {
            self.provider.base_url = val;
        }
        if let Ok(val) = std::env::var("NARRATOR_API_KEY") {
            self.provider.api_key = val;
        }
        if let Ok(val) = std::env::var("NARRATOR_MODEL") {
            self.provider.model_id = val;
        }
        if let Ok(val) = std::env::var("NARRATOR_SECONDARY_MODEL") {
            self.provider.secondary_model_id = val;
            self.provider.use_secondary_model = !self.provider.secondary_model_id.is_empty();
        }
        if let Ok(val) = std::env::var("NARRATOR_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.provider.timeout_secs = n;
            }
        }

        // Commentary settings
        if let Ok(val) = std::env::var("NARRATOR_MAX_RETRIES") {
            if let Ok(n) = val.parse() {
                self.commentary.max_retries = n;
            }
        }
        if let Ok(val) = std::env::var("NARRATOR_QUEUE_CAPACITY") {
            if let Ok(n) = val.parse() {
                self.commentary.queue_capacity = n;
            }
        }

        // Speech settings
        if let Ok(val) = std::env::var("NARRATOR_SPEECH_ENABLED") {
            self.speech.enabled = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(val) = std::env::var("NARRATOR_SPEECH_WPM") {
            if let Ok(n) = val.parse() {
                self.speech.words_per_minute = n;
            }
        }

        if let Ok(val) = std::env::var("NARRATOR_PLAYER_NAME") {
            self.player.name = Some(val);
        }

        // Logging settings
        if let Ok(val) = std::env::var("NARRATOR_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("NARRATOR_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("NARRATOR_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.provider.base_url.is_empty() {
            return Err(Error::config_field_invalid(
                "provider.base_url",
                "Provider base URL cannot be empty",
            ));
        }
        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            return Err(Error::config_field_invalid(
                "provider.base_url",
                "Provider base URL must start with http:// or https://",
            ));
        }
        if self.provider.use_secondary_model && self.provider.model_switch_ratio == 0 {
            return Err(Error::config_field_invalid(
                "provider.model_switch_ratio",
                "model_switch_ratio must be at least 1 when the secondary model is enabled",
            ));
        }

        let c = &self.commentary;
        if c.queue_capacity == 0 {
            return Err(Error::config_field_invalid(
                "commentary.queue_capacity",
                "queue_capacity must be at least 1",
            ));
        }
        if !(c.max_penalty > 0.0 && c.max_penalty <= 2.0) {
            return Err(Error::config_field_invalid(
                "commentary.max_penalty",
                "max_penalty must be in (0, 2]",
            ));
        }
        if !(0.0..=c.max_penalty).contains(&c.initial_penalty) {
            return Err(Error::config_field_invalid(
                "commentary.initial_penalty",
                "initial_penalty must be between 0 and max_penalty",
            ));
        }
        if c.tick_interval_ms == 0 || c.poll_interval_ms == 0 {
            return Err(Error::config_validation("Tick and poll intervals must be positive"));
        }

        if self.personas.is_empty() {
            return Err(Error::config_validation("At least one [[personas]] entry is required"));
        }
        for (index, persona) in self.personas.iter().enumerate() {
            if persona.name.trim().is_empty() {
                return Err(Error::config_field_invalid(
                    format!("personas[{}].name", index),
                    "Persona name cannot be empty",
                ));
            }
            if persona.phrase_delay_min_secs > persona.phrase_delay_max_secs {
                return Err(Error::PersonaInvalid {
                    name: persona.name.clone(),
                    reason: "phrase_delay_min_secs is larger than phrase_delay_max_secs".to_string(),
                });
            }
            if persona.phrase_delay_max_secs > MAX_PHRASE_DELAY_SECS {
                return Err(Error::PersonaInvalid {
                    name: persona.name.clone(),
                    reason: format!(
                        "phrase_delay_max_secs must be at most {} seconds",
                        MAX_PHRASE_DELAY_SECS
                    ),
                });
            }
            let duplicates = self.personas.iter().filter(|p| p.name == persona.name).count();
            if duplicates > 1 {
                return Err(Error::PersonaInvalid {
                    name: persona.name.clone(),
                    reason: "persona names must be unique".to_string(),
                });
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".narrator")
                .join("narrator.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Narrator Configuration

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.narrator/logs/narrator.log"

max_file_size_mb = 100
max_files = 5
json_format = false

[provider]
name = "openai"

# API base URL (OpenAI, Ollama, vLLM, LM Studio, etc.)
base_url = "http://localhost:11434/v1"

# API key (leave empty for local servers like Ollama)
api_key = ""

model_id = "llama3"

# Every `model_switch_ratio` calls use the secondary model once.
# History compaction always uses the secondary model.
secondary_model_id = ""
use_secondary_model = false
model_switch_ratio = 10

timeout_secs = 120

# Model ids containing one of these fragments get forced JSON output
json_mode_markers = ["1106", "0125"]

[commentary]
# Retries shared by malformed, empty, repetitive and failed generations
max_retries = 3

# History entries kept before they are compacted
history_cap = 5

# Speech jobs queued at most; extra utterances are dropped
queue_capacity = 3

# Edit distance at or below which a new utterance counts as a repeat
penalty_threshold = 30
max_penalty = 2.0
initial_penalty = 0.5
temperature = 0.5

tick_interval_ms = 1000
poll_interval_ms = 200

[speech]
enabled = true
# Pace console playback at this many words per minute (0 = no pause)
words_per_minute = 0
default_language = "en-US"

[player]
# name = "Tynan"

[[personas]]
name = "Narrator"
personality = "You are a commentator watching the player play the popular game Rimworld."
is_chronicler = false
phrases_limit = 20
phrase_max_word_count = 40
history_max_word_count = 200
phrase_delay_min_secs = 5
phrase_delay_max_secs = 10
voice = ""
voice_style = "default"
"#
    .to_string()
}
