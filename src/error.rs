//! Error types for Narrator
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for narrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Provider errors (3xx)
    ProviderRequest = 300,
    ProviderTimeout = 301,
    ProviderResponse = 302,
    ProviderUnconfigured = 303,

    // Generation errors (4xx)
    MalformedOutput = 400,
    EmptyOutput = 401,
    GenerationExhausted = 402,

    // Speech errors (5xx)
    SpeechUnconfigured = 500,
    PlaybackFailed = 501,

    // Persona errors (6xx)
    PersonaNotFound = 600,
    PersonaInvalid = 601,

    // Internal errors (9xx)
    InternalError = 900,
    NotSupported = 902,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10,
            200..=299 => 20,
            300..=399 => 30,
            400..=499 => 40,
            500..=599 => 50,
            600..=699 => 60,
            900..=999 => 90,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Provider Errors (text generation collaborator)
    // ─────────────────────────────────────────────────────────────

    /// Request to the generation endpoint failed
    #[error("Provider request to {url} failed: {message}")]
    ProviderRequest { url: String, message: String },

    /// Request timed out
    #[error("Provider request to {url} timed out after {timeout_secs}s")]
    ProviderTimeout { url: String, timeout_secs: u64 },

    /// Endpoint answered with something we could not use
    #[error("Provider returned an unusable response: {message}")]
    ProviderResponse { status: Option<u16>, message: String },

    /// No model or endpoint configured
    #[error("Provider not configured: {0}")]
    ProviderUnconfigured(String),

    // ─────────────────────────────────────────────────────────────
    // Generation Errors
    // ─────────────────────────────────────────────────────────────

    /// Model output could not be parsed as the expected object
    #[error("Malformed model output: {message}")]
    MalformedOutput { message: String, raw: String },

    /// Model output was empty after cleanup
    #[error("Model output was empty after cleanup")]
    EmptyOutput,

    /// All attempts failed
    #[error("Generation for {persona} gave up after {attempts} attempts: {reason}")]
    GenerationExhausted {
        persona: String,
        attempts: u32,
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Speech Errors
    // ─────────────────────────────────────────────────────────────

    #[error("Speech output is not configured")]
    SpeechUnconfigured,

    #[error("Playback failed for {persona}: {message}")]
    PlaybackFailed { persona: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Persona Errors
    // ─────────────────────────────────────────────────────────────

    #[error("Persona not found: {name}")]
    PersonaNotFound { name: String },

    #[error("Persona {name} is invalid: {reason}")]
    PersonaInvalid { name: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::InternalError,

            Error::ProviderRequest { .. } => ErrorCode::ProviderRequest,
            Error::ProviderTimeout { .. } => ErrorCode::ProviderTimeout,
            Error::ProviderResponse { .. } => ErrorCode::ProviderResponse,
            Error::ProviderUnconfigured(_) => ErrorCode::ProviderUnconfigured,

            Error::MalformedOutput { .. } => ErrorCode::MalformedOutput,
            Error::EmptyOutput => ErrorCode::EmptyOutput,
            Error::GenerationExhausted { .. } => ErrorCode::GenerationExhausted,

            Error::SpeechUnconfigured => ErrorCode::SpeechUnconfigured,
            Error::PlaybackFailed { .. } => ErrorCode::PlaybackFailed,

            Error::PersonaNotFound { .. } => ErrorCode::PersonaNotFound,
            Error::PersonaInvalid { .. } => ErrorCode::PersonaInvalid,

            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is worth another generation attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProviderRequest { .. }
                | Error::ProviderTimeout { .. }
                | Error::ProviderResponse { .. }
                | Error::MalformedOutput { .. }
                | Error::EmptyOutput
        )
    }

    /// Check if the error is fatal (process should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Config(_)
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'narrator config init' to create a default configuration file.",
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'narrator config validate' to see details.",
            ),
            Error::ConfigValidation { .. } | Error::Config(_) => Some(
                "Review the configuration file and fix the invalid values.",
            ),
            Error::ProviderRequest { .. } | Error::ProviderTimeout { .. } => Some(
                "Check the provider base_url and your network connection. Run 'narrator provider test'.",
            ),
            Error::ProviderUnconfigured(_) => Some(
                "Set provider.model_id (and provider.api_key for hosted APIs) in the configuration.",
            ),
            Error::SpeechUnconfigured => Some(
                "Set speech.enabled = true and a speech.default_language to hear commentary.",
            ),
            Error::PersonaNotFound { .. } => Some(
                "Run 'narrator personas list' to see the configured personas.",
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", self.code().as_str(), self);
        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }
        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn provider_request(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ProviderRequest {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Error::MalformedOutput {
            message: message.into(),
            raw: raw.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::MalformedOutput.as_str(), "E400");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigNotFound.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::ProviderRequest.exit_code(), 30);
        assert_eq!(ErrorCode::EmptyOutput.exit_code(), 40);
        assert_eq!(ErrorCode::PlaybackFailed.exit_code(), 50);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_generation_errors_are_retryable() {
        assert!(Error::malformed("eof", "{").is_retryable());
        assert!(Error::EmptyOutput.is_retryable());
        assert!(Error::provider_request("http://x", "refused").is_retryable());
        assert!(!Error::SpeechUnconfigured.is_retryable());
        assert!(!Error::config_not_found("/test").is_retryable());
    }

    #[test]
    fn test_serialization_error_is_internal() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(!err.is_retryable());
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[test]
    fn test_error_fatal() {
        assert!(Error::config_not_found("/test").is_fatal());
        assert!(Error::Config("bad".into()).is_fatal());
        assert!(!Error::EmptyOutput.is_fatal());
    }

    #[test]
    fn test_exhausted_display_names_persona() {
        let err = Error::GenerationExhausted {
            persona: "Ava".into(),
            attempts: 4,
            reason: "malformed output".into(),
        };
        let text = err.to_string();
        assert!(text.contains("Ava"));
        assert!(text.contains("4 attempts"));
        assert_eq!(err.code(), ErrorCode::GenerationExhausted);
    }

    #[test]
    fn test_format_for_terminal_and_log() {
        let err = Error::config_not_found("/test/narrator.toml");
        let terminal = err.format_for_terminal();
        assert!(terminal.contains("E100"));
        assert!(terminal.contains("\x1b[31m"));
        assert!(terminal.contains("Hint"));

        let log = err.format_for_log();
        assert!(log.contains("[E100]"));
        assert!(!log.contains("\x1b["));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert_eq!(err.code(), ErrorCode::IoNotFound);
    }
}
