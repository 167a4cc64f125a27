//! Speech output trait definitions

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Voice chosen for a persona
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoiceSelection {
    /// Voice short name; empty lets the backend choose
    pub voice: String,
    pub style: String,
    /// Locale prefix such as "en" or "en-US"
    pub language: String,
}

/// Entry in a speech backend's voice catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Voice {
    pub short_name: String,
    pub display_name: String,
    pub locale_name: String,
}

/// Text ready to be spoken
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub persona: String,
    pub text: String,
    pub voice: VoiceSelection,
}

/// An opaque text-to-speech service
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether utterances can be produced at all
    fn is_configured(&self) -> bool {
        true
    }

    /// Speak and return once playback has finished
    async fn play(&self, utterance: &Utterance) -> Result<()>;

    /// Voices this backend offers
    async fn list_voices(&self) -> Result<Vec<Voice>>;
}

pub type SharedSpeech = Arc<dyn SpeechBackend>;
