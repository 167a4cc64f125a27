//! Speech backends that print or record instead of synthesizing audio

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::SpeechSettings;
use crate::error::{Error, Result};

use super::{SpeechBackend, Utterance, Voice};

// ─────────────────────────────────────────────────────────────────
// Console
// ─────────────────────────────────────────────────────────────────

/// Writes each utterance to stdout as `[persona] text`
pub struct ConsoleSpeech {
    enabled: bool,
    words_per_minute: u32,
}

impl ConsoleSpeech {
    pub fn new(settings: &SpeechSettings) -> Self {
        Self {
            enabled: settings.is_configured(),
            words_per_minute: settings.words_per_minute,
        }
    }

    /// How long a human would take to say `text`
    fn speaking_time(&self, text: &str) -> Duration {
        if self.words_per_minute == 0 {
            return Duration::ZERO;
        }
        let words = text.split_whitespace().count() as u64;
        Duration::from_millis(words * 60_000 / u64::from(self.words_per_minute))
    }
}

#[async_trait]
impl SpeechBackend for ConsoleSpeech {
    fn name(&self) -> &str {
        "console"
    }

    fn is_configured(&self) -> bool {
        self.enabled
    }

    async fn play(&self, utterance: &Utterance) -> Result<()> {
        if !self.enabled {
            return Err(Error::SpeechUnconfigured);
        }
        {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "[{}] {}", utterance.persona, utterance.text)
                .and_then(|_| stdout.flush())
                .map_err(|e| Error::PlaybackFailed {
                    persona: utterance.persona.clone(),
                    message: e.to_string(),
                })?;
        }

        let pause = self.speaking_time(&utterance.text);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        Ok(())
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        Ok(Vec::new())
    }
}

// ─────────────────────────────────────────────────────────────────
// Recording
// ─────────────────────────────────────────────────────────────────

/// Keeps every played utterance in memory
#[derive(Default)]
pub struct RecordingSpeech {
    played: Mutex<Vec<Utterance>>,
    voices: Vec<Voice>,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer this voice catalog from `list_voices`
    pub fn with_voices(mut self, voices: Vec<Voice>) -> Self {
        self.voices = voices;
        self
    }

    pub fn played(&self) -> Vec<Utterance> {
        self.played.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.played.lock().iter().map(|u| u.text.clone()).collect()
    }
}

#[async_trait]
impl SpeechBackend for RecordingSpeech {
    fn name(&self) -> &str {
        "recording"
    }

    async fn play(&self, utterance: &Utterance) -> Result<()> {
        self.played.lock().push(utterance.clone());
        Ok(())
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        Ok(self.voices.clone())
    }
}
