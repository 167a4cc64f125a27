//! Runtime persona state
//!
//! A [`Persona`] pairs its immutable settings with mutable per-session state
//! behind a mutex. The lock is never held across an await; generation works
//! on a [`TurnState`] copy that is committed back when the turn completes.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;

use crate::commentary::{ModelRotation, Phrase};
use crate::config::{CommentarySettings, PersonaSettings, MAX_PHRASE_DELAY_SECS};
use crate::speech::VoiceSelection;

use super::HistoryBuffer;

// ─────────────────────────────────────────────────────────────────
// Turn State
// ─────────────────────────────────────────────────────────────────

/// State a generation request reads and updates
#[derive(Debug, Clone, PartialEq)]
pub struct TurnState {
    pub history: HistoryBuffer,
    pub frequency_penalty: f32,
    pub rotation: ModelRotation,
    pub last_spoken_text: Option<String>,
}

impl TurnState {
    pub fn new(history_cap: usize, initial_penalty: f32) -> Self {
        Self {
            history: HistoryBuffer::new(history_cap),
            frequency_penalty: initial_penalty,
            rotation: ModelRotation::new(),
            last_spoken_text: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Persona
// ─────────────────────────────────────────────────────────────────

/// Whether a persona is waiting, generating, or speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaStatus {
    /// Waiting for phrases or for its next phrase time
    Idle,
    /// A speech job is in flight
    Busy,
}

impl fmt::Display for PersonaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersonaStatus::Idle => write!(f, "idle"),
            PersonaStatus::Busy => write!(f, "busy"),
        }
    }
}

#[derive(Debug)]
struct PersonaState {
    phrases: Vec<Phrase>,
    next_phrase_time: DateTime<Utc>,
    status: PersonaStatus,
    turn: TurnState,
}

/// A commentator voice with its own history and schedule
#[derive(Debug)]
pub struct Persona {
    settings: PersonaSettings,
    voice: RwLock<VoiceSelection>,
    initial_penalty: f32,
    state: Mutex<PersonaState>,
}

impl Persona {
    pub fn new(
        settings: PersonaSettings,
        commentary: &CommentarySettings,
        default_language: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let voice = VoiceSelection {
            voice: settings.voice.clone(),
            style: settings.voice_style.clone(),
            language: settings
                .voice_language
                .clone()
                .unwrap_or_else(|| default_language.to_string()),
        };

        Self {
            voice: RwLock::new(voice),
            initial_penalty: commentary.initial_penalty,
            state: Mutex::new(PersonaState {
                phrases: Vec::new(),
                next_phrase_time: now,
                status: PersonaStatus::Idle,
                turn: TurnState::new(commentary.history_cap, commentary.initial_penalty),
            }),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &PersonaSettings {
        &self.settings
    }

    pub fn voice(&self) -> VoiceSelection {
        self.voice.read().clone()
    }

    pub fn set_voice(&self, voice: VoiceSelection) {
        *self.voice.write() = voice;
    }

    pub fn status(&self) -> PersonaStatus {
        self.state.lock().status
    }

    pub fn next_phrase_time(&self) -> DateTime<Utc> {
        self.state.lock().next_phrase_time
    }

    pub fn last_spoken_text(&self) -> Option<String> {
        self.state.lock().turn.last_spoken_text.clone()
    }

    pub fn history(&self) -> Vec<String> {
        self.state.lock().turn.history.entries().to_vec()
    }

    pub fn frequency_penalty(&self) -> f32 {
        self.state.lock().turn.frequency_penalty
    }

    pub fn phrase_count(&self) -> usize {
        self.state.lock().phrases.len()
    }

    /// Whether any held phrase came from the game rather than another persona
    pub fn has_event_phrases(&self) -> bool {
        self.state.lock().phrases.iter().any(|p| p.origin.is_none())
    }

    /// Copy of the state a generation request would start from
    pub fn turn_state(&self) -> TurnState {
        self.state.lock().turn.clone()
    }

    /// Hand phrases to this persona
    pub fn push_phrases(&self, phrases: impl IntoIterator<Item = Phrase>) {
        self.state.lock().phrases.extend(phrases);
    }

    /// Start a turn if the persona is idle, due and has something to say.
    ///
    /// Phrases the persona produced itself are dropped. Drains the rest and
    /// marks the persona busy.
    pub fn try_begin_turn(&self, now: DateTime<Utc>) -> Option<(Vec<Phrase>, TurnState)> {
        let mut state = self.state.lock();
        if state.status == PersonaStatus::Busy || now < state.next_phrase_time {
            return None;
        }
        let name = self.settings.name.as_str();
        state.phrases.retain(|p| p.origin.as_deref() != Some(name));
        if state.phrases.is_empty() {
            return None;
        }
        state.status = PersonaStatus::Busy;
        let phrases = std::mem::take(&mut state.phrases);
        Some((phrases, state.turn.clone()))
    }

    /// Store the outcome of a generation request
    pub fn commit_turn(&self, turn: TurnState) {
        self.state.lock().turn = turn;
    }

    /// Go idle until `next_phrase_time`
    pub fn finish_turn(&self, next_phrase_time: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.status = PersonaStatus::Idle;
        state.next_phrase_time = next_phrase_time;
    }

    /// Random point in the persona's delay window after `now`
    pub fn pick_next_phrase_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let min = self.settings.phrase_delay_min_secs.min(MAX_PHRASE_DELAY_SECS);
        let max = self
            .settings
            .phrase_delay_max_secs
            .clamp(min, MAX_PHRASE_DELAY_SECS);
        let secs = rand::thread_rng().gen_range(min..=max);
        now + Duration::seconds(secs as i64)
    }

    /// Forget everything from the current session
    pub fn reset(&self, reasons: &[&str], now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.phrases.clear();
        state.next_phrase_time = now;
        state.status = PersonaStatus::Idle;

        let cap = state.turn.history.cap();
        state.turn = TurnState::new(cap, self.initial_penalty);
        state.turn.history.replace(reasons.iter().copied());
    }
}
