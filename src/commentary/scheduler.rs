//! Persona hand-off
//!
//! After a persona finishes speaking the scheduler decides who goes next and
//! moves pooled phrases over to that persona.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::persona::Persona;

use super::phrase::PhraseAggregator;

/// Priority of the phrase carrying the previous speaker's words
pub const REPLY_PRIORITY: i32 = 3;

/// Pick the next persona index.
///
/// Personas scheduled in the future win, soonest first (ties go to roster
/// order). Otherwise the persona after `last` in roster order is chosen,
/// wrapping to the first; with no known last speaker the first persona goes.
pub fn select_next(
    next_times: &[DateTime<Utc>],
    last: Option<usize>,
    now: DateTime<Utc>,
) -> Option<usize> {
    if next_times.is_empty() {
        return None;
    }

    let soonest = next_times
        .iter()
        .enumerate()
        .filter(|(_, t)| **t > now)
        .min_by_key(|(i, t)| (**t, *i))
        .map(|(i, _)| i);

    Some(soonest.unwrap_or(match last {
        Some(i) if i + 1 < next_times.len() => i + 1,
        _ => 0,
    }))
}

/// Round-robin scheduler with a soonest-deadline override
#[derive(Debug, Default)]
pub struct Scheduler {
    last_speaker: Mutex<Option<usize>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roster index of the persona that spoke last
    pub fn last_speaker(&self) -> Option<usize> {
        *self.last_speaker.lock()
    }

    pub fn forget(&self) {
        *self.last_speaker.lock() = None;
    }

    /// Choose the next persona after `speaker` finished and hand it phrases.
    ///
    /// The chosen persona receives up to its phrase limit from the pool,
    /// followed by the previous speaker's last utterance so it can react.
    pub fn start_next_persona(
        &self,
        roster: &[Arc<Persona>],
        pool: &PhraseAggregator,
        speaker: Option<usize>,
        now: DateTime<Utc>,
    ) -> Option<Arc<Persona>> {
        if speaker.is_some() {
            *self.last_speaker.lock() = speaker;
        }
        let last = self.last_speaker();

        let times: Vec<DateTime<Utc>> = roster.iter().map(|p| p.next_phrase_time()).collect();
        let index = select_next(&times, last, now)?;
        let next = Arc::clone(&roster[index]);

        let mut phrases = pool.transfer_first_n(next.settings().phrases_limit);

        let reply = last
            .and_then(|i| roster.get(i))
            .and_then(|p| p.last_spoken_text().map(|text| (p.name().to_string(), text)))
            .filter(|(_, text)| !text.is_empty());
        if let Some((origin, text)) = reply {
            phrases.push(pool.mint(text, REPLY_PRIORITY, Some(&origin)));
        }

        debug!(
            persona = %next.name(),
            phrases = phrases.len(),
            pooled = pool.len(),
            "Handing off to next persona"
        );
        next.push_phrases(phrases);
        Some(next)
    }
}
