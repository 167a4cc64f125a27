//! Phrase pool shared by all personas
//!
//! Incoming event phrases land here and are handed to whichever persona the
//! scheduler picks next.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

/// A short event description awaiting commentary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    pub text: String,

    /// Larger is more important
    pub priority: i32,

    /// Name of the persona that produced the phrase, if any
    pub origin: Option<String>,

    /// Creation order
    pub sequence: u64,
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(f, "[{}] {} ({})", self.priority, self.text, origin),
            None => write!(f, "[{}] {}", self.priority, self.text),
        }
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    phrases: VecDeque<Phrase>,
    next_sequence: u64,
}

/// Insertion-ordered, de-duplicating phrase pool
#[derive(Debug, Default)]
pub struct PhraseAggregator {
    inner: Mutex<PoolInner>,
}

impl PhraseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a phrase unless one with the same text is already pooled.
    ///
    /// Returns `true` when the phrase was added.
    pub fn add(&self, text: impl Into<String>, priority: i32, origin: Option<&str>) -> bool {
        let text = text.into();
        let mut inner = self.inner.lock();
        if inner.phrases.iter().any(|p| p.text == text) {
            return false;
        }
        let phrase = Self::mint_locked(&mut inner, text, priority, origin);
        inner.phrases.push_back(phrase);
        true
    }

    /// Create a phrase with the next sequence number without pooling it
    pub fn mint(&self, text: impl Into<String>, priority: i32, origin: Option<&str>) -> Phrase {
        Self::mint_locked(&mut self.inner.lock(), text.into(), priority, origin)
    }

    fn mint_locked(inner: &mut PoolInner, text: String, priority: i32, origin: Option<&str>) -> Phrase {
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        Phrase {
            text,
            priority,
            origin: origin.map(str::to_string),
            sequence,
        }
    }

    /// Remove and return up to `n` of the oldest phrases
    pub fn transfer_first_n(&self, n: usize) -> Vec<Phrase> {
        let mut inner = self.inner.lock();
        let take = n.min(inner.phrases.len());
        inner.phrases.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().phrases.is_empty()
    }

    /// Texts currently pooled, oldest first
    pub fn texts(&self) -> Vec<String> {
        self.inner.lock().phrases.iter().map(|p| p.text.clone()).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().phrases.clear();
    }
}
