//! Repetition scoring
//!
//! The penalty fed to the next generation call is derived from the edit
//! distance between a persona's previous and new utterance.

use crate::config::CommentarySettings;

/// Character-level Levenshtein distance
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Maps edit distance to a frequency penalty
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyPolicy {
    /// Distance at or below which the maximum penalty applies
    pub threshold: usize,
    pub max_penalty: f32,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            threshold: 30,
            max_penalty: 2.0,
        }
    }
}

impl From<&CommentarySettings> for PenaltyPolicy {
    fn from(settings: &CommentarySettings) -> Self {
        Self {
            threshold: settings.penalty_threshold,
            max_penalty: settings.max_penalty,
        }
    }
}

impl PenaltyPolicy {
    /// Penalty for saying `target` after `source`; 0 when either is missing
    pub fn penalty(&self, source: Option<&str>, target: Option<&str>) -> f32 {
        let (Some(source), Some(target)) = (source, target) else {
            return 0.0;
        };

        let distance = levenshtein(source, target);
        if distance <= self.threshold {
            return self.max_penalty;
        }

        let longest = source.chars().count().max(target.chars().count());
        // distance <= longest, and distance > threshold, so the span is positive
        let span = (longest - self.threshold) as f32;
        let scale = (distance - self.threshold) as f32 / span;
        (self.max_penalty * (1.0 - scale)).clamp(0.0, self.max_penalty)
    }

    pub fn is_max(&self, penalty: f32) -> bool {
        penalty >= self.max_penalty
    }
}
