//! Commentary pipeline
//!
//! Phrases flow from the [`PhraseAggregator`] to personas picked by the
//! [`Scheduler`]; the [`GenerationEngine`] turns them into utterances that
//! the speech queue plays in order. [`CommentaryContext`] ties it together.

mod context;
mod engine;
mod penalty;
mod phrase;
pub mod prompt;
mod rotation;
mod scheduler;

pub use context::{CommentaryContext, RESET_REASON};
pub use engine::{
    FailureReason, GenerationEngine, GenerationOutcome, TurnRequest, RESTART_EVENT,
    RESTART_HISTORY,
};
pub use penalty::{levenshtein, PenaltyPolicy};
pub use phrase::{Phrase, PhraseAggregator};
pub use rotation::ModelRotation;
pub use scheduler::{select_next, Scheduler, REPLY_PRIORITY};
