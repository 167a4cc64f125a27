//! Speech output
//!
//! [`SpeechQueue`] serializes playback of generated utterances through a
//! [`SpeechBackend`].

mod console;
mod queue;
mod traits;
pub mod voices;

pub use console::{ConsoleSpeech, RecordingSpeech};
pub use queue::{DoneCallback, ErrorCallback, JobId, JobState, JobTicket, SpeechQueue};
pub use traits::*;
