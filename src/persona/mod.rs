//! Personas: commentator voices with their own history, penalty and schedule.

mod history;
mod types;

pub use history::HistoryBuffer;
pub use types::{Persona, PersonaStatus, TurnState};
