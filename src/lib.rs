//! Narrator: persona-driven spoken commentary for a running game.
//!
//! Game events are pooled as phrases, handed to one persona at a time, turned
//! into short remarks by an OpenAI-compatible text generator and played back
//! strictly in order through a bounded speech queue.

pub mod backend;
pub mod commentary;
pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod persona;
pub mod speech;
pub mod telemetry;
pub mod version;

pub use config::NarratorConfig;
pub use error::{Error, Result};
