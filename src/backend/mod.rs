//! Text generation backends
//!
//! The [`TextGenerator`] trait is the seam to the external text generation
//! service; [`OpenAiGenerator`] talks HTTP, [`MockGenerator`] replays a script.

mod mock;
mod openai;
mod traits;

pub use mock::{MockGenerator, MockReply};
pub use openai::OpenAiGenerator;
pub use traits::*;
