//! Prompt assembly and model output parsing
//!
//! The model receives a JSON object describing the game and answers with a
//! two-field JSON object. Models frequently wrap that object in prose or
//! code fences, so the raw text is repaired before parsing.

use serde::{Deserialize, Serialize};

use crate::config::PersonaSettings;
use crate::error::{Error, Result};

/// Marker replaced with the player's name inside a personality
pub const PLAYER_NAME_MARKER: &str = "PLAYERNAME";

/// Instruction appended to the system prompt when the persona repeats itself
pub const REPETITION_NOTE: &str =
    "NOTE: your responses are too repetitive, make some new commentary based on the information you have.";

/// History entry recorded when the persona was told to stop repeating itself
pub const REPETITION_HISTORY_NOTE: &str =
    "The narrator was told its commentary had become repetitive.";

// ─────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────

/// Game state sent as the user message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameInput {
    pub activity_feed: Vec<String>,
    pub previous_historical_key_events: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_spoken_text: Option<String>,
    pub colony_roster: Vec<String>,
    pub colony_setting: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_window: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub research_summary: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub resource_data: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rooms_summary: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub energy_summary: String,
}

/// Object the model is asked to return
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    #[serde(rename = "ResponseText", default)]
    pub response_text: Option<String>,
    #[serde(rename = "NewHistoricalKeyEvents", default)]
    pub new_historical_key_events: Option<Vec<String>>,
}

impl ModelOutput {
    pub fn text(&self) -> &str {
        self.response_text.as_deref().unwrap_or_default()
    }

    pub fn key_events(&self) -> &[String] {
        self.new_historical_key_events.as_deref().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────
// System prompt
// ─────────────────────────────────────────────────────────────────

/// Who else is in the room when the prompt is built
#[derive(Debug, Clone, Default)]
pub struct PromptContext<'a> {
    pub other_personas: &'a [String],
    pub player_name: Option<&'a str>,
}

/// Build the persona's system prompt
pub fn system_prompt(persona: &PersonaSettings, ctx: &PromptContext<'_>) -> String {
    let player = ctx.player_name.filter(|n| !n.is_empty()).unwrap_or("the player");
    let personality = persona.personality.replace(PLAYER_NAME_MARKER, player);

    let style_line = if persona.is_chronicler {
        "Unless otherwise specified, balance major events and subtle details and express them in your unique style."
    } else {
        "Unless otherwise specified, interact reflecting your unique personality, using an improvisational approach based on your background, current situation and others' actions."
    };

    let observers = if ctx.other_personas.is_empty() {
        format!("You are watching {} play the game.", player)
    } else {
        format!(
            "You are watching {} play the game together with these other observers: {}.",
            player,
            ctx.other_personas.join(", ")
        )
    };

    let example_input = serde_json::json!({
        "ActivityFeed": ["Dorian is eating", "A raid has started"],
        "PreviousHistoricalKeyEvents": ["The colony survived its first winter"],
        "ColonySetting": "A small colony in a temperate forest",
    });
    let example_output = serde_json::json!({
        "ResponseText": "Lunch during a raid, Dorian? Bold choice.",
        "NewHistoricalKeyEvents": ["A raid started while Dorian was eating"],
    });

    [
        format!("You are {}.", persona.name),
        style_line.to_string(),
        observers,
        format!("Your role/personality is: {}", personality),
        format!("Example input: {}", example_input),
        format!("Example output: {}", example_output),
        format!(
            "Limit ResponseText to no more than {} words.",
            persona.phrase_max_word_count
        ),
        format!(
            "Limit NewHistoricalKeyEvents to no more than {} words.",
            persona.history_max_word_count
        ),
        "Prioritize the ActivityFeed first and the additional information second.".to_string(),
        "The events in ActivityFeed are in chronological order and are the most recent; PreviousHistoricalKeyEvents happened before them.".to_string(),
        "Remember: your output MUST be valid JSON and 'NewHistoricalKeyEvents' MUST ONLY contain simple text entries, each a short summary of a key event.".to_string(),
    ]
    .join("\n")
}

/// Extra system prompt lines for a persona that keeps repeating itself
pub fn repetition_addendum(last_spoken: Option<&str>) -> String {
    match last_spoken.filter(|s| !s.is_empty()) {
        Some(text) => format!(
            "\n{}\nAvoid talking about anything related to: {}",
            REPETITION_NOTE, text
        ),
        None => format!("\n{}", REPETITION_NOTE),
    }
}

/// System and user prompt for condensing a persona's history
pub fn compaction_prompt(personality: &str, history: &[String]) -> (String, String) {
    let system = format!(
        "You are an adversarial system that cleans up a list of history entries, aiming to remove repetition and keep the narrative fresh for the following character: {}",
        personality
    );
    let user = format!(
        "Summarize the following events into one concise sentence, focusing on outliers to reduce fixation on the most prominent themes: {}",
        history.join("\n ")
    );
    (system, user)
}

// ─────────────────────────────────────────────────────────────────
// Output repair
// ─────────────────────────────────────────────────────────────────

/// Cut the JSON object out of whatever the model wrapped around it
pub fn repair_output(raw: &str) -> String {
    let trimmed = raw.trim();
    let sliced = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };
    sliced.replace("ResponseText:", "")
}

/// Parse repaired output.
///
/// Text that is not an object at all is taken as the spoken text with no
/// key events; an object that fails to parse is malformed.
pub fn parse_output(repaired: &str) -> Result<ModelOutput> {
    let repaired = repaired.trim();
    if repaired.is_empty() {
        return Err(Error::EmptyOutput);
    }
    if !repaired.starts_with('{') {
        return Ok(ModelOutput {
            response_text: Some(repaired.to_string()),
            new_historical_key_events: Some(Vec::new()),
        });
    }
    serde_json::from_str(repaired)
        .map_err(|e| Error::malformed(format!("invalid response object: {}", e), repaired))
}

/// Normalize spoken text: trim, drop wrapping quotes and a speaker label,
/// collapse whitespace
pub fn clean_response(text: &str, persona_name: &str) -> String {
    let mut text = text.trim();

    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        let wrapped = text.len() >= open.len_utf8() + close.len_utf8()
            && text.starts_with(open)
            && text.ends_with(close);
        if wrapped {
            text = text[open.len_utf8()..text.len() - close.len_utf8()].trim();
        }
    }

    if let Some(rest) = text.strip_prefix(persona_name) {
        if let Some(rest) = rest.trim_start().strip_prefix(':') {
            text = rest.trim();
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
