//! Generation engine
//!
//! Turns a persona's phrases plus game telemetry into one spoken line.
//! Every failure kind (malformed or empty output, repetition, collaborator
//! errors) draws from the same bounded retry budget.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{ChatMessage, GenerationRequest, ProviderUsage, SharedGenerator};
use crate::config::{CommentarySettings, PersonaSettings, ProviderSettings};
use crate::error::{Error, Result};
use crate::persona::TurnState;
use crate::telemetry::{TelemetrySnapshot, UNKNOWN_SETTING};

use super::penalty::PenaltyPolicy;
use super::prompt::{self, GameInput, PromptContext};

/// Activity and setting reported after the player went back to the start screen
pub const RESTART_EVENT: &str = "The player restarted the game";

/// History a persona starts over with after a restart
pub const RESTART_HISTORY: &str = "The Player restarted the game";

const SIMPLE_PROMPT_SYSTEM: &str = "You are a creative poet answering in 12 words or less.";

// ─────────────────────────────────────────────────────────────────
// Request / Outcome
// ─────────────────────────────────────────────────────────────────

/// Everything a turn needs besides the persona itself
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// Activity feed, oldest first
    pub phrases: Vec<String>,
    pub telemetry: TelemetrySnapshot,
    /// Names of the other personas in the roster
    pub other_personas: Vec<String>,
}

/// Why a request produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Malformed,
    Empty,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Malformed => write!(f, "malformed output"),
            FailureReason::Empty => write!(f, "empty output"),
        }
    }
}

/// Result of one top-level generation request
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// A fresh utterance
    Spoken { text: String, attempts: u32 },
    /// Still too close to the previous utterance when the budget ran out
    Repetitive { text: String, attempts: u32 },
    /// No usable output within the budget
    Exhausted { reason: FailureReason, attempts: u32 },
}

impl GenerationOutcome {
    /// Text to speak, if any
    pub fn utterance(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Spoken { text, .. } | GenerationOutcome::Repetitive { text, .. } => {
                Some(text)
            }
            GenerationOutcome::Exhausted { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            GenerationOutcome::Spoken { attempts, .. }
            | GenerationOutcome::Repetitive { attempts, .. }
            | GenerationOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The error to report when `persona` ran out of attempts
    pub fn exhausted_error(&self, persona: &str) -> Option<Error> {
        match self {
            GenerationOutcome::Exhausted { reason, attempts } => Some(Error::GenerationExhausted {
                persona: persona.to_string(),
                attempts: *attempts,
                reason: reason.to_string(),
            }),
            _ => None,
        }
    }
}

enum Attempt {
    Fresh(String),
    Repetitive(String),
}

// ─────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────

/// Drives the text generator on behalf of personas
pub struct GenerationEngine {
    generator: SharedGenerator,
    provider: ProviderSettings,
    policy: CommentarySettings,
    penalty: PenaltyPolicy,
    usage: Arc<ProviderUsage>,
}

impl GenerationEngine {
    pub fn new(
        generator: SharedGenerator,
        provider: ProviderSettings,
        policy: CommentarySettings,
    ) -> Self {
        Self {
            penalty: PenaltyPolicy::from(&policy),
            generator,
            provider,
            policy,
            usage: Arc::new(ProviderUsage::new()),
        }
    }

    pub fn usage(&self) -> &Arc<ProviderUsage> {
        &self.usage
    }

    pub fn provider(&self) -> &ProviderSettings {
        &self.provider
    }

    /// Produce one utterance for `persona`, updating `turn` along the way.
    ///
    /// Collaborator failures that survive the retry budget are returned as
    /// errors; unusable model output is reported as
    /// [`GenerationOutcome::Exhausted`].
    pub async fn evaluate(
        &self,
        persona: &PersonaSettings,
        turn: &mut TurnState,
        request: &TurnRequest,
    ) -> Result<GenerationOutcome> {
        let max_retries = self.policy.max_retries;
        let mut retry: u32 = 0;
        let mut retry_reason: Option<String> = None;

        loop {
            let attempts = retry + 1;
            let can_retry = retry < max_retries;

            let result = self
                .attempt(persona, turn, request, attempts, retry_reason.as_deref())
                .await;

            let failure = match result {
                Ok(Attempt::Fresh(text)) => {
                    turn.last_spoken_text = Some(text.clone());
                    return Ok(GenerationOutcome::Spoken { text, attempts });
                }
                Ok(Attempt::Repetitive(text)) => {
                    if !can_retry {
                        warn!(
                            persona = %persona.name,
                            attempts,
                            "Accepting repetitive output after exhausting retries"
                        );
                        turn.last_spoken_text = Some(text.clone());
                        return Ok(GenerationOutcome::Repetitive { text, attempts });
                    }
                    "repetitive".to_string()
                }
                Err(e @ (Error::MalformedOutput { .. } | Error::EmptyOutput)) => {
                    if !can_retry {
                        let reason = if matches!(e, Error::EmptyOutput) {
                            FailureReason::Empty
                        } else {
                            FailureReason::Malformed
                        };
                        warn!(
                            persona = %persona.name,
                            attempts,
                            %reason,
                            error = %e,
                            "Giving up on generation"
                        );
                        return Ok(GenerationOutcome::Exhausted { reason, attempts });
                    }
                    e.to_string()
                }
                Err(e) => {
                    if !(can_retry && e.is_retryable()) {
                        return Err(e);
                    }
                    e.to_string()
                }
            };

            debug!(persona = %persona.name, attempt = attempts, reason = %failure, "Retrying generation");
            retry_reason = Some(failure);
            retry += 1;
        }
    }

    async fn attempt(
        &self,
        persona: &PersonaSettings,
        turn: &mut TurnState,
        request: &TurnRequest,
        attempt: u32,
        retry_reason: Option<&str>,
    ) -> Result<Attempt> {
        let telemetry = &request.telemetry;
        let mut input = GameInput {
            activity_feed: request.phrases.clone(),
            previous_historical_key_events: Vec::new(),
            last_spoken_text: turn.last_spoken_text.clone(),
            colony_roster: telemetry.colony_roster.clone(),
            colony_setting: telemetry.colony_setting.clone(),
            current_window: telemetry.session.window_description(),
            research_summary: telemetry.research_summary.clone(),
            resource_data: telemetry.resource_data.clone(),
            rooms_summary: telemetry.rooms_summary.clone(),
            energy_summary: telemetry.energy_summary.clone(),
        };

        let at_start_screen = telemetry.session.is_start_screen();
        if at_start_screen && telemetry.colony_setting != UNKNOWN_SETTING {
            if !input.activity_feed.is_empty() {
                input.activity_feed = vec![RESTART_EVENT.to_string()];
            }
            input.colony_setting = RESTART_EVENT.to_string();
            input.colony_roster.clear();
            input.research_summary.clear();
            input.resource_data.clear();
            input.rooms_summary.clear();
            input.energy_summary.clear();
            turn.history.replace([RESTART_HISTORY]);
        }

        let ctx = PromptContext {
            other_personas: &request.other_personas,
            player_name: telemetry.player_name.as_deref(),
        };
        let mut system = prompt::system_prompt(persona, &ctx);
        if turn.frequency_penalty > 1.0 {
            system.push_str(&prompt::repetition_addendum(turn.last_spoken_text.as_deref()));
            turn.history.push(prompt::REPETITION_HISTORY_NOTE);
        }

        if turn.history.needs_compaction() {
            self.compact(persona, turn).await?;
        }

        input.previous_historical_key_events = turn.history.entries().to_vec();
        let input_json = serde_json::to_string(&input)?;

        let model = turn.rotation.next_model(&self.provider);
        let json_mode = self.supports_json_mode(&model);

        info!(
            persona = %persona.name,
            attempt,
            reason = retry_reason.unwrap_or("-"),
            penalty = turn.frequency_penalty,
            model = %model,
            feed = input.activity_feed.len(),
            "Prompting"
        );
        debug!(persona = %persona.name, input = %input_json, "Game input");

        let generation = GenerationRequest {
            model,
            messages: vec![ChatMessage::system(system), ChatMessage::user(input_json)],
            frequency_penalty: Some(turn.frequency_penalty),
            presence_penalty: Some(turn.frequency_penalty),
            temperature: Some(self.policy.temperature),
            json_mode,
        };
        let raw = self.call(&generation).await?;

        let output = prompt::parse_output(&prompt::repair_output(&raw))?;
        // A reply without key events clears the history
        if !at_start_screen {
            turn.history.replace(output.key_events().iter().cloned());
        }

        let text = prompt::clean_response(output.text(), &persona.name);
        if text.is_empty() {
            return Err(Error::EmptyOutput);
        }

        let penalty = self
            .penalty
            .penalty(turn.last_spoken_text.as_deref(), Some(&text));
        turn.frequency_penalty = penalty;

        debug!(persona = %persona.name, penalty, text = %text, "Model replied");

        if self.penalty.is_max(penalty) {
            Ok(Attempt::Repetitive(text))
        } else {
            Ok(Attempt::Fresh(text))
        }
    }

    /// Condense an overgrown history with one extra call on the secondary model
    async fn compact(&self, persona: &PersonaSettings, turn: &mut TurnState) -> Result<()> {
        let before = turn.history.len();
        let (system, user) = prompt::compaction_prompt(&persona.personality, turn.history.entries());

        turn.rotation.force_secondary(&self.provider);
        let request = GenerationRequest {
            model: turn.rotation.next_model(&self.provider),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: Some(self.policy.temperature),
            ..Default::default()
        };

        let summary = self.call(&request).await?;
        turn.history.replace_with_summary(&summary);

        info!(
            persona = %persona.name,
            before,
            after = turn.history.len(),
            "History compacted"
        );
        Ok(())
    }

    /// One-shot prompt used to check that the provider answers at all
    pub async fn simple_prompt(&self, input: &str) -> Result<String> {
        let request = GenerationRequest {
            model: self.provider.model_id.clone(),
            messages: vec![
                ChatMessage::system(SIMPLE_PROMPT_SYSTEM),
                ChatMessage::user(input),
            ],
            temperature: Some(self.policy.temperature),
            ..Default::default()
        };

        let raw = self.call(&request).await?;
        let text = raw.trim();
        if text.is_empty() {
            return Err(Error::EmptyOutput);
        }
        Ok(text.to_string())
    }

    fn supports_json_mode(&self, model: &str) -> bool {
        self.provider
            .json_mode_markers
            .iter()
            .any(|marker| !marker.is_empty() && model.contains(marker.as_str()))
    }

    async fn call(&self, request: &GenerationRequest) -> Result<String> {
        self.usage.record_sent(request.prompt_chars());
        let raw = self.generator.generate(request).await?;
        self.usage.record_received(raw.chars().count() as u64);
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockGenerator, MockReply, Role};
    use crate::telemetry::SessionState;

    const EARLIER: &str = "The colonists gathered around the campfire and told stories of home.";

    fn engine(mock: Arc<MockGenerator>) -> GenerationEngine {
        GenerationEngine::new(mock, ProviderSettings::default(), CommentarySettings::default())
    }

    fn persona() -> PersonaSettings {
        PersonaSettings {
            name: "Bard".into(),
            ..Default::default()
        }
    }

    fn turn() -> TurnState {
        TurnState::new(5, 0.5)
    }

    fn request(phrases: &[&str]) -> TurnRequest {
        TurnRequest {
            phrases: phrases.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn user_input(req: &GenerationRequest) -> serde_json::Value {
        let user = req.messages.iter().find(|m| m.role == Role::User).unwrap();
        serde_json::from_str(&user.content).unwrap()
    }

    #[tokio::test]
    async fn test_well_formed_response() {
        let mock = Arc::new(MockGenerator::new([MockReply::response("hello", &["a", "b"])]));
        let engine = engine(mock.clone());
        let mut turn = turn();

        let outcome = engine
            .evaluate(&persona(), &mut turn, &request(&["A raid started"]))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            GenerationOutcome::Spoken {
                text: "hello".into(),
                attempts: 1
            }
        );
        assert_eq!(turn.history.entries(), &["a", "b"]);
        assert_eq!(turn.last_spoken_text.as_deref(), Some("hello"));
        assert_eq!(user_input(&mock.requests()[0])["ActivityFeed"][0], "A raid started");
    }

    #[tokio::test]
    async fn test_prose_reply_clears_history() {
        let mock = Arc::new(MockGenerator::new([MockReply::text("Just prose, no json.")]));
        let engine = engine(mock);
        let mut turn = turn();
        turn.history.replace(["old1", "old2"]);

        let outcome = engine.evaluate(&persona(), &mut turn, &request(&["x"])).await.unwrap();

        assert_eq!(outcome.utterance(), Some("Just prose, no json."));
        assert!(turn.history.is_empty());
    }

    #[tokio::test]
    async fn test_reply_without_key_events_clears_history() {
        let mock = Arc::new(MockGenerator::new([MockReply::text(r#"{"ResponseText":"hi there"}"#)]));
        let engine = engine(mock);
        let mut turn = turn();
        turn.history.replace(["old1", "old2"]);

        let outcome = engine.evaluate(&persona(), &mut turn, &request(&["x"])).await.unwrap();

        assert_eq!(outcome.utterance(), Some("hi there"));
        assert!(turn.history.is_empty());
    }

    #[tokio::test]
    async fn test_persistent_malformed_output_exhausts_budget() {
        let mock = Arc::new(MockGenerator::always(MockReply::text("{ not json")));
        let engine = engine(mock.clone());
        let mut turn = turn();

        let outcome = engine.evaluate(&persona(), &mut turn, &request(&["x"])).await.unwrap();

        assert_eq!(
            outcome,
            GenerationOutcome::Exhausted {
                reason: FailureReason::Malformed,
                attempts: 4
            }
        );
        assert!(outcome.utterance().is_none());
        assert_eq!(mock.call_count(), 4);

        let err = outcome.exhausted_error("Ava").unwrap();
        assert!(matches!(err, Error::GenerationExhausted { attempts: 4, .. }));
        assert!(err.to_string().contains("Ava"));
    }

    #[tokio::test]
    async fn test_mixed_failures_share_budget() {
        let mock = Arc::new(MockGenerator::new([
            MockReply::text("   "),
            MockReply::Fail("connection reset".into()),
            MockReply::text("{\"ResponseText\": "),
            MockReply::response("Finally.", &[]),
        ]));
        let engine = engine(mock.clone());
        let mut turn = turn();

        let outcome = engine.evaluate(&persona(), &mut turn, &request(&["x"])).await.unwrap();
        assert_eq!(outcome.utterance(), Some("Finally."));
        assert_eq!(outcome.attempts(), 4);
        assert!(outcome.exhausted_error("Ava").is_none());
    }

    #[tokio::test]
    async fn test_empty_output_exhausts_as_empty() {
        let mock = Arc::new(MockGenerator::always(MockReply::response("  \"\"  ", &[])));
        let engine = engine(mock.clone());
        let mut turn = turn();

        let outcome = engine.evaluate(&persona(), &mut turn, &request(&["x"])).await.unwrap();
        assert_eq!(
            outcome,
            GenerationOutcome::Exhausted {
                reason: FailureReason::Empty,
                attempts: 4
            }
        );
    }

    #[tokio::test]
    async fn test_collaborator_failure_surfaces_after_budget() {
        let mock = Arc::new(MockGenerator::always(MockReply::Fail("down".into())));
        let engine = engine(mock.clone());
        let mut turn = turn();

        let err = engine.evaluate(&persona(), &mut turn, &request(&["x"])).await.unwrap_err();
        assert!(matches!(err, Error::ProviderRequest { .. }));
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_overgrown_history_compacted_once_before_main_call() {
        let mock = Arc::new(MockGenerator::new([
            MockReply::text("raid repelled, crops failed"),
            MockReply::response("Quite the season.", &["a quiet winter"]),
        ]));
        let engine = engine(mock.clone());
        let mut turn = turn();
        turn.history.replace(["e1", "e2", "e3", "e4", "e5", "e6"]);

        let outcome = engine.evaluate(&persona(), &mut turn, &request(&["x"])).await.unwrap();
        assert_eq!(outcome.utterance(), Some("Quite the season."));

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].messages[0].content.contains("adversarial"));
        assert!(requests[0].messages[1].content.contains("e6"));
        assert!(!requests[0].json_mode);

        let sent_history = user_input(&requests[1])["PreviousHistoricalKeyEvents"].clone();
        assert_eq!(sent_history, serde_json::json!(["raid repelled", "crops failed"]));
        assert!(turn.history.len() < 6);
    }

    #[tokio::test]
    async fn test_compaction_uses_secondary_model() {
        let mock = Arc::new(MockGenerator::new([
            MockReply::text("summary"),
            MockReply::response("Fine.", &[]),
        ]));
        let provider = ProviderSettings {
            model_id: "small".into(),
            secondary_model_id: "large".into(),
            use_secondary_model: true,
            model_switch_ratio: 10,
            ..Default::default()
        };
        let engine = GenerationEngine::new(mock.clone(), provider, CommentarySettings::default());
        let mut turn = turn();
        turn.history.replace(["1", "2", "3", "4", "5", "6"]);

        engine.evaluate(&persona(), &mut turn, &request(&["x"])).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].model, "large");
        assert_eq!(requests[1].model, "small");
    }

    #[tokio::test]
    async fn test_repetition_retried_then_accepted() {
        let mock = Arc::new(MockGenerator::always(MockReply::response(EARLIER, &[])));
        let engine = engine(mock.clone());
        let mut turn = turn();
        turn.last_spoken_text = Some(EARLIER.to_string());

        let outcome = engine.evaluate(&persona(), &mut turn, &request(&["x"])).await.unwrap();

        assert_eq!(
            outcome,
            GenerationOutcome::Repetitive {
                text: EARLIER.into(),
                attempts: 4
            }
        );
        assert_eq!(turn.frequency_penalty, 2.0);

        let requests = mock.requests();
        assert!(!requests[0].messages[0].content.contains(prompt::REPETITION_NOTE));
        assert!(requests[1].messages[0].content.contains(prompt::REPETITION_NOTE));
        assert!(requests[1].messages[0].content.contains("Avoid talking about anything related to"));
        assert_eq!(requests[1].frequency_penalty, Some(2.0));
    }

    #[tokio::test]
    async fn test_fresh_text_after_repetition() {
        let mock = Arc::new(MockGenerator::new([
            MockReply::response(EARLIER, &[]),
            MockReply::response("A mechanoid cluster landed beside the freezer, which is new.", &[]),
        ]));
        let engine = engine(mock.clone());
        let mut turn = turn();
        turn.last_spoken_text = Some(EARLIER.to_string());

        let outcome = engine.evaluate(&persona(), &mut turn, &request(&["x"])).await.unwrap();
        assert!(matches!(outcome, GenerationOutcome::Spoken { attempts: 2, .. }));
        assert!(turn.frequency_penalty < 2.0);
    }

    #[tokio::test]
    async fn test_start_screen_resets_input_and_history() {
        let mock = Arc::new(MockGenerator::new([MockReply::response("Back again?", &["ignored"])]));
        let engine = engine(mock.clone());
        let mut turn = turn();
        turn.history.replace(["built a wall"]);

        let mut req = request(&["Menu opened"]);
        req.telemetry.session = SessionState::StartScreen;
        req.telemetry.colony_setting = "A boreal forest".into();
        req.telemetry.colony_roster = vec!["Dorian".into()];

        engine.evaluate(&persona(), &mut turn, &req).await.unwrap();

        let input = user_input(&mock.requests()[0]);
        assert_eq!(input["ActivityFeed"], serde_json::json!([RESTART_EVENT]));
        assert_eq!(input["ColonySetting"], RESTART_EVENT);
        assert_eq!(input["ColonyRoster"], serde_json::json!([]));
        assert_eq!(input["CurrentWindow"], "The player is at the start screen");
        assert_eq!(turn.history.entries(), &[RESTART_HISTORY]);
    }

    #[tokio::test]
    async fn test_start_screen_without_game_data_is_untouched() {
        let mock = Arc::new(MockGenerator::new([MockReply::response("Welcome.", &["hello"])]));
        let engine = engine(mock.clone());
        let mut turn = turn();

        let mut req = request(&["Menu opened"]);
        req.telemetry.session = SessionState::StartScreen;

        engine.evaluate(&persona(), &mut turn, &req).await.unwrap();

        let input = user_input(&mock.requests()[0]);
        assert_eq!(input["ActivityFeed"][0], "Menu opened");
        assert!(turn.history.is_empty(), "history is not replaced at the start screen");
    }

    #[tokio::test]
    async fn test_json_mode_for_marked_models() {
        let mock = Arc::new(MockGenerator::always(MockReply::response("ok", &[])));
        let provider = ProviderSettings {
            model_id: "gpt-3.5-turbo-1106".into(),
            ..Default::default()
        };
        let marked = GenerationEngine::new(mock.clone(), provider, CommentarySettings::default());
        marked.evaluate(&persona(), &mut turn(), &request(&["x"])).await.unwrap();
        assert!(mock.requests()[0].json_mode);

        let plain = Arc::new(MockGenerator::always(MockReply::response("ok", &[])));
        let unmarked = engine(plain.clone());
        unmarked.evaluate(&persona(), &mut turn(), &request(&["x"])).await.unwrap();
        assert!(!plain.requests()[0].json_mode);
    }

    #[tokio::test]
    async fn test_usage_accounting() {
        let reply = MockReply::response("counted", &[]);
        let raw_len = match &reply {
            MockReply::Text(t) => t.chars().count() as u64,
            MockReply::Fail(_) => unreachable!(),
        };
        let mock = Arc::new(MockGenerator::always(reply));
        let engine = engine(mock.clone());

        engine.evaluate(&persona(), &mut turn(), &request(&["x"])).await.unwrap();

        assert_eq!(engine.usage().characters_sent(), mock.requests()[0].prompt_chars());
        assert_eq!(engine.usage().characters_received(), raw_len);
    }

    #[tokio::test]
    async fn test_simple_prompt() {
        let mock = Arc::new(MockGenerator::always(MockReply::text("  Hello, brave colonist!  ")));
        let engine = engine(mock.clone());

        let reply = engine.simple_prompt("Greet them").await.unwrap();
        assert_eq!(reply, "Hello, brave colonist!");
        assert_eq!(mock.requests()[0].messages[0].content, SIMPLE_PROMPT_SYSTEM);
    }
}
