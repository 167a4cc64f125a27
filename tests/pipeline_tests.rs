//! Commentary pipeline integration tests
//!
//! Drives a full session (pool, scheduler, generation, speech queue) against
//! a scripted generator and a recording speech backend, with tokio's clock
//! paused so hand-offs and playback polling run deterministically.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use narrator::backend::{MockGenerator, MockReply};
use narrator::commentary::RESET_REASON;
use narrator::persona::PersonaStatus;
use narrator::speech::RecordingSpeech;
use narrator::telemetry::{SessionState, StaticTelemetry};

use common::{roster_config, session};

// ─────────────────────────────────────────────────────────────────
// Turn Taking
// ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_personas_take_turns_and_reply_to_each_other() {
    let mut config = roster_config(&["Ava", "Bo"]);
    config.commentary.tick_interval_ms = 100;

    let mock = Arc::new(MockGenerator::new([
        MockReply::response("Raiders approach from the north.", &["raid from the north"]),
        MockReply::response("Oh, this is going to be a brawl!", &["Bo expects a brawl"]),
    ]));
    let ctx = session(&config, mock.clone(), Arc::new(StaticTelemetry::default()));
    let speech = Arc::new(RecordingSpeech::new());
    let cancel = CancellationToken::new();

    ctx.add_phrase("A raid has started", 5, None);
    let handles = ctx.spawn(speech.clone(), cancel.clone());

    tokio::time::sleep(Duration::from_secs(5)).await;

    let played = speech.played();
    assert_eq!(played.len(), 2);
    assert_eq!(played[0].persona, "Ava");
    assert_eq!(played[0].text, "Raiders approach from the north.");
    assert_eq!(played[1].persona, "Bo");
    assert_eq!(played[1].text, "Oh, this is going to be a brawl!");

    // Bo's request carried Ava's utterance as a reply phrase
    let requests = mock.requests();
    assert!(requests[1]
        .messages
        .iter()
        .any(|m| m.content.contains("Raiders approach from the north.")));

    assert_eq!(ctx.persona("Ava").unwrap().history(), ["raid from the north"]);
    assert_eq!(ctx.persona("Bo").unwrap().history(), ["Bo expects a brawl"]);

    cancel.cancel();
    for handle in handles {
        assert_ok!(handle.await);
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_persona_does_not_reply_to_itself() {
    let mut config = roster_config(&["Ava"]);
    config.commentary.tick_interval_ms = 100;

    let mock = Arc::new(MockGenerator::always(MockReply::response(
        "The harvest is in.",
        &["harvest done"],
    )));
    let ctx = session(&config, mock.clone(), Arc::new(StaticTelemetry::default()));
    let speech = Arc::new(RecordingSpeech::new());
    let cancel = CancellationToken::new();

    ctx.add_phrase("Harvest finished", 0, None);
    let handles = ctx.spawn(speech.clone(), cancel.clone());

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(speech.texts(), ["The harvest is in."]);
    assert_eq!(mock.call_count(), 1);
    assert!(ctx.is_drained());

    cancel.cancel();
    for handle in handles {
        assert_ok!(handle.await);
    }
}

// ─────────────────────────────────────────────────────────────────
// Queue Back-Pressure
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_queue_rejects_and_hands_off() {
    let mut config = roster_config(&["Ava", "Bo"]);
    config.commentary.queue_capacity = 1;

    let mock = Arc::new(
        MockGenerator::always(MockReply::response("Still thinking.", &[]))
            .with_latency(Duration::from_secs(60)),
    );
    let ctx = session(&config, mock.clone(), Arc::new(StaticTelemetry::default()));

    ctx.add_phrase("first event", 0, None);
    assert_eq!(ctx.tick(Utc::now()), 1);
    assert_eq!(ctx.queue().len(), 1);
    assert!(ctx.queue().is_full());

    let bo = ctx.persona("Bo").unwrap();
    bo.push_phrases([ctx.pool().mint("second event", 0, None)]);
    ctx.tick(Utc::now());

    // Rejected job: Bo never went busy and nothing new was queued
    assert_eq!(bo.status(), PersonaStatus::Idle);
    assert_eq!(bo.phrase_count(), 0);
    assert_eq!(ctx.queue().len(), 1);
    assert_eq!(ctx.persona("Ava").unwrap().status(), PersonaStatus::Busy);
}

#[tokio::test]
async fn test_disabled_speech_generates_nothing() {
    let mut config = roster_config(&["Ava"]);
    config.speech.enabled = false;

    let mock = Arc::new(MockGenerator::always(MockReply::response("Unheard.", &[])));
    let ctx = session(&config, mock.clone(), Arc::new(StaticTelemetry::default()));

    ctx.add_phrase("event", 0, None);
    ctx.tick(Utc::now());
    tokio::task::yield_now().await;

    assert_eq!(mock.call_count(), 0);
    assert!(ctx.queue().is_empty());
    assert!(ctx.is_drained());
}

// ─────────────────────────────────────────────────────────────────
// Session Reset
// ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_reset_mid_generation_speaks_nothing() {
    let mut config = roster_config(&["Ava", "Bo"]);
    config.commentary.tick_interval_ms = 100;

    let mock = Arc::new(
        MockGenerator::always(MockReply::response("From the old session.", &["old"]))
            .with_latency(Duration::from_secs(1)),
    );
    let ctx = session(&config, mock.clone(), Arc::new(StaticTelemetry::default()));
    let speech = Arc::new(RecordingSpeech::new());
    let cancel = CancellationToken::new();

    ctx.add_phrase("event one", 0, None);
    ctx.add_phrase("event two", 0, None);
    let handles = ctx.spawn(speech.clone(), cancel.clone());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(mock.call_count(), 1);

    ctx.reset(&[RESET_REASON]);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(speech.texts().is_empty());
    assert!(ctx.pool().is_empty());
    assert!(ctx.queue().is_empty());
    for persona in ctx.roster() {
        assert_eq!(persona.status(), PersonaStatus::Idle);
        assert_eq!(persona.history(), [RESET_REASON]);
        assert!(persona.last_spoken_text().is_none());
    }

    cancel.cancel();
    for handle in handles {
        assert_ok!(handle.await);
    }
}

// ─────────────────────────────────────────────────────────────────
// Telemetry
// ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_prompt_carries_player_window_and_setting() {
    let mut config = roster_config(&["Ava"]);
    config.commentary.tick_interval_ms = 100;

    let telemetry = Arc::new(StaticTelemetry::default());
    telemetry.update(|t| {
        t.session = SessionState::Dialog("Research".into());
        t.colony_setting = "Temperate forest".into();
        t.colony_roster = vec!["Dorian".into()];
    });

    let mock = Arc::new(MockGenerator::always(MockReply::response("Science!", &[])));
    let ctx = session(&config, mock.clone(), telemetry);
    let speech = Arc::new(RecordingSpeech::new());
    let cancel = CancellationToken::new();

    ctx.add_phrase("Research project completed", 1, None);
    let handles = ctx.spawn(speech.clone(), cancel.clone());
    tokio::time::sleep(Duration::from_secs(2)).await;

    let request = &mock.requests()[0];
    let user = &request.messages.last().unwrap().content;
    assert!(user.contains("Research project completed"));
    assert!(user.contains("The player is at the dialog Research"));
    assert!(user.contains("Temperate forest"));
    assert!(user.contains("Dorian"));
    assert_eq!(speech.texts(), ["Science!"]);

    cancel.cancel();
    for handle in handles {
        assert_ok!(handle.await);
    }
}
