//! Commentary context
//!
//! Owns the persona roster, phrase pool, scheduler, speech queue and
//! generation engine for one session, and drives them from a periodic tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NarratorConfig;
use crate::error::{Error, Result};
use crate::persona::{Persona, PersonaStatus, TurnState};
use crate::speech::{SharedSpeech, SpeechQueue, Utterance};
use crate::telemetry::TelemetrySource;

use super::engine::{GenerationEngine, TurnRequest};
use super::phrase::{Phrase, PhraseAggregator};
use super::scheduler::Scheduler;

/// History every persona starts with after a manual reset
pub const RESET_REASON: &str = "The session was reset";

/// Session state shared by the tick loop, generation tasks and the consumer
pub struct CommentaryContext {
    roster: Vec<Arc<Persona>>,
    pool: PhraseAggregator,
    scheduler: Scheduler,
    queue: Arc<SpeechQueue>,
    engine: Arc<GenerationEngine>,
    telemetry: Arc<dyn TelemetrySource>,
    epoch: AtomicU64,
    tick_interval: Duration,
}

impl CommentaryContext {
    /// Build a session from configuration.
    ///
    /// `speech_configured` decides whether speech jobs are accepted at all.
    pub fn new(
        config: &NarratorConfig,
        engine: Arc<GenerationEngine>,
        telemetry: Arc<dyn TelemetrySource>,
        speech_configured: bool,
    ) -> Arc<Self> {
        let now = Utc::now();
        let roster = config
            .personas
            .iter()
            .map(|settings| {
                Arc::new(Persona::new(
                    settings.clone(),
                    &config.commentary,
                    &config.speech.default_language,
                    now,
                ))
            })
            .collect();

        let commentary = &config.commentary;
        let queue = SpeechQueue::new(
            commentary.queue_capacity,
            speech_configured && config.speech.is_configured(),
            Duration::from_millis(commentary.poll_interval_ms),
        );

        Arc::new(Self {
            roster,
            pool: PhraseAggregator::new(),
            scheduler: Scheduler::new(),
            queue: Arc::new(queue),
            engine,
            telemetry,
            epoch: AtomicU64::new(0),
            tick_interval: Duration::from_millis(commentary.tick_interval_ms),
        })
    }

    pub fn roster(&self) -> &[Arc<Persona>] {
        &self.roster
    }

    pub fn persona(&self, name: &str) -> Option<&Arc<Persona>> {
        self.roster.iter().find(|p| p.name() == name)
    }

    pub fn queue(&self) -> &Arc<SpeechQueue> {
        &self.queue
    }

    pub fn engine(&self) -> &Arc<GenerationEngine> {
        &self.engine
    }

    pub fn pool(&self) -> &PhraseAggregator {
        &self.pool
    }

    /// Current session epoch; bumped by every reset
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Nothing left to say about game events: the pool and queue are empty
    /// and no persona is busy or holding an event phrase. Replies between
    /// personas are ignored.
    pub fn is_drained(&self) -> bool {
        self.pool.is_empty()
            && self.queue.is_empty()
            && self
                .roster
                .iter()
                .all(|p| p.status() == PersonaStatus::Idle && !p.has_event_phrases())
    }

    fn index_of(&self, persona: &Persona) -> Option<usize> {
        self.roster.iter().position(|p| std::ptr::eq(p.as_ref(), persona))
    }

    // ─────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────

    /// Pool a phrase from telemetry; duplicates of pooled text are ignored
    pub fn add_phrase(&self, text: impl Into<String>, priority: i32, origin: Option<&str>) -> bool {
        let text = text.into();
        let added = self.pool.add(text.clone(), priority, origin);
        if added {
            debug!(priority, phrase = %text, pooled = self.pool.len(), "Phrase added");
        }
        added
    }

    /// One persona tick. Returns the number of turns started.
    pub fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> usize {
        let idle = self
            .roster
            .iter()
            .all(|p| p.status() == PersonaStatus::Idle && p.phrase_count() == 0);
        if idle && !self.pool.is_empty() {
            let last = self.scheduler.last_speaker();
            self.scheduler
                .start_next_persona(&self.roster, &self.pool, last, now);
        }

        let mut started = 0;
        for persona in &self.roster {
            if let Some((phrases, turn)) = persona.try_begin_turn(now) {
                self.start_turn(Arc::clone(persona), phrases, turn);
                started += 1;
            }
        }
        started
    }

    fn start_turn(self: &Arc<Self>, persona: Arc<Persona>, phrases: Vec<Phrase>, turn: TurnState) {
        let epoch = self.epoch();

        let on_done = {
            let ctx = Arc::clone(self);
            let persona = Arc::clone(&persona);
            Box::new(move || ctx.finish_turn(&persona, epoch))
        };
        let on_error = {
            let name = persona.name().to_string();
            Box::new(move |e: &Error| warn!(persona = %name, error = %e, "Commentary failed"))
        };

        let Some(ticket) = self.queue.enqueue(persona.name(), phrases, on_error, on_done) else {
            return;
        };

        let request = TurnRequest {
            phrases: ticket.phrases.iter().map(|p| p.text.clone()).collect(),
            telemetry: self.telemetry.snapshot(),
            other_personas: self
                .roster
                .iter()
                .filter(|p| p.name() != persona.name())
                .map(|p| p.name().to_string())
                .collect(),
        };

        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            let mut turn = turn;
            let result = ctx
                .engine
                .evaluate(persona.settings(), &mut turn, &request)
                .await;

            if ctx.epoch() != epoch {
                debug!(persona = %persona.name(), "Discarding result from a previous session");
                // The job may have been queued after the reset cleared the queue
                ctx.queue.complete(ticket.id, None);
                return;
            }
            persona.commit_turn(turn);

            match result {
                Ok(outcome) => {
                    if let Some(error) = outcome.exhausted_error(persona.name()) {
                        ctx.queue.fail(ticket.id, &error);
                        return;
                    }
                    let utterance = outcome.utterance().map(|text| Utterance {
                        persona: persona.name().to_string(),
                        text: text.to_string(),
                        voice: persona.voice(),
                    });
                    ctx.queue.complete(ticket.id, utterance);
                }
                Err(e) => {
                    ctx.queue.fail(ticket.id, &e);
                }
            }
        });
    }

    /// Called when a persona's job has been played or dropped
    fn finish_turn(&self, persona: &Persona, epoch: u64) {
        if self.epoch() != epoch {
            return;
        }
        let now = Utc::now();
        persona.finish_turn(persona.pick_next_phrase_time(now));
        let speaker = self.index_of(persona);
        self.scheduler
            .start_next_persona(&self.roster, &self.pool, speaker, now);
    }

    /// Let `name` start its next turn without waiting for its queued jobs.
    ///
    /// Returns how many jobs were released. Their playback still happens.
    pub fn release_persona(&self, name: &str) -> Result<usize> {
        if self.persona(name).is_none() {
            return Err(Error::PersonaNotFound {
                name: name.to_string(),
            });
        }
        let released = self.queue.release_persona(name);
        info!(persona = %name, released, "Persona released");
        Ok(released)
    }

    /// Start a new session: drop queued jobs, pooled phrases and persona state
    pub fn reset(&self, reasons: &[&str]) {
        let now = Utc::now();
        let dropped = self.queue.clear_while(|| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            self.pool.clear();
            self.scheduler.forget();
            for persona in &self.roster {
                persona.reset(reasons, now);
            }
        });
        info!(dropped_jobs = dropped, epoch = self.epoch(), "Session reset");
    }

    /// Run the tick loop and the speech consumer until `cancel` fires
    pub fn spawn(
        self: &Arc<Self>,
        speech: SharedSpeech,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let consumer = tokio::spawn(Arc::clone(&self.queue).run(speech, cancel.clone()));

        let ctx = Arc::clone(self);
        let ticker = tokio::spawn(async move {
            let mut ticks = interval(ctx.tick_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                personas = ctx.roster.len(),
                interval_ms = ctx.tick_interval.as_millis() as u64,
                "Commentary loop started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticks.tick() => {
                        ctx.tick(Utc::now());
                    }
                }
            }

            info!("Commentary loop stopped");
        });

        vec![ticker, consumer]
    }
}
