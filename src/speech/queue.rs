//! Bounded speech job queue
//!
//! Jobs are created in the order personas start their turns and played in
//! exactly that order by a single consumer, regardless of which generation
//! finishes first. Callbacks are always invoked outside the queue lock.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::commentary::Phrase;
use crate::error::Error;

use super::{SharedSpeech, Utterance};

/// Fired once a job has been played or dropped
pub type DoneCallback = Box<dyn FnOnce() + Send>;

/// Fired when a job's generation or playback fails
pub type ErrorCallback = Box<dyn FnOnce(&Error) + Send>;

/// Queue job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned by [`SpeechQueue::enqueue`] for an accepted job
#[derive(Debug)]
pub struct JobTicket {
    pub id: JobId,
    /// Phrases left after dropping the persona's own
    pub phrases: Vec<Phrase>,
}

/// Lifecycle of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Generation still running
    Pending,
    /// Ready to be played (possibly with nothing to say)
    Completed,
}

struct SpeechJob {
    id: JobId,
    persona: String,
    state: JobState,
    utterance: Option<Utterance>,
    on_error: Option<ErrorCallback>,
    on_done: Option<DoneCallback>,
}

/// FIFO of speech jobs with a fixed capacity
pub struct SpeechQueue {
    jobs: Mutex<VecDeque<SpeechJob>>,
    capacity: usize,
    configured: bool,
    poll_interval: Duration,
}

impl SpeechQueue {
    pub fn new(capacity: usize, configured: bool, poll_interval: Duration) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            configured,
            poll_interval,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.jobs.lock().len() >= self.capacity
    }

    /// Queue a job for `persona`.
    ///
    /// When the queue is full or speech is unconfigured no job is created
    /// and `on_done` fires before this returns.
    pub fn enqueue(
        &self,
        persona: &str,
        phrases: Vec<Phrase>,
        on_error: ErrorCallback,
        on_done: DoneCallback,
    ) -> Option<JobTicket> {
        {
            let mut jobs = self.jobs.lock();
            if self.configured && jobs.len() < self.capacity {
                let phrases: Vec<Phrase> = phrases
                    .into_iter()
                    .filter(|p| p.origin.as_deref() != Some(persona))
                    .collect();
                let id = JobId::new();
                jobs.push_back(SpeechJob {
                    id,
                    persona: persona.to_string(),
                    state: JobState::Pending,
                    utterance: None,
                    on_error: Some(on_error),
                    on_done: Some(on_done),
                });
                debug!(%persona, job = %id, queued = jobs.len(), "Speech job queued");
                return Some(JobTicket { id, phrases });
            }
        }

        debug!(%persona, configured = self.configured, "Speech job rejected");
        on_done();
        None
    }

    /// Attach the generated utterance (or nothing) and mark the job ready
    pub fn complete(&self, id: JobId, utterance: Option<Utterance>) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                job.utterance = utterance;
                job.state = JobState::Completed;
                true
            }
            None => false,
        }
    }

    /// Mark the job ready with nothing to say and report `error`
    pub fn fail(&self, id: JobId, error: &Error) -> bool {
        let on_error = {
            let mut jobs = self.jobs.lock();
            match jobs.iter_mut().find(|j| j.id == id) {
                Some(job) => {
                    job.utterance = None;
                    job.state = JobState::Completed;
                    job.on_error.take()
                }
                None => return false,
            }
        };
        if let Some(callback) = on_error {
            callback(error);
        }
        true
    }

    /// State of a queued job, `None` once it left the queue
    pub fn job_state(&self, id: JobId) -> Option<JobState> {
        self.jobs.lock().iter().find(|j| j.id == id).map(|j| j.state)
    }

    /// Fire and clear the done callbacks of every job belonging to `persona`
    pub fn release_persona(&self, persona: &str) -> usize {
        let callbacks: Vec<DoneCallback> = self
            .jobs
            .lock()
            .iter_mut()
            .filter(|j| j.persona == persona)
            .filter_map(|j| j.on_done.take())
            .collect();

        let released = callbacks.len();
        for callback in callbacks {
            callback();
        }
        released
    }

    /// Whether any queued job is ready to be played
    pub fn has_completed_waiting(&self) -> bool {
        self.jobs
            .lock()
            .iter()
            .any(|j| j.state == JobState::Completed)
    }

    /// Drop every job without firing its callbacks
    pub fn clear(&self) -> usize {
        self.clear_while(|| ())
    }

    /// Drop every job and run `f` while the queue is still locked
    pub fn clear_while(&self, f: impl FnOnce()) -> usize {
        let mut jobs = self.jobs.lock();
        let dropped = jobs.len();
        jobs.clear();
        f();
        dropped
    }

    /// Pop the head job if it is ready
    fn take_ready(&self) -> Option<SpeechJob> {
        let mut jobs = self.jobs.lock();
        let ready = matches!(jobs.front(), Some(job) if job.state == JobState::Completed);
        if ready {
            jobs.pop_front()
        } else {
            None
        }
    }

    /// Single consumer: play completed jobs in queue order until cancelled
    pub async fn run(self: Arc<Self>, backend: SharedSpeech, cancel: CancellationToken) {
        info!(backend = backend.name(), capacity = self.capacity, "Speech consumer started");

        loop {
            match self.take_ready() {
                Some(job) => {
                    self.play(job, &backend, &cancel).await;
                    if cancel.is_cancelled() {
                        break;
                    }
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        info!("Speech consumer stopped");
    }

    async fn play(&self, mut job: SpeechJob, backend: &SharedSpeech, cancel: &CancellationToken) {
        if let Some(utterance) = job.utterance.take() {
            debug!(persona = %job.persona, job = %job.id, "Playing");
            let result = tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                r = backend.play(&utterance) => r,
            };
            if let Err(e) = result {
                warn!(persona = %job.persona, error = %e, "Playback failed");
                let error = Error::PlaybackFailed {
                    persona: job.persona.clone(),
                    message: e.to_string(),
                };
                if let Some(callback) = job.on_error.take() {
                    callback(&error);
                }
            }
        }

        if let Some(callback) = job.on_done.take() {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{RecordingSpeech, VoiceSelection};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queue() -> SpeechQueue {
        SpeechQueue::new(3, true, Duration::from_millis(200))
    }

    fn noop_error() -> ErrorCallback {
        Box::new(|_| {})
    }

    fn counter_done(counter: &Arc<AtomicUsize>) -> DoneCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn utterance(persona: &str, text: &str) -> Utterance {
        Utterance {
            persona: persona.into(),
            text: text.into(),
            voice: VoiceSelection::default(),
        }
    }

    fn phrase(text: &str, origin: Option<&str>) -> Phrase {
        Phrase {
            text: text.into(),
            priority: 0,
            origin: origin.map(str::to_string),
            sequence: 0,
        }
    }

    #[test]
    fn test_capacity_and_overflow() {
        let q = queue();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            assert!(q.enqueue("A", vec![], noop_error(), counter_done(&done)).is_some());
        }
        assert!(q.is_full());
        assert_eq!(done.load(Ordering::SeqCst), 0);

        let rejected = q.enqueue("A", vec![], noop_error(), counter_done(&done));
        assert!(rejected.is_none());
        assert_eq!(done.load(Ordering::SeqCst), 1, "overflow fires done synchronously");
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn test_unconfigured_rejects() {
        let q = SpeechQueue::new(3, false, Duration::from_millis(200));
        let done = Arc::new(AtomicUsize::new(0));
        assert!(q.enqueue("A", vec![], noop_error(), counter_done(&done)).is_none());
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_own_phrases_filtered() {
        let q = queue();
        let ticket = q
            .enqueue(
                "A",
                vec![phrase("raid", None), phrase("mine", Some("A")), phrase("theirs", Some("B"))],
                noop_error(),
                Box::new(|| {}),
            )
            .unwrap();
        let texts: Vec<_> = ticket.phrases.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, ["raid", "theirs"]);
    }

    #[test]
    fn test_head_must_complete_first() {
        let q = queue();
        let first = q.enqueue("A", vec![], noop_error(), Box::new(|| {})).unwrap();
        let second = q.enqueue("B", vec![], noop_error(), Box::new(|| {})).unwrap();

        q.complete(second.id, Some(utterance("B", "second")));
        assert!(q.has_completed_waiting());
        assert!(q.take_ready().is_none(), "head is still pending");

        q.complete(first.id, Some(utterance("A", "first")));
        assert_eq!(q.take_ready().unwrap().id, first.id);
        assert_eq!(q.take_ready().unwrap().id, second.id);
        assert!(!q.has_completed_waiting());
    }

    #[test]
    fn test_fail_fires_error_callback() {
        let q = queue();
        let errors = Arc::new(AtomicUsize::new(0));
        let errors_clone = Arc::clone(&errors);
        let ticket = q
            .enqueue(
                "A",
                vec![],
                Box::new(move |_| {
                    errors_clone.fetch_add(1, Ordering::SeqCst);
                }),
                Box::new(|| {}),
            )
            .unwrap();

        assert!(q.fail(ticket.id, &Error::EmptyOutput));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(q.job_state(ticket.id), Some(JobState::Completed));
    }

    #[test]
    fn test_release_persona_fires_once() {
        let q = queue();
        let done = Arc::new(AtomicUsize::new(0));
        q.enqueue("A", vec![], noop_error(), counter_done(&done));
        q.enqueue("B", vec![], noop_error(), counter_done(&done));
        q.enqueue("A", vec![], noop_error(), counter_done(&done));

        assert_eq!(q.release_persona("A"), 2);
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(q.release_persona("A"), 0);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn test_clear_drops_without_callbacks() {
        let q = queue();
        let done = Arc::new(AtomicUsize::new(0));
        q.enqueue("A", vec![], noop_error(), counter_done(&done));
        q.enqueue("B", vec![], noop_error(), counter_done(&done));

        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
        assert_eq!(done.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_plays_in_enqueue_order() {
        let q = Arc::new(queue());
        let speech = Arc::new(RecordingSpeech::new());
        let cancel = CancellationToken::new();
        let done = Arc::new(AtomicUsize::new(0));

        let ids: Vec<JobId> = ["A", "B", "C"]
            .iter()
            .map(|p| q.enqueue(p, vec![], noop_error(), counter_done(&done)).unwrap().id)
            .collect();

        let consumer = tokio::spawn(Arc::clone(&q).run(speech.clone(), cancel.clone()));

        // Complete out of order: C, A, then B with no utterance
        q.complete(ids[2], Some(utterance("C", "third")));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(speech.played().is_empty());

        q.complete(ids[0], Some(utterance("A", "first")));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(speech.texts(), ["first"]);

        q.complete(ids[1], None);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(speech.texts(), ["first", "third"]);
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(q.is_empty());

        cancel.cancel();
        consumer.await.unwrap();
    }
}
