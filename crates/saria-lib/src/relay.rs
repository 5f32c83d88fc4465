//! Request orchestrator — the per-request workflow.
//!
//! ```text
//! admit (token bucket, bounded wait)
//!     → start job (supersedes whatever was running)
//!     → generate reply
//!     → cancel check → broadcast assistant text
//!     → synthesize speech
//!     → cancel check → broadcast audio
//! ```
//!
//! The direct response and the broadcast stream are independent delivery
//! paths carrying the same payload: the caller always gets its reply (or a
//! cancelled marker) even when no listener is connected, and listeners get
//! events whether or not the caller is still around.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};

use saria_core::error::RelayError;
use saria_core::text_prep::{clean_for_speech, speech_lang};
use saria_core::types::{GenerateRequest, JobKind, RelayConfig, RelayEvent, TurnOutcome};

use crate::hub::BroadcastHub;
use crate::job::{Job, JobController};
use crate::limiter::TokenBucket;
use crate::llm::Generator;
use crate::speech::Synthesizer;

pub struct Relay {
    hub: Arc<BroadcastHub>,
    jobs: JobController,
    limiter: TokenBucket,
    generator: Arc<dyn Generator>,
    synthesizer: Arc<dyn Synthesizer>,
    voice_wait: Duration,
    text_wait: Duration,
}

impl Relay {
    pub fn new(
        config: RelayConfig,
        generator: Arc<dyn Generator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Result<Self, RelayError> {
        let hub = Arc::new(BroadcastHub::new());
        let limiter = TokenBucket::new(config.capacity, config.refill_period)?;
        Ok(Self {
            jobs: JobController::new(hub.clone()),
            hub,
            limiter,
            generator,
            synthesizer,
            voice_wait: config.voice_wait,
            text_wait: config.text_wait,
        })
    }

    /// The hub carrying lifecycle and result events. The HTTP layer
    /// subscribes stream clients here.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Current admission credit, for status reporting.
    pub fn tokens_available(&self) -> f64 {
        self.limiter.available()
    }

    /// Handle a recorded utterance.
    pub async fn handle_voice(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<TurnOutcome, RelayError> {
        if !self.limiter.acquire_within(self.voice_wait).await {
            // Voice callers already sat through an upload — tell listeners
            // why nothing is going to play.
            self.hub.publish(&RelayEvent::Status {
                message: "Rate limited: try again later.".into(),
            });
            return Err(RelayError::RateLimited);
        }
        self.run_turn(
            JobKind::Voice,
            GenerateRequest::Audio {
                bytes,
                mime_type: mime_type.to_string(),
            },
            "Processing audio...",
            "Server error processing audio.",
        )
        .await
    }

    /// Handle a chat message.
    pub async fn handle_text(&self, message: &str) -> Result<TurnOutcome, RelayError> {
        if !self.limiter.acquire_within(self.text_wait).await {
            return Err(RelayError::RateLimited);
        }
        self.run_turn(
            JobKind::Text,
            GenerateRequest::Text {
                message: message.to_string(),
            },
            "Processing message...",
            "Server error processing message.",
        )
        .await
    }

    /// Cancel whatever is in flight. Returns whether anything was running.
    pub fn interrupt(&self) -> bool {
        self.jobs.interrupt()
    }

    async fn run_turn(
        &self,
        kind: JobKind,
        request: GenerateRequest,
        processing_msg: &str,
        error_msg: &str,
    ) -> Result<TurnOutcome, RelayError> {
        let job = self.jobs.start(kind);
        debug!("job {}: started ({kind:?})", job.id());
        self.hub.publish(&RelayEvent::Status {
            message: processing_msg.into(),
        });

        let text = match self.generator.generate(request).await {
            Ok(text) => text,
            Err(e) => {
                self.hub.publish(&RelayEvent::Status {
                    message: error_msg.into(),
                });
                return Err(e);
            }
        };

        // A reply that lands after the job was superseded or interrupted
        // still goes back to the caller, but stays off the broadcast stream.
        if text.is_empty() || job.is_cancelled() {
            debug!("job {}: stale or empty reply, broadcast suppressed", job.id());
            return Ok(TurnOutcome {
                text,
                cancelled: true,
            });
        }

        self.hub.publish(&RelayEvent::Assistant { text: text.clone() });
        self.speak(&text, &job).await;

        Ok(TurnOutcome {
            text,
            cancelled: false,
        })
    }

    /// Synthesize the reply and broadcast the clip, unless the job was
    /// cancelled while synthesis ran. Synthesis failure downgrades the turn
    /// to text-only; the clip itself only ever lives in memory.
    async fn speak(&self, text: &str, job: &Job) {
        let spoken = clean_for_speech(text);
        if spoken.is_empty() || job.is_cancelled() {
            return;
        }
        let lang = speech_lang(&spoken);
        match self.synthesizer.synthesize(&spoken, lang).await {
            Ok(audio) => {
                if !job.is_cancelled() {
                    self.hub.publish(&RelayEvent::ResponseAudio {
                        audio: BASE64.encode(&audio),
                    });
                }
            }
            Err(e) => warn!("job {}: {e}", job.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use crate::hub::Listener;

    // ── Stub collaborators ──────────────────────────────────────────

    /// Echoes text requests, cans a fixed reply for audio.
    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, req: GenerateRequest) -> Result<String, RelayError> {
            match req {
                GenerateRequest::Text { message } => Ok(format!("reply to {message}")),
                GenerateRequest::Audio { .. } => Ok("voice reply".into()),
            }
        }
    }

    /// Parks the "first" turn on a gate so a test can land a second request
    /// while the first is still generating. Every other message echoes.
    struct GatedGenerator {
        gate: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl GatedGenerator {
        fn new() -> (Self, oneshot::Sender<()>) {
            let (tx, rx) = oneshot::channel();
            (
                Self {
                    gate: tokio::sync::Mutex::new(Some(rx)),
                },
                tx,
            )
        }
    }

    #[async_trait]
    impl Generator for GatedGenerator {
        async fn generate(&self, req: GenerateRequest) -> Result<String, RelayError> {
            match req {
                GenerateRequest::Text { message } if message == "first" => {
                    let gate = self.gate.lock().await.take().expect("gate reused");
                    let _ = gate.await;
                    Ok("slow reply".into())
                }
                GenerateRequest::Text { message } => Ok(format!("reply to {message}")),
                GenerateRequest::Audio { .. } => Ok("voice reply".into()),
            }
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(&self, _req: GenerateRequest) -> Result<String, RelayError> {
            Err(RelayError::Generation("boom".into()))
        }
    }

    struct EmptyGenerator;

    #[async_trait]
    impl Generator for EmptyGenerator {
        async fn generate(&self, _req: GenerateRequest) -> Result<String, RelayError> {
            Ok(String::new())
        }
    }

    struct CannedSynth;

    #[async_trait]
    impl Synthesizer for CannedSynth {
        async fn synthesize(&self, _text: &str, _lang: &str) -> Result<Vec<u8>, RelayError> {
            Ok(vec![1, 2, 3])
        }
    }

    struct FailingSynth;

    #[async_trait]
    impl Synthesizer for FailingSynth {
        async fn synthesize(&self, _text: &str, _lang: &str) -> Result<Vec<u8>, RelayError> {
            Err(RelayError::Speech("no audio".into()))
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn relay(generator: Arc<dyn Generator>, synthesizer: Arc<dyn Synthesizer>) -> Relay {
        Relay::new(RelayConfig::default(), generator, synthesizer).unwrap()
    }

    fn single_shot_config() -> RelayConfig {
        RelayConfig {
            capacity: 1.0,
            refill_period: Duration::from_secs(3600),
            voice_wait: Duration::ZERO,
            text_wait: Duration::ZERO,
        }
    }

    fn drain(listener: &mut Listener) -> Vec<serde_json::Value> {
        let mut events = Vec::new();
        while let Some(line) = listener.try_recv() {
            events.push(serde_json::from_str(&line).unwrap());
        }
        events
    }

    fn types(events: &[serde_json::Value]) -> Vec<&str> {
        events.iter().map(|e| e["type"].as_str().unwrap()).collect()
    }

    // ── Scenarios ───────────────────────────────────────────────────

    #[tokio::test]
    async fn text_turn_broadcasts_reply_then_audio() {
        let relay = relay(Arc::new(EchoGenerator), Arc::new(CannedSynth));
        let mut listener = relay.hub().subscribe();

        let outcome = relay.handle_text("hello").await.unwrap();
        assert_eq!(outcome.text, "reply to hello");
        assert!(!outcome.cancelled);

        let events = drain(&mut listener);
        assert_eq!(
            types(&events),
            ["connected", "status", "assistant", "response_audio"]
        );
        assert_eq!(events[2]["text"], "reply to hello");
        assert_eq!(events[3]["audio"], BASE64.encode([1u8, 2, 3]));
    }

    #[tokio::test]
    async fn voice_turn_reaches_the_generator_with_audio() {
        let relay = relay(Arc::new(EchoGenerator), Arc::new(CannedSynth));
        let outcome = relay.handle_voice(vec![9, 9], "audio/webm").await.unwrap();
        assert_eq!(outcome.text, "voice reply");
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn newer_request_supersedes_inflight_turn() {
        let (generator, release) = GatedGenerator::new();
        let relay = Arc::new(relay(Arc::new(generator), Arc::new(CannedSynth)));
        let mut listener = relay.hub().subscribe();

        let slow = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.handle_text("first").await })
        };
        // let the first turn reach its generation call
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fast = relay.handle_text("second").await.unwrap();
        assert!(!fast.cancelled);
        assert_eq!(fast.text, "reply to second");

        let _ = release.send(());
        let slow = slow.await.unwrap().unwrap();
        assert!(slow.cancelled);
        assert_eq!(slow.text, "slow reply");

        // the superseded turn contributed no assistant/audio events
        let events = drain(&mut listener);
        assert_eq!(
            types(&events),
            ["connected", "status", "stop", "status", "assistant", "response_audio"]
        );
        assert_eq!(events[4]["text"], "reply to second");
    }

    #[tokio::test]
    async fn admission_timeout_rejects_without_creating_a_job() {
        let relay = Relay::new(
            single_shot_config(),
            Arc::new(EchoGenerator),
            Arc::new(CannedSynth),
        )
        .unwrap();
        let mut listener = relay.hub().subscribe();

        relay.handle_text("one").await.unwrap();
        let err = relay.handle_text("two").await.unwrap_err();
        assert!(matches!(err, RelayError::RateLimited));

        let events = drain(&mut listener);
        // one full turn, then nothing: no second status, no stop, no job
        assert_eq!(
            types(&events),
            ["connected", "status", "assistant", "response_audio"]
        );
    }

    #[tokio::test]
    async fn rejected_voice_turn_announces_rate_limit() {
        let relay = Relay::new(
            single_shot_config(),
            Arc::new(EchoGenerator),
            Arc::new(CannedSynth),
        )
        .unwrap();
        let mut listener = relay.hub().subscribe();

        relay.handle_text("one").await.unwrap();
        let err = relay.handle_voice(vec![1], "audio/webm").await.unwrap_err();
        assert!(matches!(err, RelayError::RateLimited));

        let events = drain(&mut listener);
        let last = events.last().unwrap();
        assert_eq!(last["type"], "status");
        assert_eq!(last["message"], "Rate limited: try again later.");
    }

    #[tokio::test]
    async fn speech_failure_degrades_to_text_only() {
        let relay = relay(Arc::new(EchoGenerator), Arc::new(FailingSynth));
        let mut listener = relay.hub().subscribe();

        let outcome = relay.handle_text("hello").await.unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(outcome.text, "reply to hello");

        let events = drain(&mut listener);
        assert_eq!(types(&events), ["connected", "status", "assistant"]);
    }

    #[tokio::test]
    async fn generation_failure_surfaces_and_announces() {
        let relay = relay(Arc::new(FailingGenerator), Arc::new(CannedSynth));
        let mut listener = relay.hub().subscribe();

        let err = relay.handle_text("hello").await.unwrap_err();
        assert!(matches!(err, RelayError::Generation(_)));

        let events = drain(&mut listener);
        assert_eq!(types(&events), ["connected", "status", "status"]);
        assert_eq!(events[2]["message"], "Server error processing message.");
    }

    #[tokio::test]
    async fn empty_reply_counts_as_cancelled() {
        let relay = relay(Arc::new(EmptyGenerator), Arc::new(CannedSynth));
        let mut listener = relay.hub().subscribe();

        let outcome = relay.handle_text("hello").await.unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.text.is_empty());

        let events = drain(&mut listener);
        assert_eq!(types(&events), ["connected", "status"]);
    }

    #[tokio::test]
    async fn interrupt_reports_whether_anything_ran() {
        let (generator, release) = GatedGenerator::new();
        let relay = Arc::new(relay(Arc::new(generator), Arc::new(CannedSynth)));

        assert!(!relay.interrupt());

        let slow = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.handle_text("first").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(relay.interrupt());
        assert!(!relay.interrupt());

        let _ = release.send(());
        let outcome = slow.await.unwrap().unwrap();
        assert!(outcome.cancelled);
    }
}
