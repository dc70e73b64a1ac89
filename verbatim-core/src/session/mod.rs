//! Per-connection session controller.
//!
//! ## State machine
//!
//! ```text
//! Connecting ──connect()──► Active ──close()──► Closing ──► Closed
//! ```
//!
//! One reader loop per connection feeds [`Session::handle`] in arrival
//! order. Handlers park slow work off the control path — container decode on
//! the blocking pool, inference via the pipeline task, variant loads via the
//! manager's loader task — so the loop keeps draining the socket while
//! results complete out of band. Replies are emitted as their operation
//! finishes: a pong can overtake a pending transcription, but the segments
//! for one audio message are never split or reordered internally.
//!
//! Every failure below the transport level is reported as an `error`
//! message and leaves the session `Active`. Only transport teardown closes
//! a session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::SampleNormalizer;
use crate::buffering::StreamBuffer;
use crate::engine::{SegmentEvent, TranscriptionPipeline};
use crate::inference::manager::BackendManager;
use crate::protocol::{AudioData, ClientMessage, ServerMessage};

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Canonical sample rate for normalized audio (Hz).
    pub target_sample_rate: u32,
    /// Accumulated duration that triggers a transcription pass (ms).
    pub target_window_ms: f64,
    /// Language hint forwarded to the backend.
    pub language: String,
    /// Skip windows whose RMS falls below this level. `None` transcribes
    /// everything (the reference behavior).
    pub min_window_rms: Option<f32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            target_window_ms: crate::buffering::DEFAULT_WINDOW_MS,
            language: "en".to_string(),
            min_window_rms: None,
        }
    }
}

/// Lifecycle states. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// One connection's controller: owns the stream buffer exclusively,
/// observes the shared backend manager.
pub struct Session {
    id: Uuid,
    state: SessionState,
    config: SessionConfig,
    normalizer: SampleNormalizer,
    buffer: StreamBuffer,
    manager: Arc<BackendManager>,
    pipeline: TranscriptionPipeline,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        manager: Arc<BackendManager>,
        pipeline: TranscriptionPipeline,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        let normalizer = SampleNormalizer::new(config.target_sample_rate);
        let buffer = StreamBuffer::new(config.target_sample_rate, config.target_window_ms);
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Connecting,
            config,
            normalizer,
            buffer,
            manager,
            pipeline,
            outbound,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Announce the connection and enter `Active`.
    pub fn connect(&mut self) {
        self.send(ServerMessage::Connection {
            status: "connected".to_string(),
            model: self.manager.current_variant(),
            device: self.manager.device(),
        });
        self.state = SessionState::Active;
        info!(session = %self.id, "session connected");
    }

    /// Dispatch one client message. Handling order equals arrival order.
    pub async fn handle(&mut self, message: ClientMessage) {
        if self.state != SessionState::Active {
            debug!(session = %self.id, state = ?self.state, "message ignored outside Active");
            return;
        }

        match message {
            ClientMessage::Audio { data, format } => self.handle_audio(data, &format).await,
            ClientMessage::ChangeModel { model } => self.handle_change_model(model),
            ClientMessage::Ping => self.send(ServerMessage::Pong),
        }
    }

    /// Host-level protocol failure (unparseable frame, wrong frame kind).
    pub fn report_error(&self, message: impl Into<String>) {
        self.send(ServerMessage::Error {
            message: message.into(),
        });
    }

    /// Tear down: clear buffered audio and reach `Closed`.
    ///
    /// In-flight work keeps running to completion; its sends fail harmlessly
    /// once the outbound receiver is gone, so results for a dead session are
    /// discarded rather than raised.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;
        self.buffer.reset();
        self.state = SessionState::Closed;
        info!(session = %self.id, "session closed");
    }

    async fn handle_audio(&mut self, data: AudioData, format: &str) {
        // Normalization is awaited so samples land in the buffer in arrival
        // order; the decode itself runs on the blocking pool.
        let normalizer = self.normalizer.clone();
        let format_owned = format.to_string();
        let normalized =
            tokio::task::spawn_blocking(move || normalizer.normalize(&data, &format_owned)).await;

        let samples = match normalized {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                warn!(session = %self.id, error = %e, "audio fragment rejected");
                self.report_error(format!("Audio processing error: {e}"));
                return;
            }
            Err(join_err) => {
                warn!(session = %self.id, error = %join_err, "normalizer task crashed");
                self.report_error("Audio processing error: internal failure");
                return;
            }
        };

        self.buffer.push(&samples);
        debug!(
            session = %self.id,
            buffered_ms = self.buffer.duration_ms(),
            "fragment buffered"
        );

        if !self.buffer.is_ready() {
            return;
        }

        let window = self.buffer.drain();

        if let Some(threshold) = self.config.min_window_rms {
            let rms = window.rms();
            if rms < threshold {
                debug!(session = %self.id, rms, threshold, "window below rms gate, skipped");
                return;
            }
        }

        self.send(ServerMessage::Status {
            message: "Processing audio...".to_string(),
        });

        let mut segments = match self.pipeline.transcribe(window, &self.config.language) {
            Ok(rx) => rx,
            Err(e) => {
                warn!(session = %self.id, error = %e, "transcription rejected");
                self.report_error(e.to_string());
                return;
            }
        };

        // Forward segments as they are produced, without holding up the
        // reader loop. One forwarder per window keeps that window's output
        // contiguous and in backend order.
        let outbound = self.outbound.clone();
        let session_id = self.id;
        tokio::spawn(async move {
            while let Some(event) = segments.recv().await {
                let message = match event {
                    SegmentEvent::Segment(segment) => ServerMessage::from(segment),
                    SegmentEvent::Failed(e) => ServerMessage::Error {
                        message: e.to_string(),
                    },
                };
                if outbound.send(message).is_err() {
                    debug!(session = %session_id, "session gone, discarding transcription output");
                    break;
                }
            }
        });
    }

    fn handle_change_model(&mut self, model: String) {
        self.send(ServerMessage::Status {
            message: format!("Loading {model} model..."),
        });

        // The load resolves on the manager's loader task; this session only
        // waits for the outcome, it never blocks its reader loop or drops
        // buffered audio.
        let manager = Arc::clone(&self.manager);
        let outbound = self.outbound.clone();
        let session_id = self.id;
        tokio::spawn(async move {
            let message = match manager.load_variant(&model).await {
                Ok(change) => ServerMessage::ModelChanged {
                    model: change.variant,
                    device: change.device,
                },
                Err(e) => {
                    warn!(session = %session_id, model = %model, error = %e, "model switch failed");
                    ServerMessage::Error {
                        message: e.to_string(),
                    }
                }
            };
            let _ = outbound.send(message);
        });
    }

    fn send(&self, message: ServerMessage) {
        if self.outbound.send(message).is_err() {
            debug!(session = %self.id, "outbound channel closed, message dropped");
        }
    }
}
