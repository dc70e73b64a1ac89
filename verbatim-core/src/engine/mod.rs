//! Transcription pipeline — runs the current backend off the session's
//! control path and streams timed segments back.
//!
//! One call = one window. The backend call is blocking work (FFI or heavy
//! compute), so it runs under `spawn_blocking`; results stream through an
//! mpsc channel so the caller forwards them as they are produced while the
//! session loop keeps draining its socket.
//!
//! On a mid-stream backend failure the channel carries a single terminal
//! [`SegmentEvent::Failed`] in place of the remaining segments; segments
//! already emitted stand.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::buffering::AudioWindow;
use crate::error::VerbatimError;
use crate::inference::manager::BackendManager;
use crate::protocol::Segment;

/// One item of a window's result stream.
#[derive(Debug)]
pub enum SegmentEvent {
    /// Next recognized segment, in backend order.
    Segment(Segment),
    /// Terminal failure for this window. The session stays open.
    Failed(VerbatimError),
}

/// Channel capacity for one window's segment stream.
const SEGMENT_STREAM_CAP: usize = 64;

/// Runs windows against the manager's current backend.
#[derive(Clone)]
pub struct TranscriptionPipeline {
    manager: Arc<BackendManager>,
    /// Optional upper bound on one backend call. The reference behavior
    /// imposed none; when set, expiry emits a terminal error event and the
    /// abandoned call's results are discarded (no mid-flight cancellation).
    timeout: Option<Duration>,
}

impl TranscriptionPipeline {
    pub fn new(manager: Arc<BackendManager>) -> Self {
        Self {
            manager,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Transcribe one window against the currently loaded backend.
    ///
    /// Returns a receiver yielding [`SegmentEvent`]s as the backend produces
    /// them.
    ///
    /// # Errors
    /// `VerbatimError::ModelNotLoaded` when no backend is loaded; nothing is
    /// spawned in that case.
    pub fn transcribe(
        &self,
        window: AudioWindow,
        language: &str,
    ) -> crate::error::Result<mpsc::Receiver<SegmentEvent>> {
        let backend = self
            .manager
            .backend()
            .ok_or(VerbatimError::ModelNotLoaded)?;

        let (tx, rx) = mpsc::channel(SEGMENT_STREAM_CAP);
        let language = language.to_string();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let duration_ms = window.duration_ms();
            debug!(duration_ms, "transcribing window");

            let worker =
                tokio::task::spawn_blocking(move || backend.0.lock().transcribe(&window, &language));

            let joined = match timeout {
                Some(limit) => match tokio::time::timeout(limit, worker).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        error!(?limit, "transcription timed out");
                        let _ = tx
                            .send(SegmentEvent::Failed(VerbatimError::Transcription(
                                format!("transcription timed out after {limit:?}"),
                            )))
                            .await;
                        return;
                    }
                },
                None => worker.await,
            };

            match joined {
                Ok(Ok(segments)) => {
                    debug!(count = segments.len(), "window transcribed");
                    for segment in segments {
                        if tx.send(SegmentEvent::Segment(segment)).await.is_err() {
                            // Receiver gone (session closed) — discard the rest.
                            return;
                        }
                    }
                }
                Ok(Err(e)) => {
                    error!(error = %e, "backend transcription failed");
                    let _ = tx
                        .send(SegmentEvent::Failed(VerbatimError::Transcription(
                            e.to_string(),
                        )))
                        .await;
                }
                Err(join_err) => {
                    error!(error = %join_err, "transcription worker crashed");
                    let _ = tx
                        .send(SegmentEvent::Failed(VerbatimError::Transcription(
                            "transcription worker crashed".into(),
                        )))
                        .await;
                }
            }
        });

        Ok(rx)
    }
}
