//! Session-level integration tests driving the controller exactly the way
//! the WebSocket host does: a message stream in, an outbound channel out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use verbatim_core::audio::f32_to_pcm;
use verbatim_core::inference::stub::{StubBackend, StubFactory};
use verbatim_core::inference::{BackendFactory, SpeechBackend};
use verbatim_core::{
    AudioData, AudioWindow, BackendManager, ClientMessage, Device, Segment, ServerMessage,
    Session, SessionConfig, SessionState, TranscriptionPipeline, VerbatimError,
};

/// Stub factory whose backends sleep before answering, so a transcription
/// is reliably still in flight when the next message arrives.
struct SlowFactory {
    delay: Duration,
}

struct SlowBackend {
    delay: Duration,
    inner: StubBackend,
}

impl SpeechBackend for SlowBackend {
    fn transcribe(
        &mut self,
        window: &AudioWindow,
        language: &str,
    ) -> Result<Vec<Segment>, VerbatimError> {
        std::thread::sleep(self.delay);
        self.inner.transcribe(window, language)
    }
}

impl BackendFactory for SlowFactory {
    fn load(&self, variant: &str, device: Device) -> Result<Box<dyn SpeechBackend>, VerbatimError> {
        Ok(Box::new(SlowBackend {
            delay: self.delay,
            inner: StubBackend::new(variant, device),
        }))
    }
}

async fn recv_message(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for server message")
        .expect("outbound channel closed unexpectedly")
}

fn pcm_fragment(ms: u32, rate: u32) -> ClientMessage {
    let samples = vec![0.05f32; (u64::from(rate) * u64::from(ms) / 1000) as usize];
    ClientMessage::Audio {
        data: AudioData::Bytes(f32_to_pcm(&samples)),
        format: "pcm".into(),
    }
}

/// Build a connected session backed by `factory` with the `small` variant
/// preloaded, returning the controller, the outbound receiver and the
/// shared manager.
async fn active_session(
    factory: Arc<dyn BackendFactory>,
    config: SessionConfig,
) -> (
    Session,
    mpsc::UnboundedReceiver<ServerMessage>,
    Arc<BackendManager>,
) {
    let manager = BackendManager::new(factory, Device::Cpu);
    manager.load_variant("small").await.expect("initial load");
    let pipeline = TranscriptionPipeline::new(Arc::clone(&manager));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = Session::new(config, Arc::clone(&manager), pipeline, tx);
    session.connect();
    assert_eq!(session.state(), SessionState::Active);

    match recv_message(&mut rx).await {
        ServerMessage::Connection { status, model, .. } => {
            assert_eq!(status, "connected");
            assert_eq!(model.as_deref(), Some("small"));
        }
        other => panic!("expected connection message first, got {other:?}"),
    }

    (session, rx, manager)
}

#[tokio::test]
async fn three_fragments_accumulate_into_one_window() {
    let (mut session, mut rx, _manager) =
        active_session(Arc::new(StubFactory::default()), SessionConfig::default()).await;

    // 2000 + 2000 ms: below the 5000 ms target, nothing is emitted.
    session.handle(pcm_fragment(2_000, 16_000)).await;
    session.handle(pcm_fragment(2_000, 16_000)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    // Third fragment crosses the target: status, then the whole 6000 ms
    // window in one transcription.
    session.handle(pcm_fragment(2_000, 16_000)).await;

    match recv_message(&mut rx).await {
        ServerMessage::Status { message } => assert_eq!(message, "Processing audio..."),
        other => panic!("expected status, got {other:?}"),
    }
    match recv_message(&mut rx).await {
        ServerMessage::Transcription {
            text,
            start,
            end,
            is_final,
        } => {
            assert_eq!(text, "[small: 96000 samples @ 16000 Hz]");
            assert_eq!(start, 0.0);
            assert!((end - 6.0).abs() < 1e-9);
            assert!(is_final);
        }
        other => panic!("expected transcription, got {other:?}"),
    }

    // The buffer restarted from zero: another 2000 ms fragment stays quiet.
    session.handle(pcm_fragment(2_000, 16_000)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn ping_is_answered_while_transcription_is_in_flight() {
    let (mut session, mut rx, _manager) = active_session(
        Arc::new(SlowFactory {
            delay: Duration::from_millis(300),
        }),
        SessionConfig::default(),
    )
    .await;

    // One window's worth of audio: kicks off a slow transcription.
    session.handle(pcm_fragment(5_000, 16_000)).await;
    match recv_message(&mut rx).await {
        ServerMessage::Status { .. } => {}
        other => panic!("expected status, got {other:?}"),
    }

    // The ping arrives mid-transcription and its pong must not wait for it.
    session.handle(ClientMessage::Ping).await;
    match recv_message(&mut rx).await {
        ServerMessage::Pong => {}
        other => panic!("expected pong before transcription results, got {other:?}"),
    }

    match recv_message(&mut rx).await {
        ServerMessage::Transcription { .. } => {}
        other => panic!("expected transcription after pong, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_fragment_reports_error_and_session_continues() {
    let (mut session, mut rx, _manager) =
        active_session(Arc::new(StubFactory::default()), SessionConfig::default()).await;

    session
        .handle(ClientMessage::Audio {
            data: AudioData::Text("definitely not base64!!".into()),
            format: "pcm".into(),
        })
        .await;

    match recv_message(&mut rx).await {
        ServerMessage::Error { message } => {
            assert!(
                message.starts_with("Audio processing error:"),
                "unexpected error message: {message}"
            );
        }
        other => panic!("expected error, got {other:?}"),
    }

    // The failure was scoped to the fragment; the session still answers.
    session.handle(ClientMessage::Ping).await;
    assert!(matches!(recv_message(&mut rx).await, ServerMessage::Pong));
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn corrupt_container_reports_error_and_session_continues() {
    let (mut session, mut rx, _manager) =
        active_session(Arc::new(StubFactory::default()), SessionConfig::default()).await;

    session
        .handle(ClientMessage::Audio {
            data: AudioData::Bytes(vec![9, 9, 9, 9, 9, 9, 9, 9]),
            format: "webm".into(),
        })
        .await;

    match recv_message(&mut rx).await {
        ServerMessage::Error { message } => {
            assert!(message.contains("codec"), "unexpected error message: {message}");
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn change_model_switches_the_shared_backend() {
    let (mut session, mut rx, manager) =
        active_session(Arc::new(StubFactory::default()), SessionConfig::default()).await;

    session
        .handle(ClientMessage::ChangeModel {
            model: "base".into(),
        })
        .await;

    match recv_message(&mut rx).await {
        ServerMessage::Status { message } => assert_eq!(message, "Loading base model..."),
        other => panic!("expected status, got {other:?}"),
    }
    match recv_message(&mut rx).await {
        ServerMessage::ModelChanged { model, device } => {
            assert_eq!(model, "base");
            assert_eq!(device, Device::Cpu);
        }
        other => panic!("expected model_changed, got {other:?}"),
    }

    // Process-wide visibility: the manager every session observes moved.
    assert_eq!(manager.current_variant().as_deref(), Some("base"));
}

#[tokio::test]
async fn change_model_to_unknown_variant_keeps_current() {
    let (mut session, mut rx, manager) =
        active_session(Arc::new(StubFactory::default()), SessionConfig::default()).await;

    session
        .handle(ClientMessage::ChangeModel {
            model: "turbo-xxl".into(),
        })
        .await;

    match recv_message(&mut rx).await {
        ServerMessage::Status { message } => assert_eq!(message, "Loading turbo-xxl model..."),
        other => panic!("expected status, got {other:?}"),
    }
    match recv_message(&mut rx).await {
        ServerMessage::Error { message } => {
            assert!(
                message.contains("unknown model variant"),
                "unexpected error message: {message}"
            );
        }
        other => panic!("expected error, got {other:?}"),
    }

    assert_eq!(manager.current_variant().as_deref(), Some("small"));
}

#[tokio::test]
async fn silence_gate_skips_quiet_windows() {
    let config = SessionConfig {
        min_window_rms: Some(0.01),
        ..SessionConfig::default()
    };
    let (mut session, mut rx, _manager) =
        active_session(Arc::new(StubFactory::default()), config).await;

    // A full window of near-silence: drained but never transcribed.
    let samples = vec![0.0001f32; 16_000 * 5];
    session
        .handle(ClientMessage::Audio {
            data: AudioData::Bytes(f32_to_pcm(&samples)),
            format: "pcm".into(),
        })
        .await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    // A loud window goes through as usual.
    session.handle(pcm_fragment(5_000, 16_000)).await;
    assert!(matches!(
        recv_message(&mut rx).await,
        ServerMessage::Status { .. }
    ));
    assert!(matches!(
        recv_message(&mut rx).await,
        ServerMessage::Transcription { .. }
    ));
}

#[tokio::test]
async fn disconnect_discards_in_flight_results() {
    let (mut session, mut rx, _manager) = active_session(
        Arc::new(SlowFactory {
            delay: Duration::from_millis(200),
        }),
        SessionConfig::default(),
    )
    .await;

    session.handle(pcm_fragment(5_000, 16_000)).await;
    assert!(matches!(
        recv_message(&mut rx).await,
        ServerMessage::Status { .. }
    ));

    // The client goes away while the transcription is still running. The
    // worker must finish quietly and its results must be discarded.
    drop(rx);
    session.close();
    assert_eq!(session.state(), SessionState::Closed);

    tokio::time::sleep(Duration::from_millis(400)).await;
}
