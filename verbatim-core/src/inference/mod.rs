//! Speech backend abstraction.
//!
//! The `SpeechBackend` trait decouples the session machinery from any
//! specific recognizer (stub echo, whisper.cpp, a remote service, ...).
//!
//! `&mut self` on `transcribe` intentionally expresses that decoders are
//! stateful — beam search caches, scratch buffers, FFI state. All mutation
//! is therefore serialised through `BackendHandle`'s `parking_lot::Mutex`:
//! backends are safe for serialized inference calls, never for concurrent
//! ones, and loads are serialised separately by the manager.

pub mod manager;
pub mod stub;

#[cfg(feature = "whisper")]
pub mod whisper;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffering::AudioWindow;
use crate::error::Result;
use crate::protocol::Segment;
use manager::Device;

/// Contract for speech recognition backends.
pub trait SpeechBackend: Send + 'static {
    /// Transcribe one normalized window.
    ///
    /// Segment offsets are relative to `window`; windows are independent
    /// and offsets reset per window.
    ///
    /// # Errors
    /// A failed call is scoped to this window; the backend must stay usable
    /// for subsequent windows.
    fn transcribe(&mut self, window: &AudioWindow, language: &str) -> Result<Vec<Segment>>;
}

/// Produces a backend for a (variant, device) pair.
///
/// This is the seam that keeps the model an external collaborator: the
/// manager never knows what a backend is, only how to ask for one.
pub trait BackendFactory: Send + Sync + 'static {
    fn load(&self, variant: &str, device: Device) -> Result<Box<dyn SpeechBackend>>;
}

/// Thread-safe reference-counted handle to any `SpeechBackend` implementor.
#[derive(Clone)]
pub struct BackendHandle(pub Arc<Mutex<Box<dyn SpeechBackend>>>);

impl BackendHandle {
    pub fn new(backend: Box<dyn SpeechBackend>) -> Self {
        Self(Arc::new(Mutex::new(backend)))
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle").finish_non_exhaustive()
    }
}
