//! `StubBackend` — deterministic placeholder recognizer.
//!
//! Stands in for a real model in tests and default builds: emits one final
//! segment describing the window it was given, so the full session path can
//! be exercised end-to-end without model weights.

use tracing::debug;

use crate::buffering::AudioWindow;
use crate::error::{Result, VerbatimError};
use crate::inference::manager::Device;
use crate::inference::{BackendFactory, SpeechBackend};
use crate::protocol::Segment;

/// Echo-style stub backend.
pub struct StubBackend {
    variant: String,
    device: Device,
    windows_seen: u32,
}

impl StubBackend {
    pub fn new(variant: impl Into<String>, device: Device) -> Self {
        Self {
            variant: variant.into(),
            device,
            windows_seen: 0,
        }
    }
}

impl SpeechBackend for StubBackend {
    fn transcribe(&mut self, window: &AudioWindow, _language: &str) -> Result<Vec<Segment>> {
        if window.is_empty() {
            return Ok(vec![]);
        }

        self.windows_seen += 1;
        debug!(
            variant = %self.variant,
            device = %self.device,
            windows_seen = self.windows_seen,
            "stub transcription"
        );

        Ok(vec![Segment {
            text: format!(
                "[{}: {} samples @ {} Hz]",
                self.variant,
                window.samples.len(),
                window.sample_rate
            ),
            start: 0.0,
            end: window.duration_secs(),
            is_final: true,
        }])
    }
}

/// Factory producing `StubBackend`s.
///
/// `fail_on_gpu` simulates an accelerated device without support,
/// exercising the manager's CPU fallback path.
#[derive(Debug, Clone, Default)]
pub struct StubFactory {
    pub fail_on_gpu: bool,
}

impl BackendFactory for StubFactory {
    fn load(&self, variant: &str, device: Device) -> Result<Box<dyn SpeechBackend>> {
        if self.fail_on_gpu && device == Device::Gpu {
            return Err(VerbatimError::ModelLoad {
                variant: variant.to_string(),
                reason: "accelerated device unavailable".into(),
            });
        }
        Ok(Box::new(StubBackend::new(variant, device)))
    }
}
