//! whisper.cpp backend via `whisper-rs`. Enabled with the `whisper` feature.
//!
//! Variant names map to GGUF files under a configured directory
//! (`<dir>/ggml-<variant>.bin`); `Device::Gpu` maps to whisper.cpp's GPU
//! offload flag.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::buffering::AudioWindow;
use crate::error::{Result, VerbatimError};
use crate::inference::manager::Device;
use crate::inference::{BackendFactory, SpeechBackend};
use crate::protocol::Segment;

pub struct WhisperBackend {
    context: WhisperContext,
}

impl WhisperBackend {
    pub fn load(variant: &str, model_path: &Path, device: Device) -> Result<Self> {
        let path = model_path.to_str().ok_or_else(|| VerbatimError::ModelLoad {
            variant: variant.to_string(),
            reason: format!("non-UTF8 model path: {}", model_path.display()),
        })?;
        if !model_path.exists() {
            return Err(VerbatimError::ModelLoad {
                variant: variant.to_string(),
                reason: format!("model file not found: {path}"),
            });
        }

        let mut params = WhisperContextParameters::default();
        params.use_gpu = matches!(device, Device::Gpu);

        let context =
            WhisperContext::new_with_params(path, params).map_err(|e| VerbatimError::ModelLoad {
                variant: variant.to_string(),
                reason: e.to_string(),
            })?;

        info!(variant, %device, path, "whisper model loaded");
        Ok(Self { context })
    }
}

impl SpeechBackend for WhisperBackend {
    fn transcribe(&mut self, window: &AudioWindow, language: &str) -> Result<Vec<Segment>> {
        let mut state = self
            .context
            .create_state()
            .map_err(|e| VerbatimError::Transcription(format!("state creation failed: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: 5,
            patience: -1.0,
        });
        params.set_language(Some(language));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &window.samples)
            .map_err(|e| VerbatimError::Transcription(e.to_string()))?;

        let num_segments = state.full_n_segments();
        let mut segments = Vec::with_capacity(num_segments as usize);
        for i in 0..num_segments {
            let Some(segment) = state.get_segment(i) else {
                continue;
            };
            let text = segment
                .to_str()
                .map_err(|e| VerbatimError::Transcription(format!("segment text: {e}")))?
                .trim()
                .to_string();
            if text.is_empty() {
                continue;
            }
            // whisper.cpp timestamps are centiseconds.
            segments.push(Segment {
                text,
                start: segment.start_timestamp() as f64 / 100.0,
                end: segment.end_timestamp() as f64 / 100.0,
                is_final: true,
            });
        }

        debug!(count = segments.len(), "whisper window transcribed");
        Ok(segments)
    }
}

/// Factory mapping catalog variants to `ggml-<variant>.bin` files.
#[derive(Debug, Clone)]
pub struct WhisperFactory {
    models_dir: PathBuf,
}

impl WhisperFactory {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    fn model_path(&self, variant: &str) -> PathBuf {
        self.models_dir.join(format!("ggml-{variant}.bin"))
    }
}

impl BackendFactory for WhisperFactory {
    fn load(&self, variant: &str, device: Device) -> Result<Box<dyn SpeechBackend>> {
        WhisperBackend::load(variant, &self.model_path(variant), device)
            .map(|backend| Box::new(backend) as Box<dyn SpeechBackend>)
    }
}
