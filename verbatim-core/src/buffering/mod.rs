//! Per-session accumulation of normalized samples into fixed-duration
//! windows.
//!
//! Fragments arrive in arbitrary sizes; the buffer appends them in arrival
//! order and reports readiness once at least `target_window_ms` worth of
//! audio has accumulated. Draining extracts the whole accumulation as one
//! window and clears the buffer atomically — a window may overshoot the
//! target by up to the size of the last fragment, it is never split.

pub mod chunk;

pub use chunk::AudioWindow;

/// Default window length before a transcription pass is triggered.
pub const DEFAULT_WINDOW_MS: f64 = 5_000.0;

/// Append-only sample accumulator for one session.
#[derive(Debug)]
pub struct StreamBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    target_window_ms: f64,
}

impl StreamBuffer {
    pub fn new(sample_rate: u32, target_window_ms: f64) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            target_window_ms,
        }
    }

    /// Append one normalized fragment.
    pub fn push(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    /// Current accumulation in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        (self.samples.len() as f64 / self.sample_rate as f64) * 1000.0
    }

    /// True once at least the target window duration has accumulated.
    pub fn is_ready(&self) -> bool {
        self.duration_ms() >= self.target_window_ms
    }

    /// Extract the accumulated samples as one window, clearing the buffer.
    ///
    /// This is the only way accumulated data is consumed; no sample is ever
    /// replayed after a drain.
    pub fn drain(&mut self) -> AudioWindow {
        AudioWindow::new(std::mem::take(&mut self.samples), self.sample_rate)
    }

    /// Discard all accumulated samples.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
