//! Typed audio window passed from the stream buffer to the transcription
//! pipeline.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Produced by draining a `StreamBuffer`; consumed exactly once by the
/// transcription pipeline and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct AudioWindow {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000).
    pub sample_rate: u32,
}

impl AudioWindow {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this window in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns the duration of this window in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.duration_secs() * 1000.0
    }

    /// Returns true if the window contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square level of the window, used by the optional
    /// silence gate.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_sample_count() {
        let window = AudioWindow::new(vec![0.0; 8_000], 16_000);
        assert!((window.duration_secs() - 0.5).abs() < 1e-9);
        assert!((window.duration_ms() - 500.0).abs() < 1e-6);
    }

    #[test]
    fn rms_of_constant_signal() {
        let window = AudioWindow::new(vec![0.5; 1_000], 16_000);
        assert!((window.rms() - 0.5).abs() < 1e-6);
        assert_eq!(AudioWindow::new(Vec::new(), 16_000).rms(), 0.0);
    }
}
