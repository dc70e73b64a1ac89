use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use verbatim_core::{Device, SessionConfig};

/// Verbatim server configuration (CLI flags with env fallbacks).
#[derive(Parser, Debug, Clone)]
#[command(name = "verbatim")]
#[command(about = "Streaming speech-to-text WebSocket server", long_about = None)]
pub struct Config {
    /// Socket address to bind
    #[arg(long, env = "VERBATIM_BIND", default_value = "0.0.0.0:6541")]
    pub bind: SocketAddr,

    /// Model variant preloaded at startup
    #[arg(long, env = "VERBATIM_DEFAULT_MODEL", default_value = "small")]
    pub default_model: String,

    /// Target sample rate for normalized audio (Hz)
    #[arg(long, env = "VERBATIM_SAMPLE_RATE", default_value = "16000")]
    pub target_sample_rate: u32,

    /// Audio accumulated per session before a transcription pass (ms)
    #[arg(long, env = "VERBATIM_WINDOW_MS", default_value = "5000")]
    pub window_ms: f64,

    /// Language hint passed to the backend
    #[arg(long, env = "VERBATIM_LANGUAGE", default_value = "en")]
    pub language: String,

    /// Preferred compute device (gpu|cpu)
    #[arg(long, env = "VERBATIM_DEVICE", default_value = "cpu", value_parser = parse_device)]
    pub device: Device,

    /// Upper bound on one transcription call in seconds (0 = unlimited)
    #[arg(long, env = "VERBATIM_TRANSCRIBE_TIMEOUT_SECS", default_value = "0")]
    pub transcribe_timeout_secs: u64,

    /// Skip windows quieter than this RMS level (0 = transcribe everything)
    #[arg(long, env = "VERBATIM_MIN_WINDOW_RMS", default_value = "0.0")]
    pub min_window_rms: f32,

    /// Directory holding whisper GGUF model files
    #[cfg(feature = "whisper")]
    #[arg(long, env = "VERBATIM_MODELS_DIR", default_value = "models")]
    pub models_dir: std::path::PathBuf,
}

fn parse_device(value: &str) -> Result<Device, String> {
    match value.to_ascii_lowercase().as_str() {
        "gpu" | "cuda" => Ok(Device::Gpu),
        "cpu" => Ok(Device::Cpu),
        other => Err(format!("unknown device '{other}' (expected gpu or cpu)")),
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.target_sample_rate == 0 {
            return Err("target_sample_rate must be greater than 0".to_string());
        }

        if self.window_ms <= 0.0 {
            return Err("window_ms must be greater than 0".to_string());
        }

        if self.min_window_rms < 0.0 {
            return Err("min_window_rms must not be negative".to_string());
        }

        if self.language.trim().is_empty() {
            return Err("language must not be empty".to_string());
        }

        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            target_sample_rate: self.target_sample_rate,
            target_window_ms: self.window_ms,
            language: self.language.clone(),
            min_window_rms: (self.min_window_rms > 0.0).then_some(self.min_window_rms),
        }
    }

    pub fn transcribe_timeout(&self) -> Option<Duration> {
        (self.transcribe_timeout_secs > 0).then(|| Duration::from_secs(self.transcribe_timeout_secs))
    }
}
