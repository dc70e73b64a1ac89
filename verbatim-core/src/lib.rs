//! # verbatim-core
//!
//! Streaming speech-to-text session engine.
//!
//! ## Architecture
//!
//! ```text
//! WebSocket fragment → Session → SampleNormalizer → StreamBuffer
//!                         │                             │ window ready
//!                         │                             ▼
//!                         │             TranscriptionPipeline (spawn_blocking)
//!                         │                             │
//!                         ▼                             ▼
//!                mpsc::UnboundedSender<ServerMessage> ◄─┘
//! ```
//!
//! Messages are dispatched in arrival order per session; container decoding,
//! model inference and variant loads complete off the control path so the
//! reader loop never stalls.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod inference;
pub mod protocol;
pub mod session;

// Convenience re-exports for downstream crates
pub use audio::SampleNormalizer;
pub use buffering::{AudioWindow, StreamBuffer};
pub use engine::{SegmentEvent, TranscriptionPipeline};
pub use error::VerbatimError;
pub use inference::manager::{BackendDescriptor, BackendManager, Device, ModelChange};
pub use inference::{BackendFactory, BackendHandle, SpeechBackend};
pub use protocol::{AudioData, ClientMessage, Segment, ServerMessage};
pub use session::{Session, SessionConfig, SessionState};

#[cfg(feature = "whisper")]
pub use inference::whisper::{WhisperBackend, WhisperFactory};
