use thiserror::Error;

/// All errors produced by verbatim-core.
///
/// Every variant except `Io`/`Other` is scoped to a single operation: a
/// failed fragment, load or window never tears the session down.
#[derive(Debug, Error)]
pub enum VerbatimError {
    #[error("malformed audio payload: {0}")]
    Decode(String),

    #[error("audio codec error: {0}")]
    Codec(String),

    #[error("no model is currently loaded")]
    ModelNotLoaded,

    #[error("unknown model variant: {name}")]
    UnknownVariant { name: String },

    #[error("failed to load model '{variant}': {reason}")]
    ModelLoad { variant: String, reason: String },

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("model loader task is not running")]
    LoaderUnavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VerbatimError>;
