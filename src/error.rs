//! Error types shared by the extractor, the speech backends and the controller.

use std::path::PathBuf;

/// Everything that can go wrong while loading a document or reading it aloud.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// The source document could not be opened or parsed.
    #[error("Failed to extract text from {}: {reason}", .path.display())]
    Extraction { path: PathBuf, reason: String },

    /// No speech backend could be constructed.
    #[error("No usable speech backend: {0}")]
    Initialization(String),

    /// The speech service could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend failed to turn text into speech.
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    /// Synthesized audio could not be played.
    #[error("Audio playback failed: {0}")]
    Playback(String),

    /// A reading is already in progress on this controller.
    #[error("A reading is already in progress")]
    Busy,

    /// A page number typed by the user was rejected.
    #[error("Invalid page selection: {0}")]
    InvalidPage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    pub fn extraction(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Extraction {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the controller may recover from this error by switching to the
    /// local backend.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Synthesis(_) | Self::Playback(_) | Self::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;
