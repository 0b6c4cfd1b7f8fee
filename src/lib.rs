//! readaloud: read PDF documents aloud.
//!
//! Text comes out of [`document`], is cut into sentences by [`segmenter`],
//! and is spoken one sentence at a time by the [`engine::PlaybackController`]
//! through either the online or the espeak-ng [`backends`].

pub mod backends;
pub mod config_loader;
pub mod document;
pub mod engine;
pub mod error;
pub mod language;
pub mod network;
pub mod playback;
pub mod segmenter;
pub mod shell;
pub mod state;

pub use engine::{PlaybackController, PlaybackEvent, PlaybackRequest};
pub use error::{ReaderError, Result};
