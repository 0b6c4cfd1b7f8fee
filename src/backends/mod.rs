pub mod espeak;
pub mod remote;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config_loader::Settings;
use crate::error::{ReaderError, Result};
use crate::language::Language;
use crate::network;
use crate::segmenter::Sentence;
use crate::state::PlaybackSignals;

pub use espeak::EspeakBackend;
pub use remote::RemoteBackend;

/// Which kind of engine turns text into sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BackendKind {
    /// Online synthesis played back through the local audio output.
    Remote = 0,
    /// Offline synthesis speaking directly to the sound card.
    Local = 1,
}

impl BackendKind {
    pub(crate) fn from_u8(value: u8) -> Self {
        if value == Self::Remote as u8 {
            Self::Remote
        } else {
            Self::Local
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => f.write_str("online"),
            Self::Local => f.write_str("offline"),
        }
    }
}

/// Snapshot of the active engine, shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub kind: BackendKind,
    pub is_reachable: bool,
    pub quality_label: String,
}

/// Represents a text-to-speech voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
}

/// Trait that both speech engines implement.
///
/// The controller holds the active engine as `Arc<dyn SpeechBackend>` and
/// calls `speak_one` from its worker thread while the host thread may call
/// `stop_immediately`, `set_speed` and `set_volume` concurrently.
pub trait SpeechBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Speak one sentence, blocking until it has been heard in full, or until
    /// `signals` asks for a stop.
    fn speak_one(
        &self,
        sentence: &Sentence,
        language: Language,
        signals: &PlaybackSignals,
    ) -> Result<()>;

    /// Speed factor, 1.0 being the engine's normal rate.
    fn set_speed(&self, factor: f32);

    /// Volume level between 0.0 and 1.0; out-of-range values are clamped.
    fn set_volume(&self, level: f32);

    /// Interrupt whatever `speak_one` is doing right now.
    fn stop_immediately(&self);

    fn status(&self) -> BackendStatus;

    /// Voices this engine can switch between.
    fn list_voices(&self) -> Result<Vec<Voice>>;

    fn set_voice(&self, voice_id: &str) -> Result<()>;
}

/// Clamp a volume level into `[0.0, 1.0]`, mapping NaN to silence.
pub fn clamp_volume(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

/// Clamp a speed factor into the `[0.5, 2.0]` range offered to users.
pub fn clamp_speed(factor: f32) -> f32 {
    if factor.is_nan() {
        1.0
    } else {
        factor.clamp(0.5, 2.0)
    }
}

/// Probe the configured address; the result is reported in [`BackendStatus`].
pub fn probe_network(settings: &Settings) -> bool {
    network::probe_reachability(&settings.probe_address, settings.probe_timeout())
}

/// Build the offline engine. `reachable` is the latest probe result.
pub fn local_backend(settings: &Settings, reachable: bool) -> Result<Arc<dyn SpeechBackend>> {
    Ok(Arc::new(EspeakBackend::new(settings, reachable)?))
}

/// Pick the engine to start with.
///
/// The online engine is tried only when the reachability probe succeeds;
/// any failure to build it falls through to the offline engine.
pub fn select_backend(settings: &Settings) -> Result<Arc<dyn SpeechBackend>> {
    let reachable = probe_network(settings);
    if settings.remote_enabled {
        if reachable {
            match RemoteBackend::new(settings, reachable) {
                Ok(backend) => {
                    tracing::info!("Online speech synthesis enabled");
                    return Ok(Arc::new(backend));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Online engine unavailable, using espeak-ng");
                }
            }
        } else {
            tracing::info!("Network unreachable, using espeak-ng");
        }
    }

    local_backend(settings, reachable).map_err(|e| {
        ReaderError::Initialization(format!("no speech engine could be started: {}", e))
    })
}
