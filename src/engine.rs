//! The read-aloud controller.
//!
//! A read runs on one worker thread and moves through these states:
//!
//! ```text
//!   Idle → Reading ⇄ Paused
//!             │
//!             ├──→ Finished   (every sentence spoken)
//!             ├──→ Stopped    (stop() called)
//!             └──→ Failed     (fallback exhausted)
//! ```
//!
//! The host thread only touches the pause/stop flags and the live speed and
//! volume; everything else is written by the worker.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::backends::{
    self, clamp_speed, clamp_volume, BackendKind, BackendStatus, SpeechBackend, Voice,
};
use crate::config_loader::Settings;
use crate::error::{ReaderError, Result};
use crate::language;
use crate::segmenter::{self, Sentence};
use crate::state::{PlaybackState, ReadingState};

/// Builds the offline engine when the active one fails mid-read.
pub type BackendFactory = Box<dyn Fn() -> Result<Arc<dyn SpeechBackend>> + Send + Sync>;

/// What the worker reports back while reading.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Fraction of sentences spoken so far, in `(0, 1]`.
    Progress(f32),
    /// The engine was replaced after a failure.
    BackendChanged(BackendStatus),
    Finished,
    Stopped,
    Failed(String),
}

impl PlaybackEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Stopped | Self::Failed(_))
    }
}

/// One "read" invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub text: String,
    pub speed: f32,
    pub volume: f32,
}

impl PlaybackRequest {
    /// Speed is clamped to `[0.5, 2.0]` and volume to `[0.0, 1.0]`.
    pub fn new(text: impl Into<String>, speed: f32, volume: f32) -> Self {
        Self {
            text: text.into(),
            speed: clamp_speed(speed),
            volume: clamp_volume(volume),
        }
    }
}

/// Shared between the controller handle and its worker.
struct Shared {
    state: PlaybackState,
    backend: Mutex<Arc<dyn SpeechBackend>>,
    fallback: BackendFactory,
    poll_interval: Duration,
    speed_bits: AtomicU32,
    volume_bits: AtomicU32,
    voice: Mutex<Option<String>>,
}

impl Shared {
    fn lock_backend(&self) -> MutexGuard<'_, Arc<dyn SpeechBackend>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_backend(&self) -> Arc<dyn SpeechBackend> {
        Arc::clone(&self.lock_backend())
    }

    fn speed(&self) -> f32 {
        f32::from_bits(self.speed_bits.load(Ordering::SeqCst))
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::SeqCst))
    }

    fn voice(&self) -> Option<String> {
        self.voice.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap in `replacement` with the current live settings applied.
    fn install(&self, replacement: Arc<dyn SpeechBackend>) {
        let mut active = self.lock_backend();
        replacement.set_speed(self.speed());
        replacement.set_volume(self.volume());
        if let Some(voice) = self.voice() {
            if let Err(e) = replacement.set_voice(&voice) {
                tracing::warn!(voice, error = %e, "Fallback engine rejected the chosen voice");
            }
        }
        *active = replacement;
    }
}

enum Outcome {
    Finished,
    Stopped,
    Failed(ReaderError),
}

/// Drives sentence-by-sentence playback against the active speech engine.
pub struct PlaybackController {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackController {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        fallback: BackendFactory,
        poll_interval: Duration,
    ) -> Self {
        let kind = backend.kind();
        Self {
            shared: Arc::new(Shared {
                state: PlaybackState::new(kind),
                backend: Mutex::new(backend),
                fallback,
                poll_interval,
                speed_bits: AtomicU32::new(1.0f32.to_bits()),
                volume_bits: AtomicU32::new(0.8f32.to_bits()),
                voice: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Select the starting engine from `settings` and use espeak-ng as the
    /// fallback.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let backend = backends::select_backend(settings)?;
        let fallback_settings = settings.clone();
        let controller = Self::new(
            backend,
            Box::new(move || {
                let reachable = backends::probe_network(&fallback_settings);
                backends::local_backend(&fallback_settings, reachable)
            }),
            settings.poll_interval(),
        );
        controller.set_speed_live(settings.default_speed);
        controller.set_volume_live(settings.default_volume);
        Ok(controller)
    }

    /// Start reading `request` on the worker thread.
    ///
    /// `on_event` is called from the worker; hosts that must not be touched
    /// from another thread should forward the events into a channel.
    pub fn read_text<F>(&self, request: PlaybackRequest, on_event: F) -> Result<()>
    where
        F: Fn(PlaybackEvent) + Send + 'static,
    {
        if !self.shared.state.try_begin() {
            return Err(ReaderError::Busy);
        }
        // The previous worker has released the busy flag, so this join is short.
        self.join_worker();

        let sentences = segmenter::split(&request.text);
        self.shared.state.reset(sentences.len());
        self.set_speed_live(request.speed);
        self.set_volume_live(request.volume);

        tracing::info!(sentences = sentences.len(), "Starting read-aloud");

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("read-aloud".to_string())
            .spawn(move || {
                let outcome = run(&shared, &sentences, &on_event);
                let event = match outcome {
                    Outcome::Finished => {
                        shared.state.set_phase(ReadingState::Finished);
                        PlaybackEvent::Finished
                    }
                    Outcome::Stopped => {
                        shared.state.set_phase(ReadingState::Stopped);
                        PlaybackEvent::Stopped
                    }
                    Outcome::Failed(e) => {
                        tracing::error!(error = %e, "Read-aloud failed");
                        shared.state.set_phase(ReadingState::Failed);
                        PlaybackEvent::Failed(e.to_string())
                    }
                };
                shared.state.release();
                on_event(event);
            });

        match spawned {
            Ok(handle) => {
                *self.lock_worker() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.state.set_phase(ReadingState::Idle);
                self.shared.state.release();
                Err(e.into())
            }
        }
    }

    pub fn pause(&self) {
        self.shared.state.signals.pause();
    }

    pub fn resume(&self) {
        self.shared.state.signals.resume();
    }

    /// Stop reading; the worker notices within one poll interval.
    pub fn stop(&self) {
        self.shared.state.signals.request_stop();
        self.shared.active_backend().stop_immediately();
    }

    /// Applies from the next sentence on.
    pub fn set_speed_live(&self, factor: f32) {
        let factor = clamp_speed(factor);
        self.shared.speed_bits.store(factor.to_bits(), Ordering::SeqCst);
        self.shared.lock_backend().set_speed(factor);
    }

    /// Applies from the next clip on, or immediately for the online engine.
    pub fn set_volume_live(&self, level: f32) {
        let level = clamp_volume(level);
        self.shared.volume_bits.store(level.to_bits(), Ordering::SeqCst);
        self.shared.lock_backend().set_volume(level);
    }

    pub fn speed(&self) -> f32 {
        self.shared.speed()
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume()
    }

    pub fn state(&self) -> ReadingState {
        self.shared.state.phase()
    }

    pub fn current_index(&self) -> usize {
        self.shared.state.current_index()
    }

    pub fn total(&self) -> usize {
        self.shared.state.total()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.state.is_busy()
    }

    pub fn active_kind(&self) -> BackendKind {
        self.shared.state.active_kind()
    }

    pub fn status(&self) -> BackendStatus {
        self.shared.active_backend().status()
    }

    pub fn list_voices(&self) -> Result<Vec<Voice>> {
        self.shared.active_backend().list_voices()
    }

    /// Select a voice on the active engine. The choice is kept and applied
    /// again to the fallback engine if one is installed.
    pub fn set_voice(&self, voice_id: &str) -> Result<()> {
        self.shared.active_backend().set_voice(voice_id)?;
        *self.shared.voice.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(voice_id.to_string());
        Ok(())
    }

    pub fn voice(&self) -> Option<String> {
        self.shared.voice()
    }

    /// Block until the current worker, if any, has exited.
    pub fn wait(&self) {
        self.join_worker();
    }

    fn join_worker(&self) {
        let handle = self.lock_worker().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Read-aloud worker panicked");
            }
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if self.is_busy() {
            self.stop();
        }
        self.join_worker();
    }
}

/// The worker loop.
fn run<F>(shared: &Shared, sentences: &[Sentence], on_event: &F) -> Outcome
where
    F: Fn(PlaybackEvent),
{
    let state = &shared.state;
    let signals = &state.signals;
    let total = sentences.len();
    let mut backend = shared.active_backend();
    let mut fell_back = false;
    let mut index = 0;

    while index < total {
        if signals.is_stop_requested() {
            return Outcome::Stopped;
        }
        if !signals.wait_while_paused(shared.poll_interval) {
            return Outcome::Stopped;
        }

        let sentence = &sentences[index];
        let language = language::guess(sentence.as_str());
        tracing::debug!(
            index,
            language = %language,
            backend = %backend.kind(),
            "Speaking sentence"
        );

        match backend.speak_one(sentence, language, signals) {
            Ok(()) => {
                // An interrupted sentence does not count as spoken
                if signals.is_stop_requested() {
                    return Outcome::Stopped;
                }
                index += 1;
                state.set_current_index(index);
                on_event(PlaybackEvent::Progress(index as f32 / total as f32));
            }
            Err(_) if signals.is_stop_requested() => return Outcome::Stopped,
            Err(e) if fell_back || !e.is_recoverable() => return Outcome::Failed(e),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    index,
                    backend = %backend.kind(),
                    "Speech failed, falling back to espeak-ng"
                );
                fell_back = true;

                if backend.kind() == BackendKind::Remote {
                    match (shared.fallback)() {
                        Ok(replacement) => {
                            shared.install(Arc::clone(&replacement));
                            backend = replacement;
                        }
                        Err(init) => return Outcome::Failed(init),
                    }
                }
                state.set_active_kind(BackendKind::Local);
                on_event(PlaybackEvent::BackendChanged(backend.status()));
                // Retry the same sentence with the new engine
            }
        }
    }

    Outcome::Finished
}
