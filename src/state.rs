//! Shared playback state between the host thread and the reading worker.
//!
//! Every field has a single writer:
//!
//! | field            | written by | read by        |
//! |------------------|------------|----------------|
//! | `paused`, `stop` | host       | worker, backend|
//! | `current_index`  | worker     | host           |
//! | `phase`          | worker     | host           |
//! | `active_kind`    | worker     | host           |
//!
//! `busy` is the exception: the host claims it with a compare-and-swap and
//! the worker releases it when the read is over.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backends::BackendKind;

/// Pause and stop requests, polled by the worker and by blocking backends.
#[derive(Debug, Default)]
pub struct PlaybackSignals {
    paused: AtomicBool,
    stop: AtomicBool,
}

impl PlaybackSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Sleep in `tick` increments while paused.
    ///
    /// Returns `false` if a stop was requested before or during the wait.
    pub fn wait_while_paused(&self, tick: Duration) -> bool {
        while self.is_paused() && !self.is_stop_requested() {
            thread::sleep(tick);
        }
        !self.is_stop_requested()
    }
}

/// Observable phase of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingState {
    Idle,
    Reading,
    Paused,
    Finished,
    Stopped,
    Failed,
}

impl ReadingState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Reading => 1,
            Self::Paused => 2,
            Self::Finished => 3,
            Self::Stopped => 4,
            Self::Failed => 5,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Reading,
            2 => Self::Paused,
            3 => Self::Finished,
            4 => Self::Stopped,
            5 => Self::Failed,
            _ => Self::Idle,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Stopped | Self::Failed)
    }
}

/// Per-controller state, reset at the start of every read.
#[derive(Debug)]
pub struct PlaybackState {
    pub signals: PlaybackSignals,
    current_index: AtomicUsize,
    total: AtomicUsize,
    phase: AtomicU8,
    active_kind: AtomicU8,
    busy: AtomicBool,
}

impl PlaybackState {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            signals: PlaybackSignals::new(),
            current_index: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            phase: AtomicU8::new(ReadingState::Idle.to_u8()),
            active_kind: AtomicU8::new(kind as u8),
            busy: AtomicBool::new(false),
        }
    }

    /// Claim the controller for a new read. Fails if one is in flight.
    pub(crate) fn try_begin(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self, total: usize) {
        self.signals.reset();
        self.current_index.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.set_phase(ReadingState::Reading);
    }

    pub fn current_index(&self) -> usize {
        self.current_index.load(Ordering::SeqCst)
    }

    pub(crate) fn set_current_index(&self, index: usize) {
        self.current_index.store(index, Ordering::SeqCst);
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub(crate) fn set_phase(&self, phase: ReadingState) {
        self.phase.store(phase.to_u8(), Ordering::SeqCst);
    }

    /// Current phase; a running read reports `Paused` while the pause flag is set.
    pub fn phase(&self) -> ReadingState {
        match ReadingState::from_u8(self.phase.load(Ordering::SeqCst)) {
            ReadingState::Reading if self.signals.is_paused() => ReadingState::Paused,
            phase => phase,
        }
    }

    pub fn active_kind(&self) -> BackendKind {
        BackendKind::from_u8(self.active_kind.load(Ordering::SeqCst))
    }

    pub(crate) fn set_active_kind(&self, kind: BackendKind) {
        self.active_kind.store(kind as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_is_idempotent() {
        let signals = PlaybackSignals::new();
        signals.pause();
        signals.pause();
        assert!(signals.is_paused());
        signals.resume();
        signals.resume();
        assert!(!signals.is_paused());
    }

    #[test]
    fn stop_clears_pause() {
        let signals = PlaybackSignals::new();
        signals.pause();
        signals.request_stop();
        assert!(!signals.is_paused());
        assert!(signals.is_stop_requested());
        assert!(!signals.wait_while_paused(Duration::from_millis(1)));
    }

    #[test]
    fn busy_flag_admits_one_reader() {
        let state = PlaybackState::new(BackendKind::Local);
        assert!(state.try_begin());
        assert!(!state.try_begin());
        state.release();
        assert!(state.try_begin());
    }

    #[test]
    fn phase_reports_pause_while_reading() {
        let state = PlaybackState::new(BackendKind::Remote);
        assert_eq!(state.phase(), ReadingState::Idle);
        state.reset(3);
        assert_eq!(state.phase(), ReadingState::Reading);
        state.signals.pause();
        assert_eq!(state.phase(), ReadingState::Paused);
        state.set_phase(ReadingState::Stopped);
        assert_eq!(state.phase(), ReadingState::Stopped);
        assert_eq!(state.active_kind(), BackendKind::Remote);
    }
}
