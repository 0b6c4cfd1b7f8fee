//! Blocking clip playback through the default audio output, via `rodio`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use crate::backends::clamp_volume;
use crate::error::{ReaderError, Result};
use crate::state::PlaybackSignals;

/// Plays one audio clip at a time and blocks until it is done.
pub struct AudioPlayer {
    handle: OutputStreamHandle,
    /// Dropping this sender lets the audio thread close the output stream.
    _keepalive: Sender<()>,
    current: Mutex<Option<Arc<Sink>>>,
    volume_bits: AtomicU32,
}

impl AudioPlayer {
    /// Open the default output device.
    pub fn new(volume: f32) -> Result<Self> {
        let (handle_tx, handle_rx) = channel();
        let (keepalive_tx, keepalive_rx) = channel::<()>();

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                // Audio stream must live on this thread
                match OutputStream::try_default() {
                    Ok((_stream, handle)) => {
                        if handle_tx.send(Ok(handle)).is_err() {
                            return;
                        }
                        // Blocks until the player is dropped
                        while keepalive_rx.recv().is_ok() {}
                        tracing::debug!("Audio output closed");
                    }
                    Err(e) => {
                        let _ = handle_tx.send(Err(e.to_string()));
                    }
                }
            })?;

        let handle = handle_rx
            .recv()
            .map_err(|e| ReaderError::Initialization(format!("audio thread exited: {}", e)))?
            .map_err(|e| ReaderError::Initialization(format!("no audio output device: {}", e)))?;

        tracing::info!("Audio playback initialized on default output device");

        Ok(Self {
            handle,
            _keepalive: keepalive_tx,
            current: Mutex::new(None),
            volume_bits: AtomicU32::new(clamp_volume(volume).to_bits()),
        })
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::SeqCst))
    }

    /// Set playback volume for the current clip and every later one.
    pub fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        self.volume_bits.store(volume.to_bits(), Ordering::SeqCst);
        if let Some(sink) = self.current_sink() {
            sink.set_volume(volume);
        }
    }

    /// Decode and play the clip at `path`, returning once it has drained.
    ///
    /// Every `tick` the sink follows the pause flag; a stop request ends the
    /// clip early and returns `Ok`.
    pub fn play_file(&self, path: &Path, signals: &PlaybackSignals, tick: Duration) -> Result<()> {
        let file = File::open(path)?;
        let source = Decoder::new(BufReader::new(file))
            .map_err(|e| ReaderError::Playback(format!("failed to decode clip: {}", e)))?;
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| ReaderError::Playback(format!("failed to create sink: {}", e)))?;
        sink.set_volume(self.volume());
        sink.append(source);

        let sink = Arc::new(sink);
        *self.lock_current() = Some(Arc::clone(&sink));

        while !sink.empty() {
            if signals.is_stop_requested() {
                sink.stop();
                break;
            }
            if signals.is_paused() {
                if !sink.is_paused() {
                    sink.pause();
                }
            } else if sink.is_paused() {
                sink.play();
            }
            thread::sleep(tick);
        }

        self.lock_current().take();
        Ok(())
    }

    /// Stop the clip that is playing, if any.
    pub fn stop(&self) {
        if let Some(sink) = self.lock_current().take() {
            sink.stop();
            tracing::debug!("Audio playback stopped");
        }
    }

    fn current_sink(&self) -> Option<Arc<Sink>> {
        self.lock_current().clone()
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<Arc<Sink>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
