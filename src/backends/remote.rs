use super::{BackendKind, BackendStatus, SpeechBackend, Voice};
use crate::config_loader::Settings;
use crate::error::{ReaderError, Result};
use crate::language::Language;
use crate::playback::AudioPlayer;
use crate::segmenter::Sentence;
use crate::state::PlaybackSignals;

use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

/// The translate TTS endpoint refuses longer `q` values.
const MAX_REQUEST_CHARS: usize = 200;

const USER_AGENT: &str = concat!("readaloud/", env!("CARGO_PKG_VERSION"));

/// HTTP side of the online engine: one GET per chunk, MP3 bytes back.
pub(crate) struct SpeechClient {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl SpeechClient {
    pub(crate) fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ReaderError::Initialization(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub(crate) fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("q", text),
                ("tl", language.code()),
                ("client", "tw-ob"),
            ])
            .send()
            .map_err(classify_request_error)?
            .error_for_status()
            .map_err(|e| ReaderError::Synthesis(format!("speech service refused request: {}", e)))?;

        let audio = response.bytes().map_err(classify_request_error)?;
        if audio.is_empty() {
            return Err(ReaderError::Synthesis(
                "speech service returned no audio".to_string(),
            ));
        }
        Ok(audio.to_vec())
    }
}

/// Write `audio` to a temporary `.mp3` file that is deleted on [`discard_clip`].
fn write_clip(audio: &[u8]) -> Result<NamedTempFile> {
    let mut clip = tempfile::Builder::new()
        .prefix("readaloud-")
        .suffix(".mp3")
        .tempfile()
        .map_err(|e| ReaderError::Playback(format!("temporary clip: {}", e)))?;
    clip.write_all(audio)
        .and_then(|()| clip.flush())
        .map_err(|e| ReaderError::Playback(format!("temporary clip: {}", e)))?;
    Ok(clip)
}

fn discard_clip(clip: NamedTempFile) {
    let path = clip.path().to_path_buf();
    if let Err(e) = clip.close() {
        tracing::debug!(path = %path.display(), error = %e, "Could not delete temporary clip");
    }
}

/// Online synthesis: fetch an MP3 clip per chunk of text and play it locally.
pub struct RemoteBackend {
    speech: SpeechClient,
    player: AudioPlayer,
    poll_interval: Duration,
    reachable: bool,
}

impl RemoteBackend {
    /// `reachable` is the network probe result shown in [`BackendStatus`].
    pub fn new(settings: &Settings, reachable: bool) -> Result<Self> {
        let speech = SpeechClient::new(&settings.remote_tts_url, settings.remote_timeout())?;
        let player = AudioPlayer::new(settings.default_volume)?;

        Ok(Self {
            speech,
            player,
            poll_interval: settings.poll_interval(),
            reachable,
        })
    }

    fn play_clip(&self, audio: &[u8], signals: &PlaybackSignals) -> Result<()> {
        let clip = write_clip(audio)?;
        let played = self
            .player
            .play_file(clip.path(), signals, self.poll_interval);
        discard_clip(clip);
        played
    }
}

fn classify_request_error(error: reqwest::Error) -> ReaderError {
    if error.is_connect() || error.is_timeout() {
        ReaderError::Network(error.to_string())
    } else {
        ReaderError::Synthesis(error.to_string())
    }
}

/// Cut `text` into pieces of at most `limit` characters, on word boundaries
/// where possible.
pub(crate) fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();

        if !current.is_empty() && current_len + 1 + word_len > limit {
            chunks.push(std::mem::take(&mut current));
        }

        if word_len > limit {
            // A single word longer than the limit is cut hard
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

impl SpeechBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn speak_one(
        &self,
        sentence: &Sentence,
        language: Language,
        signals: &PlaybackSignals,
    ) -> Result<()> {
        for chunk in chunk_text(sentence.as_str(), MAX_REQUEST_CHARS) {
            if signals.is_stop_requested() {
                break;
            }
            tracing::debug!(language = %language, chars = chunk.len(), "Requesting online synthesis");
            let audio = self.speech.synthesize(&chunk, language)?;
            self.play_clip(&audio, signals)?;
        }
        Ok(())
    }

    fn set_speed(&self, _factor: f32) {
        // The online service only offers a fixed speaking rate.
    }

    fn set_volume(&self, level: f32) {
        self.player.set_volume(level);
    }

    fn stop_immediately(&self) {
        self.player.stop();
    }

    fn status(&self) -> BackendStatus {
        BackendStatus {
            kind: BackendKind::Remote,
            is_reachable: self.reachable,
            quality_label: "High (online synthesis)".to_string(),
        }
    }

    fn list_voices(&self) -> Result<Vec<Voice>> {
        Ok(vec![
            Voice {
                id: Language::French.code().to_string(),
                name: "Online French".to_string(),
                language: Language::French.code().to_string(),
            },
            Voice {
                id: Language::English.code().to_string(),
                name: "Online English".to_string(),
                language: Language::English.code().to_string(),
            },
        ])
    }

    fn set_voice(&self, voice_id: &str) -> Result<()> {
        // The voice follows the language guessed for each sentence.
        tracing::warn!(voice_id, "Online engine picks its voice per sentence; ignoring");
        Ok(())
    }
}
