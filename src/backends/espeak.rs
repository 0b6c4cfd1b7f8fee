use super::{clamp_volume, BackendKind, BackendStatus, SpeechBackend, Voice};
use crate::config_loader::Settings;
use crate::error::{ReaderError, Result};
use crate::language::Language;
use crate::segmenter::Sentence;
use crate::state::PlaybackSignals;

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

const BASE_RATE_WPM: f32 = 150.0;
const MIN_RATE_WPM: f32 = 50.0;
const MAX_RATE_WPM: f32 = 300.0;
const DEFAULT_VOLUME: f32 = 0.8;
/// How long a killed espeak-ng process gets to exit before we give up on it.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Words per minute for a speed factor: `round(clamp(150 × factor, 50, 300))`.
pub fn rate_for_speed(factor: f32) -> u32 {
    let factor = if factor.is_nan() { 1.0 } else { factor };
    (BASE_RATE_WPM * factor).clamp(MIN_RATE_WPM, MAX_RATE_WPM).round() as u32
}

/// Insert a space after `,`, `;` and `:` so the synthesizer pauses there.
pub fn add_pause_spacing(text: &str) -> String {
    let mut spaced = String::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        spaced.push(c);
        if matches!(c, ',' | ';' | ':') && chars.peek().is_some_and(|next| !next.is_whitespace()) {
            spaced.push(' ');
        }
    }
    spaced
}

/// Pitch factor suggested by a sentence's closing punctuation.
pub fn pitch_for(sentence: &Sentence) -> f32 {
    match sentence.terminator() {
        Some('?') => 1.1,
        Some('!') => 1.05,
        _ => 1.0,
    }
}

/// Parse the table printed by `espeak-ng --voices`.
pub fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // Pty Language Age/Gender VoiceName File [Other Languages]
            if fields.len() < 5 {
                return None;
            }
            Some(Voice {
                id: fields[1].to_string(),
                name: fields[3].replace('_', " "),
                language: fields[1].to_string(),
            })
        })
        .collect()
}

fn is_french(voice: &Voice) -> bool {
    Language::from_code(&voice.language) == Some(Language::French)
        || voice.name.to_lowercase().contains("french")
}

/// Metropolitan French (`fr` or `fr-fr`) if installed, else any French voice.
fn pick_french(voices: &[Voice]) -> Option<&Voice> {
    voices
        .iter()
        .find(|v| {
            let id = v.id.to_ascii_lowercase();
            id == "fr" || id == "fr-fr"
        })
        .or_else(|| voices.iter().find(|v| is_french(v)))
}

/// Kill `child` and wait a bounded time for it to exit.
fn reap(mut child: Child) {
    let _ = child.kill();
    match child.wait_timeout(REAP_TIMEOUT) {
        Ok(Some(_)) => {}
        Ok(None) => tracing::warn!(pid = child.id(), "espeak-ng did not exit after kill"),
        Err(e) => tracing::warn!(error = %e, "Failed to reap espeak-ng"),
    }
}

/// Offline synthesis through the `espeak-ng` command, played by espeak itself.
pub struct EspeakBackend {
    binary: String,
    rate_wpm: AtomicU32,
    volume_bits: AtomicU32,
    voice: Mutex<Option<String>>,
    child: Mutex<Option<Child>>,
    timeout: Duration,
    poll_interval: Duration,
    reachable: bool,
}

impl EspeakBackend {
    /// `reachable` is the network probe result shown in [`BackendStatus`].
    pub fn new(settings: &Settings, reachable: bool) -> Result<Self> {
        let backend = Self {
            binary: settings.espeak_binary.clone(),
            rate_wpm: AtomicU32::new(rate_for_speed(1.0)),
            volume_bits: AtomicU32::new(DEFAULT_VOLUME.to_bits()),
            voice: Mutex::new(None),
            child: Mutex::new(None),
            timeout: settings.espeak_timeout(),
            poll_interval: settings.poll_interval(),
            reachable,
        };

        let voices = backend.list_voices().map_err(|e| {
            ReaderError::Initialization(format!("{} is not usable: {}", backend.binary, e))
        })?;
        if let Some(french) = pick_french(&voices) {
            tracing::info!(voice = %french.id, "Using French espeak-ng voice");
            *backend.lock_voice() = Some(french.id.clone());
        } else {
            tracing::info!("No French voice installed, using espeak-ng default");
        }
        Ok(backend)
    }

    pub fn rate_wpm(&self) -> u32 {
        self.rate_wpm.load(Ordering::SeqCst)
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::SeqCst))
    }

    pub fn voice(&self) -> Option<String> {
        self.lock_voice().clone()
    }

    /// Extension point for intonation. espeak-ng is driven without pitch
    /// control here, so this has no audible effect.
    fn adjust_pitch(&self, _factor: f32) {}

    fn spawn(&self, text: &str) -> Result<Child> {
        let amplitude = (self.volume() * 100.0).round() as u32;

        let mut command = Command::new(&self.binary);
        command
            .arg("-s")
            .arg(self.rate_wpm().to_string())
            .arg("-a")
            .arg(amplitude.to_string());
        // Without a selected voice espeak-ng uses its own default
        if let Some(voice) = self.voice() {
            command.arg("-v").arg(voice);
        }
        command
            .arg("--")
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReaderError::Synthesis(format!("failed to run {}: {}", self.binary, e)))
    }

    fn lock_voice(&self) -> MutexGuard<'_, Option<String>> {
        self.voice.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SpeechBackend for EspeakBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn speak_one(
        &self,
        sentence: &Sentence,
        language: Language,
        signals: &PlaybackSignals,
    ) -> Result<()> {
        let text = add_pause_spacing(sentence.as_str());
        self.adjust_pitch(pitch_for(sentence));
        tracing::debug!(language = %language, voice = ?self.voice(), "Running espeak-ng");

        *self.lock_child() = Some(self.spawn(&text)?);
        let started = Instant::now();

        loop {
            {
                let mut guard = self.lock_child();
                let Some(child) = guard.as_mut() else {
                    // stop_immediately reaped the process
                    return Ok(());
                };

                if let Some(status) = child.try_wait()? {
                    let mut stderr = String::new();
                    if let Some(mut pipe) = child.stderr.take() {
                        let _ = pipe.read_to_string(&mut stderr);
                    }
                    guard.take();
                    if status.success() || signals.is_stop_requested() {
                        return Ok(());
                    }
                    return Err(ReaderError::Synthesis(format!(
                        "espeak error: {}",
                        stderr.trim()
                    )));
                }

                if signals.is_stop_requested() {
                    let child = guard.take();
                    drop(guard);
                    if let Some(child) = child {
                        reap(child);
                    }
                    return Ok(());
                }

                if started.elapsed() > self.timeout {
                    let child = guard.take();
                    drop(guard);
                    if let Some(child) = child {
                        reap(child);
                    }
                    return Err(ReaderError::Synthesis(format!(
                        "espeak-ng timed out after {:?}",
                        self.timeout
                    )));
                }
            }
            // Sleep unlocked so stop_immediately never waits on us
            thread::sleep(self.poll_interval);
        }
    }

    fn set_speed(&self, factor: f32) {
        self.rate_wpm.store(rate_for_speed(factor), Ordering::SeqCst);
    }

    fn set_volume(&self, level: f32) {
        self.volume_bits
            .store(clamp_volume(level).to_bits(), Ordering::SeqCst);
    }

    fn stop_immediately(&self) {
        let child = self.lock_child().take();
        if let Some(child) = child {
            reap(child);
            tracing::debug!("espeak-ng interrupted");
        }
    }

    fn status(&self) -> BackendStatus {
        BackendStatus {
            kind: BackendKind::Local,
            is_reachable: self.reachable,
            quality_label: "Standard (espeak-ng)".to_string(),
        }
    }

    fn list_voices(&self) -> Result<Vec<Voice>> {
        let output = Command::new(&self.binary).arg("--voices").output()?;
        if !output.status.success() {
            return Err(ReaderError::Synthesis(format!(
                "espeak error: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn set_voice(&self, voice_id: &str) -> Result<()> {
        *self.lock_voice() = Some(voice_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOICES: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)
 5  fr-fr           --/M      French_(France)    roa/fr               (fr 5)
";

    #[test]
    fn rate_follows_speed_with_bounds() {
        assert_eq!(rate_for_speed(1.0), 150);
        assert_eq!(rate_for_speed(0.5), 75);
        assert_eq!(rate_for_speed(1.3), 195);
        assert_eq!(rate_for_speed(5.0), 300);
        assert_eq!(rate_for_speed(0.1), 50);
        assert_eq!(rate_for_speed(f32::NAN), 150);
    }

    #[test]
    fn pauses_after_clause_punctuation() {
        assert_eq!(add_pause_spacing("a,b;c:d"), "a, b; c: d");
        assert_eq!(add_pause_spacing("a, b"), "a, b");
        assert_eq!(add_pause_spacing("fin,"), "fin,");
    }

    #[test]
    fn pitch_follows_terminator() {
        assert_eq!(pitch_for(&Sentence::new("Vraiment?")), 1.1);
        assert_eq!(pitch_for(&Sentence::new("Attention!")), 1.05);
        assert_eq!(pitch_for(&Sentence::new("Voilà.")), 1.0);
    }

    #[test]
    fn parses_voice_table() {
        let voices = parse_voice_list(VOICES);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[2].id, "fr-fr");
        assert_eq!(voices[2].name, "French (France)");
        assert!(is_french(&voices[2]));
        assert!(!is_french(&voices[1]));
    }

    #[test]
    fn prefers_metropolitan_french() {
        let table = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  fr-be           --/M      French_(Belgium)   roa/fr-BE            (fr 8)
 5  fr-ch           --/M      French_(Switzerland) roa/fr-CH          (fr 8)
 5  fr-fr           --/M      French_(France)    roa/fr               (fr 5)
";
        let voices = parse_voice_list(table);
        assert_eq!(pick_french(&voices).map(|v| v.id.as_str()), Some("fr-fr"));
        assert_eq!(pick_french(&voices[..2]).map(|v| v.id.as_str()), Some("fr-be"));
        assert!(pick_french(&parse_voice_list(VOICES)[..2]).is_none());
    }

    #[test]
    #[serial_test::serial]
    fn missing_binary_fails_to_initialize() {
        let settings = Settings {
            espeak_binary: "/nonexistent/espeak-ng-binary".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            EspeakBackend::new(&settings, false),
            Err(ReaderError::Initialization(_))
        ));
    }

    #[test]
    fn volume_and_speed_are_clamped() {
        let backend = EspeakBackend {
            binary: "espeak-ng".to_string(),
            rate_wpm: AtomicU32::new(150),
            volume_bits: AtomicU32::new(DEFAULT_VOLUME.to_bits()),
            voice: Mutex::new(None),
            child: Mutex::new(None),
            timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            reachable: true,
        };
        backend.set_volume(-0.3);
        assert_eq!(backend.volume(), 0.0);
        backend.set_volume(1.7);
        assert_eq!(backend.volume(), 1.0);
        backend.set_speed(5.0);
        assert_eq!(backend.rate_wpm(), 300);

        let status = backend.status();
        assert_eq!(status.kind, BackendKind::Local);
        assert!(status.is_reachable);
    }

    /// Shell script standing in for espeak-ng: prints `voices` for
    /// `--voices`, otherwise logs its arguments and runs `body`.
    #[cfg(unix)]
    fn fake_espeak(dir: &std::path::Path, voices: &str, body: &str) -> Settings {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("args.log");
        let script = format!(
            "#!/bin/sh\nif [ \"$1\" = \"--voices\" ]; then\ncat <<'VOICES'\n{}VOICES\nexit 0\nfi\necho \"$@\" >> '{}'\n{}\n",
            voices,
            log.display(),
            body
        );
        let path = dir.join("espeak-ng");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        Settings {
            espeak_binary: path.to_string_lossy().into_owned(),
            poll_interval_ms: 10,
            ..Settings::default()
        }
    }

    #[cfg(unix)]
    fn logged_args(dir: &std::path::Path) -> String {
        std::fs::read_to_string(dir.join("args.log"))
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    #[cfg(unix)]
    const ENGLISH_ONLY: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)
";

    #[test]
    #[cfg(unix)]
    #[serial_test::serial]
    fn uses_engine_default_voice_without_french() {
        let dir = tempfile::tempdir().unwrap();
        let settings = fake_espeak(dir.path(), ENGLISH_ONLY, "exit 0");
        let backend = EspeakBackend::new(&settings, false).unwrap();
        assert_eq!(backend.voice(), None);

        let signals = PlaybackSignals::new();
        backend
            .speak_one(&Sentence::new("Bonjour."), Language::French, &signals)
            .unwrap();
        assert_eq!(logged_args(dir.path()), "-s 150 -a 80 -- Bonjour.");
    }

    #[test]
    #[cfg(unix)]
    #[serial_test::serial]
    fn passes_selected_voice_rate_and_volume() {
        let dir = tempfile::tempdir().unwrap();
        let settings = fake_espeak(dir.path(), VOICES, "exit 0");
        let backend = EspeakBackend::new(&settings, false).unwrap();
        assert_eq!(backend.voice().as_deref(), Some("fr-fr"));

        backend.set_speed(2.0);
        backend.set_volume(0.5);
        backend
            .speak_one(&Sentence::new("Oui,non."), Language::French, &PlaybackSignals::new())
            .unwrap();
        assert_eq!(logged_args(dir.path()), "-s 300 -a 50 -v fr-fr -- Oui, non.");
    }

    #[test]
    #[cfg(unix)]
    #[serial_test::serial]
    fn failed_exit_is_a_synthesis_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = fake_espeak(dir.path(), VOICES, "echo 'Voice not found' >&2\nexit 1");
        let backend = EspeakBackend::new(&settings, false).unwrap();

        match backend.speak_one(&Sentence::new("Salut."), Language::French, &PlaybackSignals::new()) {
            Err(ReaderError::Synthesis(message)) => assert!(message.contains("Voice not found")),
            other => panic!("expected synthesis error, got {:?}", other),
        }
    }

    #[test]
    #[cfg(unix)]
    #[serial_test::serial]
    fn hung_process_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let settings = fake_espeak(dir.path(), VOICES, "exec sleep 5");
        let mut backend = EspeakBackend::new(&settings, false).unwrap();
        backend.timeout = Duration::from_millis(200);

        let started = Instant::now();
        let result =
            backend.speak_one(&Sentence::new("Long."), Language::French, &PlaybackSignals::new());
        assert!(matches!(result, Err(ReaderError::Synthesis(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(backend.lock_child().is_none());
    }

    #[test]
    #[cfg(unix)]
    #[serial_test::serial]
    fn stop_kills_the_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let settings = fake_espeak(dir.path(), VOICES, "exec sleep 5");
        let backend = EspeakBackend::new(&settings, false).unwrap();
        let signals = PlaybackSignals::new();

        let started = Instant::now();
        let result = thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(150));
                signals.request_stop();
                let stopping = Instant::now();
                backend.stop_immediately();
                assert!(stopping.elapsed() < Duration::from_secs(1));
            });
            backend.speak_one(&Sentence::new("Interrompu."), Language::French, &signals)
        });

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(backend.lock_child().is_none());
    }
}
