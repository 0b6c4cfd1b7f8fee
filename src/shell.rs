//! Interactive terminal front-end: input validation, playback controls and
//! progress display.
//!
//! Playback events arrive from the worker thread and keyboard commands from
//! a stdin thread; both are funnelled into one channel so that only the host
//! thread touches the terminal.

use std::io::BufRead;
use std::sync::mpsc::{self, Sender};
use std::thread;

use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::{PlaybackController, PlaybackEvent, PlaybackRequest};
use crate::error::{ReaderError, Result};
use crate::state::ReadingState;

const SPEED_STEP: f32 = 0.1;
const VOLUME_STEP: f32 = 0.1;
const PROGRESS_SCALE: f32 = 1000.0;

pub const CONTROLS_HELP: &str =
    "Controls: p pause/resume, r resume, s stop, +/- speed, >/< volume, i status, h help";

/// A keyboard command typed while reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    TogglePause,
    Resume,
    Stop,
    Faster,
    Slower,
    Louder,
    Quieter,
    Status,
    Help,
}

impl ShellCommand {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "p" | "pause" => Some(Self::TogglePause),
            "r" | "resume" => Some(Self::Resume),
            "s" | "stop" | "q" | "quit" => Some(Self::Stop),
            "+" | "faster" => Some(Self::Faster),
            "-" | "slower" => Some(Self::Slower),
            ">" | "louder" => Some(Self::Louder),
            "<" | "quieter" => Some(Self::Quieter),
            "i" | "status" => Some(Self::Status),
            "h" | "?" | "help" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Everything the host thread reacts to.
#[derive(Debug)]
pub enum HostMessage {
    Command(ShellCommand),
    Playback(PlaybackEvent),
    Unrecognised(String),
    InputClosed,
}

/// Parse one page number typed by the user. Blank input means "not set".
pub fn parse_page(input: Option<&str>, total: usize) -> Result<Option<u32>> {
    let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let page: u32 = raw
        .parse()
        .map_err(|_| ReaderError::InvalidPage(format!("'{}' is not a page number", raw)))?;
    if page == 0 {
        return Err(ReaderError::InvalidPage("pages are numbered from 1".to_string()));
    }
    if page as usize > total {
        return Err(ReaderError::InvalidPage(format!(
            "page {} is past the end of the document ({} pages)",
            page, total
        )));
    }
    Ok(Some(page))
}

/// Validate the start and end page inputs against the document length.
pub fn parse_page_range(
    start: Option<&str>,
    end: Option<&str>,
    total: usize,
) -> Result<(Option<u32>, Option<u32>)> {
    let start = parse_page(start, total)?;
    let end = parse_page(end, total)?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(ReaderError::InvalidPage(format!(
                "start page {} is after end page {}",
                s, e
            )));
        }
    }
    Ok((start, end))
}

fn spawn_stdin_reader(tx: Sender<HostMessage>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let message = match ShellCommand::parse(&line) {
                    Some(command) => HostMessage::Command(command),
                    None if line.trim().is_empty() => continue,
                    None => HostMessage::Unrecognised(line),
                };
                if tx.send(message).is_err() {
                    return;
                }
            }
            let _ = tx.send(HostMessage::InputClosed);
        })?;
    Ok(())
}

fn progress_bar(total_sentences: usize) -> ProgressBar {
    let pb = ProgressBar::new(PROGRESS_SCALE as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    pb.set_message(format!("{} sentences", total_sentences));
    pb
}

fn describe(controller: &PlaybackController) -> String {
    let status = controller.status();
    format!(
        "{:?} · sentence {}/{} · speed {:.1} · volume {:.0}% · engine {} ({})",
        controller.state(),
        controller.current_index(),
        controller.total(),
        controller.speed(),
        controller.volume() * 100.0,
        status.kind,
        status.quality_label,
    )
}

/// Apply one keyboard command to the controller.
pub fn apply_command(controller: &PlaybackController, command: ShellCommand) -> Option<String> {
    match command {
        ShellCommand::TogglePause => {
            if controller.state() == ReadingState::Paused {
                controller.resume();
                Some("Resumed".to_string())
            } else {
                controller.pause();
                Some("Paused".to_string())
            }
        }
        ShellCommand::Resume => {
            controller.resume();
            Some("Resumed".to_string())
        }
        ShellCommand::Stop => {
            controller.stop();
            None
        }
        ShellCommand::Faster | ShellCommand::Slower => {
            let step = if command == ShellCommand::Faster { SPEED_STEP } else { -SPEED_STEP };
            controller.set_speed_live(controller.speed() + step);
            Some(format!("Speed {:.1}", controller.speed()))
        }
        ShellCommand::Louder | ShellCommand::Quieter => {
            let step = if command == ShellCommand::Louder { VOLUME_STEP } else { -VOLUME_STEP };
            controller.set_volume_live(controller.volume() + step);
            Some(format!("Volume {:.0}%", controller.volume() * 100.0))
        }
        ShellCommand::Status => Some(describe(controller)),
        ShellCommand::Help => Some(CONTROLS_HELP.to_string()),
    }
}

/// Read `request` aloud, handling keyboard controls until the read ends.
///
/// Returns the terminal event (`Finished`, `Stopped` or `Failed`).
pub fn read_aloud(
    controller: &PlaybackController,
    request: PlaybackRequest,
) -> Result<PlaybackEvent> {
    let (tx, rx) = mpsc::channel();
    spawn_stdin_reader(tx.clone())?;

    let events = tx.clone();
    controller.read_text(request, move |event| {
        let _ = events.send(HostMessage::Playback(event));
    })?;
    drop(tx);

    let bar = progress_bar(controller.total());
    bar.println(CONTROLS_HELP);

    while let Ok(message) = rx.recv() {
        match message {
            HostMessage::Playback(PlaybackEvent::Progress(fraction)) => {
                bar.set_position((fraction * PROGRESS_SCALE).round() as u64);
            }
            HostMessage::Playback(PlaybackEvent::BackendChanged(status)) => {
                bar.println(format!(
                    "Switched to the {} engine: {}",
                    status.kind, status.quality_label
                ));
            }
            HostMessage::Playback(event) => {
                match &event {
                    PlaybackEvent::Finished => bar.finish_with_message("done"),
                    PlaybackEvent::Stopped => bar.abandon_with_message("stopped"),
                    _ => bar.abandon_with_message("failed"),
                }
                controller.wait();
                return Ok(event);
            }
            HostMessage::Command(command) => {
                if let Some(message) = apply_command(controller, command) {
                    bar.println(message);
                }
            }
            HostMessage::Unrecognised(line) => {
                bar.println(format!("Unknown command '{}'. {}", line.trim(), CONTROLS_HELP));
            }
            HostMessage::InputClosed => {
                tracing::debug!("stdin closed, controls disabled");
            }
        }
    }

    // The worker always sends a terminal event; reaching this means it died.
    controller.wait();
    Ok(PlaybackEvent::Failed("reading worker exited unexpectedly".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(ShellCommand::parse("p"), Some(ShellCommand::TogglePause));
        assert_eq!(ShellCommand::parse(" Stop "), Some(ShellCommand::Stop));
        assert_eq!(ShellCommand::parse("+"), Some(ShellCommand::Faster));
        assert_eq!(ShellCommand::parse("<"), Some(ShellCommand::Quieter));
        assert_eq!(ShellCommand::parse("dance"), None);
    }

    #[test]
    fn blank_pages_are_unset() {
        assert_eq!(parse_page(None, 10).unwrap(), None);
        assert_eq!(parse_page(Some("  "), 10).unwrap(), None);
        assert_eq!(parse_page(Some(" 3 "), 10).unwrap(), Some(3));
    }

    #[test]
    fn rejects_bad_page_inputs() {
        for input in ["abc", "0", "-2", "11", "2.5"] {
            assert!(
                matches!(parse_page(Some(input), 10), Err(ReaderError::InvalidPage(_))),
                "accepted {:?}",
                input
            );
        }
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(matches!(
            parse_page_range(Some("5"), Some("2"), 10),
            Err(ReaderError::InvalidPage(_))
        ));
        assert_eq!(
            parse_page_range(Some("2"), None, 10).unwrap(),
            (Some(2), None)
        );
    }
}
