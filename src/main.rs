//! readaloud - read a PDF aloud from the terminal
//!
//! Uses online speech synthesis when the network is reachable and falls back
//! to espeak-ng otherwise.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use readaloud::config_loader::Settings;
use readaloud::{document, language, shell, PlaybackController, PlaybackEvent, PlaybackRequest};

/// Read PDF documents aloud
#[derive(Parser)]
#[command(name = "readaloud")]
#[command(author = "StarTuz")]
#[command(version)]
#[command(about = "Reads PDF documents aloud, sentence by sentence", long_about = None)]
struct Cli {
    /// PDF file to read
    #[arg(required_unless_present = "list_voices")]
    file: Option<PathBuf>,

    /// First page to read (1-based)
    #[arg(short, long)]
    start: Option<String>,

    /// Last page to read (inclusive)
    #[arg(short, long)]
    end: Option<String>,

    /// Speed factor (0.5-2.0)
    #[arg(long)]
    speed: Option<f32>,

    /// Volume level (0.0-1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Skip online synthesis and use espeak-ng only
    #[arg(long)]
    local: bool,

    /// Voice to use with espeak-ng (see --list-voices)
    #[arg(long)]
    voice: Option<String>,

    /// List available voices and exit
    #[arg(long)]
    list_voices: bool,

    /// Print the extracted text before reading it
    #[arg(long)]
    show_text: bool,
}

fn init_tracing(settings: &Settings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::new().context("Failed to load configuration")?;
    if cli.local {
        settings.remote_enabled = false;
    }
    init_tracing(&settings);

    let controller =
        PlaybackController::from_settings(&settings).context("Failed to start a speech engine")?;
    println!("Speech engine: {}", controller.status().quality_label);

    if cli.list_voices {
        for voice in controller.list_voices()? {
            println!("{:<16} {:<32} {}", voice.id, voice.name, voice.language);
        }
        return Ok(());
    }

    if let Some(voice) = &cli.voice {
        controller
            .set_voice(voice)
            .with_context(|| format!("Failed to select voice '{}'", voice))?;
    }

    let Some(file) = cli.file else {
        bail!("No PDF file given");
    };

    let total = document::page_count(&file)?;
    if total == 0 {
        bail!("{} has no pages", file.display());
    }
    println!("Loaded {} ({} page(s))", file.display(), total);
    let (start, end) = shell::parse_page_range(cli.start.as_deref(), cli.end.as_deref(), total)?;

    let text = document::extract(&file, start, end)?;
    if text.is_empty() {
        println!("No text found on the selected pages.");
        return Ok(());
    }
    if cli.show_text {
        println!("{}\n", text);
    }
    println!("Document language: {}", language::guess_document(&text));

    let request = PlaybackRequest::new(
        text,
        cli.speed.unwrap_or(settings.default_speed),
        cli.volume.unwrap_or(settings.default_volume),
    );

    match shell::read_aloud(&controller, request)? {
        PlaybackEvent::Failed(reason) => bail!("Reading failed: {}", reason),
        PlaybackEvent::Stopped => println!("Stopped."),
        _ => println!("Finished."),
    }
    Ok(())
}
