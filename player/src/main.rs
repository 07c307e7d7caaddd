mod config;
mod controller;
mod error;
mod source;
mod terminal;

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use crossterm::tty::IsTty;

use crate::config::{Cli, PlayerConfig, SourceSpec};
use crate::controller::{PlaybackController, PlaybackKind, PlaybackSummary};
use crate::source::{CameraSource, FrameSource, VideoSource};
use crate::terminal::{CrosstermIo, ShutdownSignal, TerminalGuard};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let config = match PlayerConfig::from_cli(&cli) {
        Some(config) => config,
        None => {
            let stdin = io::stdin();
            PlayerConfig::from_interactive(&mut stdin.lock(), &mut io::stdout())?
        }
    };
    log::debug!("config: {config:?}");

    let summary = match &config.source {
        SourceSpec::File(path) => {
            let source = VideoSource::open(path)?;
            if config.show_info {
                show_video_info(&source, &config)?;
            }
            play(source, PlaybackKind::Video, &config)?
        }
        SourceSpec::Camera(device) => {
            let source = CameraSource::open(*device)?;
            println!("Camera feed started. Controls: [Q]uit [C]olor [B]lock [F]ullscreen [S]tats [R]eset cache");
            play(source, PlaybackKind::Camera, &config)?
        }
    };

    println!(
        "Playback {}! {} frames shown, cache hit rate {:.1}%",
        if summary.reached_end { "finished" } else { "stopped" },
        summary.frames_shown,
        summary.stats.hit_rate()
    );
    Ok(())
}

/// Own the terminal for the duration of one playback session.
fn play<S: FrameSource>(
    source: S,
    kind: PlaybackKind,
    config: &PlayerConfig,
) -> anyhow::Result<PlaybackSummary> {
    let shutdown = ShutdownSignal::register().context("failed to install signal handlers")?;
    let mut guard = TerminalGuard::acquire().context("failed to enter raw mode")?;

    let mut controller = PlaybackController::new(source, CrosstermIo::new(), kind, config, shutdown);
    let result = controller.run();

    guard.release().context("failed to restore terminal")?;
    result
}

fn show_video_info(source: &VideoSource, config: &PlayerConfig) -> anyhow::Result<()> {
    let meta = source.meta();
    let duration = meta.duration_secs() as u64;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "Terminal Video Player")?;
    writeln!(stdout, "============================================")?;
    writeln!(stdout, "File: {}", source.path().display())?;
    writeln!(stdout, "Resolution: {}x{}", meta.width, meta.height)?;
    writeln!(stdout, "FPS: {:.2}", meta.fps)?;
    writeln!(stdout, "Duration: {}:{:02}", duration / 60, duration % 60)?;
    writeln!(stdout, "Frame Count: {}", meta.frame_count)?;
    writeln!(stdout, "Color Mode: {}", config.color_mode.description())?;

    let stdin = io::stdin();
    if stdin.is_tty() {
        write!(stdout, "Press Enter to start...")?;
        stdout.flush()?;
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
    }
    Ok(())
}

/// Logs go to stderr unless a file is given; the player owns the screen while
/// it runs, so a file keeps them off the video.
fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(path) = log_file {
        let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}
