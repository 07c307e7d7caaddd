use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use glyphcast_core::color::CacheStats;
use glyphcast_core::frame::PixelGrid;
use glyphcast_core::render::{resolve_target, FrameRenderer, RenderContext, RenderStyle};

use crate::config::PlayerConfig;
use crate::source::FrameSource;
use crate::terminal::{ShutdownSignal, TerminalIo};

pub const SPEED_STEP: f64 = 1.5;
pub const MIN_SPEED: f64 = 0.2;
pub const MAX_SPEED: f64 = 5.0;

/// Frame interval for sources that do not report a rate.
const DEFAULT_FRAME_MS: f64 = 1000.0 / 30.0;
const CAMERA_FRAME_MS: u64 = 33;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackKind {
    Video,
    /// Live feed: no pause, no speed, no progress.
    Camera,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Paused,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    TogglePause,
    SpeedUp,
    SpeedDown,
    CycleColor,
    ToggleStyle,
    ToggleFullscreen,
    ResetCache,
    ToggleStats,
}

impl Command {
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        // raw mode swallows SIGINT, so Ctrl+C arrives as a key
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(Command::Quit);
        }
        let command = match key.code {
            KeyCode::Esc => Command::Quit,
            KeyCode::Char(c) => match c {
                'q' | 'Q' => Command::Quit,
                ' ' => Command::TogglePause,
                '+' | '=' => Command::SpeedUp,
                '-' | '_' => Command::SpeedDown,
                'c' | 'C' => Command::CycleColor,
                'b' | 'B' => Command::ToggleStyle,
                'f' | 'F' => Command::ToggleFullscreen,
                'r' | 'R' => Command::ResetCache,
                's' | 'S' => Command::ToggleStats,
                _ => return None,
            },
            _ => return None,
        };
        Some(command)
    }

    fn applies_to(self, kind: PlaybackKind) -> bool {
        match kind {
            PlaybackKind::Video => true,
            PlaybackKind::Camera => !matches!(
                self,
                Command::TogglePause | Command::SpeedUp | Command::SpeedDown
            ),
        }
    }
}

/// Everything the key handler may change between frames.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub status: PlayerState,
    pub speed: f64,
    pub style: RenderStyle,
    pub fullscreen: bool,
    pub show_stats: bool,
    /// Current target size; 0 on either side means "fit the terminal".
    pub size: (u16, u16),
    requested_size: (u16, u16),
}

impl PlaybackState {
    pub fn new(style: RenderStyle, size: (u16, u16), speed: f64) -> Self {
        Self {
            status: PlayerState::Playing,
            speed: speed.clamp(MIN_SPEED, MAX_SPEED),
            style,
            fullscreen: false,
            show_stats: false,
            size,
            requested_size: size,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.status == PlayerState::Paused
    }

    pub fn apply(&mut self, command: Command, ctx: &mut RenderContext, terminal: (u16, u16)) {
        match command {
            Command::Quit => self.status = PlayerState::Terminated,
            Command::TogglePause => {
                self.status = match self.status {
                    PlayerState::Playing => PlayerState::Paused,
                    PlayerState::Paused => PlayerState::Playing,
                    PlayerState::Terminated => PlayerState::Terminated,
                }
            }
            Command::SpeedUp => self.speed = (self.speed * SPEED_STEP).min(MAX_SPEED),
            Command::SpeedDown => self.speed = (self.speed / SPEED_STEP).max(MIN_SPEED),
            Command::CycleColor => {
                ctx.cycle_mode();
            }
            Command::ToggleStyle => self.style = self.style.toggle(),
            Command::ToggleFullscreen => self.toggle_fullscreen(terminal),
            Command::ResetCache => ctx.reset_caches(),
            Command::ToggleStats => self.show_stats = !self.show_stats,
        }
    }

    fn toggle_fullscreen(&mut self, terminal: (u16, u16)) {
        self.fullscreen = !self.fullscreen;
        self.size = if self.fullscreen {
            (terminal.0.saturating_sub(2), terminal.1.saturating_sub(4))
        } else {
            self.requested_size
        };
    }

    /// Delay between frames of a `fps` source at the current speed.
    pub fn frame_interval(&self, fps: f64) -> Duration {
        let base_ms = if fps > 0.0 { 1000.0 / fps } else { DEFAULT_FRAME_MS };
        Duration::from_secs_f64(base_ms / self.speed / 1000.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackSummary {
    pub frames_shown: u64,
    pub stats: CacheStats,
    /// False when the user or a signal stopped playback early.
    pub reached_end: bool,
}

/// Drives one source through the renderer onto a terminal.
pub struct PlaybackController<S, T> {
    source: S,
    term: T,
    kind: PlaybackKind,
    auto_loop: bool,
    shutdown: ShutdownSignal,
    ctx: RenderContext,
    renderer: FrameRenderer,
    state: PlaybackState,
    current: Option<PixelGrid>,
    /// Position in the current pass, for the progress display.
    frame_number: u64,
    frames_shown: u64,
    frames_since_restart: u64,
    reached_end: bool,
}

impl<S: FrameSource, T: TerminalIo> PlaybackController<S, T> {
    pub fn new(source: S, term: T, kind: PlaybackKind, config: &PlayerConfig, shutdown: ShutdownSignal) -> Self {
        Self {
            source,
            term,
            kind,
            auto_loop: config.auto_loop && kind == PlaybackKind::Video,
            shutdown,
            ctx: RenderContext::new(config.color_mode),
            renderer: FrameRenderer::new(),
            state: PlaybackState::new(config.style, (config.width, config.height), config.speed),
            current: None,
            frame_number: 0,
            frames_shown: 0,
            frames_since_restart: 0,
            reached_end: false,
        }
    }

    /// Loop until quit, signal or end of stream.
    pub fn run(&mut self) -> anyhow::Result<PlaybackSummary> {
        let mut last_present = Instant::now();
        while self.state.status != PlayerState::Terminated {
            self.tick()?;
            if self.state.status != PlayerState::Terminated {
                self.pace(&mut last_present);
            }
        }
        Ok(self.summary())
    }

    /// One iteration: signal check, input, frame acquisition, presentation.
    pub fn tick(&mut self) -> anyhow::Result<()> {
        if self.shutdown.triggered() {
            log::info!("termination signal received, stopping playback");
            self.state.status = PlayerState::Terminated;
            return Ok(());
        }

        self.handle_input()?;
        if self.state.status == PlayerState::Terminated {
            return Ok(());
        }

        if self.kind == PlaybackKind::Camera || !self.state.is_paused() {
            match self.source.read_frame() {
                Some(frame) => {
                    self.current = Some(frame);
                    self.frame_number += 1;
                    self.frames_shown += 1;
                    self.frames_since_restart += 1;
                }
                None if self.kind == PlaybackKind::Camera => {
                    log::debug!("no camera frame, retrying");
                    return Ok(());
                }
                None => {
                    if !self.restart_for_loop() {
                        log::info!("end of stream after {} frames", self.frames_shown);
                        self.reached_end = true;
                        self.state.status = PlayerState::Terminated;
                        return Ok(());
                    }
                }
            }
        }

        self.present()
    }

    pub fn summary(&self) -> PlaybackSummary {
        PlaybackSummary {
            frames_shown: self.frames_shown,
            stats: self.ctx.stats(),
            reached_end: self.reached_end,
        }
    }

    fn handle_input(&mut self) -> anyhow::Result<()> {
        while let Some(key) = self.term.poll_key().context("failed to read keyboard input")? {
            let Some(command) = Command::from_key(&key) else {
                continue;
            };
            if !command.applies_to(self.kind) {
                continue;
            }
            log::debug!("command {command:?}");
            let terminal = self.term.size();
            self.state.apply(command, &mut self.ctx, terminal);
            if self.state.status == PlayerState::Terminated {
                break;
            }
        }
        Ok(())
    }

    /// Re-open the source for another pass. A pass that produced no frames
    /// ends playback rather than restarting forever.
    fn restart_for_loop(&mut self) -> bool {
        if !self.auto_loop || self.frames_since_restart == 0 {
            return false;
        }
        match self.source.restart() {
            Ok(()) => {
                log::info!("looping back to the first frame");
                self.frame_number = 0;
                self.frames_since_restart = 0;
                true
            }
            Err(e) => {
                log::warn!("could not restart source: {e:#}");
                false
            }
        }
    }

    fn present(&mut self) -> anyhow::Result<()> {
        let Some(frame) = &self.current else {
            return Ok(());
        };
        let target = resolve_target(self.state.size, self.term.size());
        let mut block = self.renderer.render(frame, &mut self.ctx, self.state.style, target);
        block.push_str(self.ctx.reset_code());
        block.push_str(&self.status_line());
        self.term.present(&block).context("failed to write frame")?;
        Ok(())
    }

    pub fn status_line(&self) -> String {
        let stats = self.ctx.stats();
        let mode = format!(
            "{}{}{}",
            self.ctx.mode().label(),
            if self.state.style.is_block() { "-BLOCK" } else { "" },
            if self.state.fullscreen { " FULLSCREEN" } else { "" }
        );
        let mut cache = format!("Cache: {:.1}%", stats.hit_rate());
        if self.state.show_stats {
            cache.push_str(&format!(
                " Hits: {} Misses: {} Entries: {}",
                stats.hits,
                stats.misses,
                self.ctx.codec().len()
            ));
        }

        match self.kind {
            PlaybackKind::Video => {
                let total = self.source.meta().frame_count;
                let progress = if total > 0 {
                    (self.frame_number * 100 / total).min(100)
                } else {
                    0
                };
                format!(
                    "[{}] Frame: {}/{} ({}%) Speed: {:.1}x Mode: {} | {}\n\
                     [Q]Quit [SPACE]Pause [+/-]Speed [C]Color [B]Block [F]Fullscreen [R]ClearCache [S]Stats",
                    if self.state.is_paused() { "PAUSED" } else { "PLAYING" },
                    self.frame_number,
                    total,
                    progress,
                    self.state.speed,
                    mode,
                    cache
                )
            }
            PlaybackKind::Camera => format!(
                "Mode: {} | {} | [Q]uit [C]olor [B]lock [F]ullscreen [S]tats [R]eset",
                mode, cache
            ),
        }
    }

    fn pace(&self, last_present: &mut Instant) {
        let interval = match self.kind {
            PlaybackKind::Camera => Duration::from_millis(CAMERA_FRAME_MS),
            PlaybackKind::Video => self.state.frame_interval(self.source.meta().fps),
        };
        if let Some(remaining) = interval.checked_sub(last_present.elapsed()) {
            thread::sleep(remaining);
        }
        *last_present = Instant::now();
    }
}
