use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use glyphcast_core::color::ColorMode;
use glyphcast_core::render::RenderStyle;

use crate::error::PlayerError;

/// Render size used for camera feeds when none is given.
pub const CAMERA_DEFAULT_SIZE: (u16, u16) = (80, 24);

#[derive(Parser, Debug)]
#[command(
    name = "glyphcast",
    about = "Play videos and camera feeds as colored text in the terminal",
    disable_help_flag = true
)]
pub struct Cli {
    /// Video file to play (omit for the interactive menu)
    pub input: Option<PathBuf>,

    /// Play from a camera device instead of a file
    #[arg(long, value_name = "ID", conflicts_with = "input")]
    pub camera: Option<u32>,

    /// 256-color output
    #[arg(short = 'c', long)]
    pub color: bool,

    /// 24-bit color output (wins over --color)
    #[arg(short = 't', long)]
    pub truecolor: bool,

    /// Output width in columns (0 = fit terminal)
    #[arg(short = 'w', long, default_value_t = 0)]
    pub width: u16,

    /// Output height in rows (0 = fit terminal)
    #[arg(short = 'h', long, default_value_t = 0)]
    pub height: u16,

    /// Restart the video when it ends
    #[arg(short = 'l', long = "loop")]
    pub looping: bool,

    /// Render colored blocks instead of glyphs
    #[arg(short = 'b', long)]
    pub block: bool,

    /// Skip the video info screen
    #[arg(long)]
    pub no_info: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    File(PathBuf),
    Camera(u32),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerConfig {
    pub source: SourceSpec,
    pub color_mode: ColorMode,
    pub style: RenderStyle,
    /// Requested output size; 0 on either side means "fit the terminal".
    pub width: u16,
    pub height: u16,
    pub auto_loop: bool,
    pub speed: f64,
    pub show_info: bool,
}

impl PlayerConfig {
    fn new(source: SourceSpec) -> Self {
        let (width, height) = match source {
            SourceSpec::Camera(_) => CAMERA_DEFAULT_SIZE,
            SourceSpec::File(_) => (0, 0),
        };
        Self {
            source,
            color_mode: ColorMode::Mono,
            style: RenderStyle::Glyph,
            width,
            height,
            auto_loop: false,
            speed: 1.0,
            show_info: true,
        }
    }

    /// Build from command-line flags. `None` when neither a path nor a camera
    /// was given, in which case the caller falls back to the interactive menu.
    pub fn from_cli(cli: &Cli) -> Option<Self> {
        let source = match (&cli.input, cli.camera) {
            (Some(path), _) => SourceSpec::File(path.clone()),
            (None, Some(id)) => SourceSpec::Camera(id),
            (None, None) => return None,
        };
        let mut config = Self::new(source);

        config.color_mode = if cli.truecolor {
            ColorMode::TrueColor24
        } else if cli.color {
            ColorMode::Indexed256
        } else {
            ColorMode::Mono
        };
        if cli.block {
            config.style = RenderStyle::Block;
        }
        if cli.width != 0 || cli.height != 0 {
            config.width = cli.width;
            config.height = cli.height;
        }
        config.auto_loop = cli.looping;
        config.show_info = !cli.no_info;
        Some(config)
    }

    /// Ask for source, looping and color mode on `out`, reading answers from `input`.
    pub fn from_interactive<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<Self, PlayerError> {
        writeln!(out, "ASCII Video Player with Color Support")?;
        writeln!(out, "====================================")?;
        writeln!(out, "1. Play video file")?;
        writeln!(out, "2. Play from camera")?;
        let choice = prompt(input, out, "Choice (1/2): ")?;

        match choice.as_str() {
            "1" => {
                let path = prompt(input, out, "Enter video file path: ")?;
                if path.is_empty() {
                    return Err(PlayerError::InvalidSelection("empty video path".into()));
                }
                let mut config = Self::new(SourceSpec::File(PathBuf::from(path)));

                let looping = prompt(input, out, "Enable auto-loop? (y/n): ")?;
                config.auto_loop = looping.eq_ignore_ascii_case("y");

                writeln!(out, "Color mode:")?;
                writeln!(out, "1. Monochrome")?;
                writeln!(out, "2. 8-bit color (256 colors)")?;
                writeln!(out, "3. 24-bit color (true color)")?;
                config.color_mode = parse_color_choice(&prompt(input, out, "Choice (1/2/3): ")?);
                Ok(config)
            }
            "2" => {
                let mut config = Self::new(SourceSpec::Camera(0));
                let answer = prompt(input, out, "Color mode (1=Mono, 2=8bit, 3=24bit): ")?;
                config.color_mode = parse_color_choice(&answer);
                Ok(config)
            }
            other => Err(PlayerError::InvalidSelection(format!("menu choice {other:?}"))),
        }
    }
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> Result<String, PlayerError> {
    write!(out, "{question}")?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Anything other than 2 or 3 means monochrome.
fn parse_color_choice(answer: &str) -> ColorMode {
    match answer {
        "2" => ColorMode::Indexed256,
        "3" => ColorMode::TrueColor24,
        _ => ColorMode::Mono,
    }
}
