use crate::color::{CacheStats, ColorCodec, ColorMode, RESET};
use crate::frame::{PixelGrid, Rgb};
use crate::glyph::GlyphMapper;
use crate::imaging::{equalize_contrast, to_grayscale, FrameResizer};

/// Height/width ratio of a terminal cell.
pub const CHAR_ASPECT: f32 = 2.2;

/// Upper bound for an automatically sized frame, in cells.
pub const MAX_AUTO_COLS: u16 = 120;
pub const MAX_AUTO_ROWS: u16 = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RenderStyle {
    /// Brightness-mapped glyph in the pixel's foreground color.
    #[default]
    Glyph,
    /// A space painted with the pixel's background color.
    Block,
}

impl RenderStyle {
    pub fn toggle(self) -> Self {
        match self {
            RenderStyle::Glyph => RenderStyle::Block,
            RenderStyle::Block => RenderStyle::Glyph,
        }
    }

    pub fn is_block(self) -> bool {
        matches!(self, RenderStyle::Block)
    }
}

/// Color mode plus the escape caches that belong to it.
#[derive(Debug, Default)]
pub struct RenderContext {
    mode: ColorMode,
    codec: ColorCodec,
}

impl RenderContext {
    pub fn new(mode: ColorMode) -> Self {
        Self {
            mode,
            codec: ColorCodec::new(),
        }
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    /// Switch modes, evicting partitions the new mode does not use.
    pub fn set_mode(&mut self, mode: ColorMode) {
        if mode == self.mode {
            return;
        }
        log::info!("color mode {} -> {}", self.mode.label(), mode.label());
        self.mode = mode;
        self.codec.retain_mode(mode);
    }

    pub fn cycle_mode(&mut self) -> ColorMode {
        self.set_mode(self.mode.next());
        self.mode
    }

    pub fn reset_caches(&mut self) {
        log::info!("clearing {} cached color entries", self.codec.len());
        self.codec.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.codec.stats()
    }

    pub fn codec(&self) -> &ColorCodec {
        &self.codec
    }

    pub fn escape_for(&mut self, rgb: Rgb, background: bool) -> &str {
        self.codec.escape_for(self.mode, rgb, background)
    }

    /// Style reset for the current mode; empty in Mono.
    pub fn reset_code(&self) -> &'static str {
        if self.mode.is_color() {
            RESET
        } else {
            ""
        }
    }
}

/// Target box for a terminal of `cols` x `rows`, leaving room for the status line.
pub fn auto_target(terminal: (u16, u16)) -> (u32, u32) {
    let (cols, rows) = terminal;
    let width = cols.saturating_sub(2).min(MAX_AUTO_COLS).max(1);
    let height = rows.saturating_sub(3).min(MAX_AUTO_ROWS).max(1);
    (width as u32, height as u32)
}

/// Requested size, or the automatic one when either side is unset.
pub fn resolve_target(requested: (u16, u16), terminal: (u16, u16)) -> (u32, u32) {
    match requested {
        (0, _) | (_, 0) => auto_target(terminal),
        (w, h) => (w as u32, h as u32),
    }
}

/// Largest cell grid inside `target` that keeps the source aspect ratio on
/// screen, given cells `CHAR_ASPECT` times taller than wide.
pub fn fit_dimensions(src_width: u32, src_height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    let target_width = target_width.max(1);
    let target_height = target_height.max(1);
    let aspect = src_width.max(1) as f32 / src_height.max(1) as f32;
    let box_aspect = target_width as f32 / (target_height as f32 * CHAR_ASPECT);

    let (width, height) = if aspect > box_aspect {
        let h = (target_width as f32 / aspect / CHAR_ASPECT) as u32;
        (target_width, h)
    } else {
        let w = (target_height as f32 * aspect * CHAR_ASPECT) as u32;
        (w, target_height)
    };
    (width.clamp(1, target_width), height.clamp(1, target_height))
}

/// Turns pixel grids into newline-terminated rows of colored text.
pub struct FrameRenderer {
    glyphs: GlyphMapper,
    resizer: FrameResizer,
}

impl FrameRenderer {
    pub fn new() -> Self {
        Self {
            glyphs: GlyphMapper::new(),
            resizer: FrameResizer::new(),
        }
    }

    /// Fit `grid` into `target` cells, resample, and encode.
    pub fn render(
        &mut self,
        grid: &PixelGrid,
        ctx: &mut RenderContext,
        style: RenderStyle,
        target: (u32, u32),
    ) -> String {
        if grid.is_empty() {
            return String::new();
        }
        let (width, height) = fit_dimensions(grid.width(), grid.height(), target.0, target.1);
        let resized = match self.resizer.resize(grid, width, height) {
            Ok(resized) => resized,
            Err(e) => {
                log::warn!("area resize failed, falling back to nearest sampling: {e:#}");
                grid.sample_nearest(width, height)
            }
        };
        self.encode(&resized, ctx, style)
    }

    /// Encode an already-sized grid, one text row per pixel row.
    pub fn encode(&self, grid: &PixelGrid, ctx: &mut RenderContext, style: RenderStyle) -> String {
        if grid.is_empty() {
            return String::new();
        }
        match (ctx.mode(), style) {
            (ColorMode::Mono, _) => self.encode_mono(grid),
            (_, RenderStyle::Glyph) => self.encode_color(grid, ctx, false),
            (_, RenderStyle::Block) => self.encode_color(grid, ctx, true),
        }
    }

    fn encode_mono(&self, grid: &PixelGrid) -> String {
        let width = grid.width() as usize;
        let mut luma = to_grayscale(grid);
        equalize_contrast(&mut luma);

        let mut out = String::with_capacity(luma.len() + grid.height() as usize);
        for row in luma.chunks_exact(width) {
            out.extend(row.iter().map(|&v| self.glyphs.char_for_brightness(v)));
            out.push('\n');
        }
        out
    }

    /// Color rows with escape elision: a new escape goes out only when the
    /// resolved sequence differs from the one active on this row.
    fn encode_color(&self, grid: &PixelGrid, ctx: &mut RenderContext, background: bool) -> String {
        let cells = grid.width() as usize * grid.height() as usize;
        let mut out = String::with_capacity(cells * 20 + grid.height() as usize);
        let mut active = String::new();

        for row in grid.rows() {
            let mut last_pixel = None;
            for px in row {
                if last_pixel != Some(px) {
                    let code = ctx.escape_for(px, background);
                    if code != active {
                        out.push_str(code);
                        active.clear();
                        active.push_str(code);
                    }
                    last_pixel = Some(px);
                }
                if background {
                    out.push(' ');
                } else {
                    out.push(self.glyphs.char_for_brightness(px.luma()));
                }
            }
            out.push_str(RESET);
            out.push('\n');
            active.clear();
        }
        out
    }
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb::new(255, 0, 0);
    const BLUE: Rgb = Rgb::new(0, 0, 255);

    fn gradient(width: u32, height: u32) -> PixelGrid {
        let mut pixels = Vec::new();
        for y in 0..height {
            for x in 0..width {
                pixels.push(Rgb::new((x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8));
            }
        }
        PixelGrid::from_pixels(width, height, &pixels).unwrap()
    }

    #[test]
    fn fit_landscape_is_width_bound() {
        assert_eq!(fit_dimensions(1920, 1080, 120, 40), (120, 30));
    }

    #[test]
    fn fit_portrait_is_height_bound() {
        let (w, h) = fit_dimensions(1080, 1920, 120, 40);
        assert_eq!(h, 40);
        assert_eq!(w, 49);
    }

    #[test]
    fn fit_never_exceeds_target() {
        for &(sw, sh) in &[(1, 1), (4000, 10), (10, 4000), (640, 480), (1280, 720)] {
            for &(tw, th) in &[(1, 1), (80, 24), (120, 40), (300, 5)] {
                let (w, h) = fit_dimensions(sw, sh, tw, th);
                assert!(w >= 1 && w <= tw, "{sw}x{sh} in {tw}x{th} gave width {w}");
                assert!(h >= 1 && h <= th, "{sw}x{sh} in {tw}x{th} gave height {h}");
            }
        }
    }

    #[test]
    fn auto_target_clamps_and_leaves_margin() {
        assert_eq!(auto_target((200, 60)), (120, 40));
        assert_eq!(auto_target((80, 24)), (78, 21));
        assert_eq!(auto_target((0, 0)), (1, 1));
        assert_eq!(resolve_target((0, 30), (80, 24)), (78, 21));
        assert_eq!(resolve_target((60, 30), (80, 24)), (60, 30));
    }

    #[test]
    fn mono_output_has_no_escapes() {
        let mut renderer = FrameRenderer::new();
        let mut ctx = RenderContext::new(ColorMode::Mono);
        for style in [RenderStyle::Glyph, RenderStyle::Block] {
            let text = renderer.render(&gradient(64, 48), &mut ctx, style, (40, 20));
            assert!(!text.is_empty());
            assert!(!text.as_bytes().contains(&0x1b));
        }
        assert_eq!(ctx.stats(), CacheStats::default());
    }

    #[test]
    fn color_runs_share_one_escape() {
        let grid = PixelGrid::from_pixels(2, 2, &[RED, RED, BLUE, BLUE]).unwrap();
        let renderer = FrameRenderer::new();
        let mut ctx = RenderContext::new(ColorMode::TrueColor24);
        let text = renderer.encode(&grid, &mut ctx, RenderStyle::Glyph);

        assert_eq!(text.matches("\x1b[38;").count(), 2);
        assert_eq!(text.matches(RESET).count(), 2);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("\x1b[38;2;255;0;0m"));
        assert!(lines[1].starts_with("\x1b[38;2;0;0;255m"));
    }

    #[test]
    fn escapes_elided_when_quantized_equal() {
        // both quantize to palette index 196
        let grid = PixelGrid::from_pixels(2, 1, &[RED, Rgb::new(255, 10, 0)]).unwrap();
        let renderer = FrameRenderer::new();
        let mut ctx = RenderContext::new(ColorMode::Indexed256);
        let text = renderer.encode(&grid, &mut ctx, RenderStyle::Glyph);
        assert_eq!(text.matches("\x1b[38;5;196m").count(), 1);
    }

    #[test]
    fn color_does_not_leak_across_rows() {
        let grid = PixelGrid::from_pixels(1, 3, &[RED, RED, RED]).unwrap();
        let renderer = FrameRenderer::new();
        let mut ctx = RenderContext::new(ColorMode::TrueColor24);
        let text = renderer.encode(&grid, &mut ctx, RenderStyle::Glyph);
        for line in text.lines() {
            assert!(line.starts_with("\x1b[38;2;255;0;0m"));
            assert!(line.ends_with(RESET));
        }
        // one miss, then cache hits for the later rows
        assert_eq!(ctx.stats(), CacheStats { hits: 2, misses: 1 });
    }

    #[test]
    fn block_style_paints_background() {
        let grid = PixelGrid::from_pixels(2, 1, &[RED, BLUE]).unwrap();
        let renderer = FrameRenderer::new();
        let mut ctx = RenderContext::new(ColorMode::TrueColor24);
        let text = renderer.encode(&grid, &mut ctx, RenderStyle::Block);
        assert_eq!(text, "\x1b[48;2;255;0;0m \x1b[48;2;0;0;255m \x1b[0m\n");
    }

    #[test]
    fn block_style_in_mono_falls_back_to_glyphs() {
        let grid = gradient(8, 4);
        let renderer = FrameRenderer::new();
        let mut ctx = RenderContext::new(ColorMode::Mono);
        let block = renderer.encode(&grid, &mut ctx, RenderStyle::Block);
        let glyph = renderer.encode(&grid, &mut ctx, RenderStyle::Glyph);
        assert_eq!(block, glyph);
    }

    #[test]
    fn row_count_matches_fitted_height() {
        let mut renderer = FrameRenderer::new();
        for mode in [ColorMode::Mono, ColorMode::Indexed256, ColorMode::TrueColor24] {
            let mut ctx = RenderContext::new(mode);
            for &(sw, sh, tw, th) in &[(64, 48, 40, 20), (320, 90, 80, 24), (30, 200, 100, 30), (3, 3, 5, 5)] {
                let grid = gradient(sw, sh);
                let (w, h) = fit_dimensions(sw, sh, tw, th);
                for style in [RenderStyle::Glyph, RenderStyle::Block] {
                    let text = renderer.render(&grid, &mut ctx, style, (tw, th));
                    assert_eq!(text.matches('\n').count(), h as usize);
                    assert!(text.ends_with('\n'));
                    for line in text.lines() {
                        if mode.is_color() {
                            assert!(line.ends_with(RESET));
                        } else {
                            assert_eq!(line.chars().count(), w as usize);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn cycling_modes_trims_caches() {
        let grid = gradient(6, 3);
        let renderer = FrameRenderer::new();
        let mut ctx = RenderContext::new(ColorMode::Indexed256);
        renderer.encode(&grid, &mut ctx, RenderStyle::Glyph);
        assert!(ctx.codec().partition_len(ColorMode::Indexed256) > 0);

        assert_eq!(ctx.cycle_mode(), ColorMode::TrueColor24);
        assert_eq!(ctx.codec().partition_len(ColorMode::Indexed256), 0);
        renderer.encode(&grid, &mut ctx, RenderStyle::Glyph);
        assert!(ctx.codec().partition_len(ColorMode::TrueColor24) > 0);

        assert_eq!(ctx.cycle_mode(), ColorMode::Mono);
        assert!(ctx.codec().is_empty());
        assert_eq!(ctx.reset_code(), "");
    }

    #[test]
    fn empty_grid_renders_nothing() {
        let grid = PixelGrid::from_rgb24(0, 0, Vec::new()).unwrap();
        let mut renderer = FrameRenderer::new();
        let mut ctx = RenderContext::new(ColorMode::TrueColor24);
        assert_eq!(renderer.render(&grid, &mut ctx, RenderStyle::Glyph, (80, 24)), "");
    }
}
