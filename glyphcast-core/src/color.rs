use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::frame::Rgb;

pub const RESET: &str = "\x1b[0m";

/// Terminal color fidelity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ColorMode {
    #[default]
    Mono,
    Indexed256,
    TrueColor24,
}

impl ColorMode {
    /// Cycle order: Mono -> Indexed256 -> TrueColor24 -> Mono.
    pub fn next(self) -> Self {
        match self {
            ColorMode::Mono => ColorMode::Indexed256,
            ColorMode::Indexed256 => ColorMode::TrueColor24,
            ColorMode::TrueColor24 => ColorMode::Mono,
        }
    }

    pub fn is_color(self) -> bool {
        !matches!(self, ColorMode::Mono)
    }

    /// Short tag for the status line.
    pub fn label(self) -> &'static str {
        match self {
            ColorMode::Mono => "MONO",
            ColorMode::Indexed256 => "8BIT",
            ColorMode::TrueColor24 => "24BIT",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ColorMode::Mono => "Monochrome",
            ColorMode::Indexed256 => "8-bit Color (Cached)",
            ColorMode::TrueColor24 => "24-bit Color (Cached)",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate in percent, 0 when nothing has been looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ColorKey {
    rgb: Rgb,
    background: bool,
}

/// Memoizing RGB → ANSI escape encoder.
///
/// Each color mode owns one partition keyed by (rgb, background). Indexed256
/// additionally memoizes the palette index per packed RGB so the foreground
/// and background escapes of one color share a single quantization.
#[derive(Debug, Default)]
pub struct ColorCodec {
    indexed: HashMap<ColorKey, String>,
    truecolor: HashMap<ColorKey, String>,
    rgb_to_index: HashMap<u32, u8>,
    stats: CacheStats,
}

impl ColorCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Escape sequence for `rgb` in `mode`. Mono never emits color.
    pub fn escape_for(&mut self, mode: ColorMode, rgb: Rgb, background: bool) -> &str {
        let key = ColorKey { rgb, background };
        let Self {
            indexed,
            truecolor,
            rgb_to_index,
            stats,
        } = self;
        let cache = match mode {
            ColorMode::Mono => return "",
            ColorMode::Indexed256 => indexed,
            ColorMode::TrueColor24 => truecolor,
        };

        let code = match cache.entry(key) {
            Entry::Occupied(e) => {
                stats.hits += 1;
                e.into_mut()
            }
            Entry::Vacant(e) => {
                stats.misses += 1;
                let code = if mode == ColorMode::Indexed256 {
                    let index = *rgb_to_index
                        .entry(rgb.packed())
                        .or_insert_with(|| quantize_256(rgb));
                    indexed_escape(index, background)
                } else {
                    truecolor_escape(rgb, background)
                };
                e.insert(code)
            }
        };
        code.as_str()
    }

    /// Drop every partition `active` does not use. The shared index cache
    /// only serves Indexed256 and goes with it.
    pub fn retain_mode(&mut self, active: ColorMode) {
        if active != ColorMode::Indexed256 {
            self.indexed.clear();
            self.rgb_to_index.clear();
        }
        if active != ColorMode::TrueColor24 {
            self.truecolor.clear();
        }
        log::debug!(
            "color caches trimmed for {}: {} entries left",
            active.label(),
            self.len()
        );
    }

    /// Empty every partition and zero the counters.
    pub fn clear(&mut self) {
        self.indexed.clear();
        self.truecolor.clear();
        self.rgb_to_index.clear();
        self.stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Total memoized entries, index cache included.
    pub fn len(&self) -> usize {
        self.indexed.len() + self.truecolor.len() + self.rgb_to_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn partition_len(&self, mode: ColorMode) -> usize {
        match mode {
            ColorMode::Mono => 0,
            ColorMode::Indexed256 => self.indexed.len(),
            ColorMode::TrueColor24 => self.truecolor.len(),
        }
    }

    pub fn index_cache_len(&self) -> usize {
        self.rgb_to_index.len()
    }
}

/// Map an RGB triple onto the xterm 256-color palette.
///
/// Exact grays use the 24-step ramp at 232..=255, with the ends pinned to the
/// cube's black (16) and white (231). Everything else lands in the 6x6x6 cube.
pub fn quantize_256(rgb: Rgb) -> u8 {
    if rgb.is_gray() {
        let v = rgb.r;
        if v < 8 {
            16
        } else if v > 248 {
            231
        } else {
            232 + ((v - 8) as f32 / 247.0 * 24.0) as u8
        }
    } else {
        let level = |c: u8| (c as f32 / 255.0 * 5.0) as u8;
        16 + 36 * level(rgb.r) + 6 * level(rgb.g) + level(rgb.b)
    }
}

fn indexed_escape(index: u8, background: bool) -> String {
    format!("\x1b[{};5;{index}m", if background { 48 } else { 38 })
}

fn truecolor_escape(rgb: Rgb, background: bool) -> String {
    format!(
        "\x1b[{};2;{};{};{}m",
        if background { 48 } else { 38 },
        rgb.r,
        rgb.g,
        rgb.b
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb::new(255, 0, 0);

    #[test]
    fn mono_is_silent() {
        let mut codec = ColorCodec::new();
        assert_eq!(codec.escape_for(ColorMode::Mono, RED, false), "");
        assert_eq!(codec.escape_for(ColorMode::Mono, RED, true), "");
        assert_eq!(codec.stats(), CacheStats::default());
        assert!(codec.is_empty());
    }

    #[test]
    fn escape_formats() {
        let mut codec = ColorCodec::new();
        assert_eq!(
            codec.escape_for(ColorMode::TrueColor24, Rgb::new(10, 20, 30), false),
            "\x1b[38;2;10;20;30m"
        );
        assert_eq!(
            codec.escape_for(ColorMode::TrueColor24, Rgb::new(10, 20, 30), true),
            "\x1b[48;2;10;20;30m"
        );
        assert_eq!(codec.escape_for(ColorMode::Indexed256, RED, false), "\x1b[38;5;196m");
        assert_eq!(codec.escape_for(ColorMode::Indexed256, RED, true), "\x1b[48;5;196m");
    }

    #[test]
    fn quantization_bands() {
        assert_eq!(quantize_256(Rgb::new(0, 0, 0)), 16);
        assert_eq!(quantize_256(Rgb::new(7, 7, 7)), 16);
        assert_eq!(quantize_256(Rgb::new(8, 8, 8)), 232);
        assert_eq!(quantize_256(Rgb::new(128, 128, 128)), 243);
        assert_eq!(quantize_256(Rgb::new(248, 248, 248)), 255);
        assert_eq!(quantize_256(Rgb::new(249, 249, 249)), 231);
        assert_eq!(quantize_256(Rgb::new(0, 0, 255)), 21);
        assert_eq!(quantize_256(Rgb::new(255, 255, 0)), 226);
        assert_eq!(quantize_256(Rgb::new(100, 150, 200)), 16 + 36 + 6 * 2 + 3);
    }

    #[test]
    fn repeated_lookups_hit() {
        let mut codec = ColorCodec::new();
        let first = codec.escape_for(ColorMode::TrueColor24, RED, false).to_string();
        assert_eq!(codec.stats(), CacheStats { hits: 0, misses: 1 });

        for n in 1..=5 {
            let again = codec.escape_for(ColorMode::TrueColor24, RED, false);
            assert_eq!(again, first);
            assert_eq!(codec.stats(), CacheStats { hits: n, misses: 1 });
        }
        assert!((codec.stats().hit_rate() - 500.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn background_flag_is_its_own_key() {
        let mut codec = ColorCodec::new();
        codec.escape_for(ColorMode::Indexed256, RED, false);
        codec.escape_for(ColorMode::Indexed256, RED, true);
        assert_eq!(codec.stats().misses, 2);
        assert_eq!(codec.partition_len(ColorMode::Indexed256), 2);
        // both escapes share one quantization
        assert_eq!(codec.index_cache_len(), 1);
    }

    #[test]
    fn retain_mode_drops_inactive_partitions() {
        let mut codec = ColorCodec::new();
        codec.escape_for(ColorMode::Indexed256, RED, false);
        codec.escape_for(ColorMode::TrueColor24, RED, false);

        codec.retain_mode(ColorMode::TrueColor24);
        assert_eq!(codec.partition_len(ColorMode::Indexed256), 0);
        assert_eq!(codec.index_cache_len(), 0);
        assert_eq!(codec.partition_len(ColorMode::TrueColor24), 1);

        codec.retain_mode(ColorMode::Mono);
        assert!(codec.is_empty());
        // stats survive a mode switch
        assert_eq!(codec.stats().misses, 2);
    }

    #[test]
    fn regeneration_after_mode_round_trip_is_identical() {
        let mut codec = ColorCodec::new();
        let colors = [RED, Rgb::new(12, 200, 77), Rgb::new(90, 90, 90)];
        let before: Vec<(String, String)> = colors
            .iter()
            .map(|&c| {
                (
                    codec.escape_for(ColorMode::Indexed256, c, false).to_string(),
                    codec.escape_for(ColorMode::TrueColor24, c, true).to_string(),
                )
            })
            .collect();

        codec.retain_mode(ColorMode::Mono);
        assert!(codec.is_empty());

        for (c, (indexed, truecolor)) in colors.iter().zip(before) {
            assert_eq!(codec.escape_for(ColorMode::Indexed256, *c, false), indexed);
            assert_eq!(codec.escape_for(ColorMode::TrueColor24, *c, true), truecolor);
        }
    }

    #[test]
    fn clear_resets_everything() {
        let mut codec = ColorCodec::new();
        codec.escape_for(ColorMode::TrueColor24, RED, false);
        codec.escape_for(ColorMode::TrueColor24, RED, false);
        codec.clear();
        assert_eq!(codec.stats(), CacheStats::default());
        assert_eq!(codec.stats().hit_rate(), 0.0);
        assert!(codec.is_empty());

        codec.escape_for(ColorMode::TrueColor24, RED, false);
        assert_eq!(codec.stats(), CacheStats { hits: 0, misses: 1 });
    }

    #[test]
    fn mode_cycle() {
        assert_eq!(ColorMode::Mono.next(), ColorMode::Indexed256);
        assert_eq!(ColorMode::Indexed256.next(), ColorMode::TrueColor24);
        assert_eq!(ColorMode::TrueColor24.next(), ColorMode::Mono);
    }
}
