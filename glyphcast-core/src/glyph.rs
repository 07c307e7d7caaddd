/// Character ramp ordered from least to most ink.
pub const ASCII_RAMP: &str =
    " .'`^\",:;Il!i><~+_-?][}{1)(|\\/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$";

/// Brightness → glyph lookup, built once per ramp.
#[derive(Clone, Debug)]
pub struct GlyphMapper {
    table: [char; 256],
}

impl GlyphMapper {
    pub fn new() -> Self {
        Self::with_ramp(ASCII_RAMP)
    }

    /// Build from a custom ramp. An empty ramp maps everything to a space.
    pub fn with_ramp(ramp: &str) -> Self {
        let chars: Vec<char> = ramp.chars().collect();
        let mut table = [' '; 256];
        if let Some(last) = chars.len().checked_sub(1) {
            for (b, slot) in table.iter_mut().enumerate() {
                *slot = chars[b * last / 255];
            }
        }
        Self { table }
    }

    pub fn char_for_brightness(&self, brightness: u8) -> char {
        self.table[brightness as usize]
    }
}

impl Default for GlyphMapper {
    fn default() -> Self {
        Self::new()
    }
}
