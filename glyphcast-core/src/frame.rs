/// A single pixel, red/green/blue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const SIZE: usize = 3;

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_bytes(b: &[u8]) -> Self {
        Self {
            r: b[0],
            g: b[1],
            b: b[2],
        }
    }

    /// Pack into `0x00RRGGBB`.
    pub fn packed(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    pub fn is_gray(self) -> bool {
        self.r == self.g && self.g == self.b
    }

    /// Perceptual brightness (ITU-R BT.601 weights), truncated.
    pub fn luma(self) -> u8 {
        let y = 0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32;
        y.clamp(0.0, 255.0) as u8
    }
}

/// One decoded frame: packed rgb24 bytes, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelGrid {
    /// Wrap raw rgb24 data. The buffer must hold exactly `width * height` pixels.
    pub fn from_rgb24(width: u32, height: u32, data: Vec<u8>) -> anyhow::Result<Self> {
        let expected = width as usize * height as usize * Rgb::SIZE;
        if data.len() != expected {
            anyhow::bail!(
                "rgb24 buffer is {} bytes, expected {expected} for {width}x{height}",
                data.len()
            );
        }
        Ok(Self { width, height, data })
    }

    pub fn from_pixels(width: u32, height: u32, pixels: &[Rgb]) -> anyhow::Result<Self> {
        let mut data = Vec::with_capacity(pixels.len() * Rgb::SIZE);
        for p in pixels {
            data.extend_from_slice(&[p.r, p.g, p.b]);
        }
        Self::from_rgb24(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        let off = (y as usize * self.width as usize + x as usize) * Rgb::SIZE;
        Rgb::from_bytes(&self.data[off..off + Rgb::SIZE])
    }

    /// Iterate rows as pixel iterators, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = impl Iterator<Item = Rgb> + '_> + '_ {
        let stride = (self.width as usize * Rgb::SIZE).max(1);
        self.data
            .chunks_exact(stride)
            .map(|row| row.chunks_exact(Rgb::SIZE).map(Rgb::from_bytes))
    }

    /// Nearest-neighbour resample. Only used when the area resizer is unavailable.
    pub fn sample_nearest(&self, width: u32, height: u32) -> PixelGrid {
        let mut data = Vec::with_capacity(width as usize * height as usize * Rgb::SIZE);
        for y in 0..height {
            let sy = (y as u64 * self.height as u64 / height.max(1) as u64) as u32;
            for x in 0..width {
                let sx = (x as u64 * self.width as u64 / width.max(1) as u64) as u32;
                let p = self.pixel(sx, sy);
                data.extend_from_slice(&[p.r, p.g, p.b]);
            }
        }
        PixelGrid { width, height, data }
    }
}
