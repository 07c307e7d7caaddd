use anyhow::Context;
use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};

use crate::frame::{PixelGrid, Rgb};

/// Area-averaging frame resizer. Keeps one `Resizer` alive so its scratch
/// buffers are reused across frames.
pub struct FrameResizer {
    resizer: Resizer,
    options: ResizeOptions,
}

impl FrameResizer {
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
            // Box convolution averages every source pixel under the target cell.
            options: ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box)),
        }
    }

    /// Resize an rgb24 grid to `width` x `height`.
    pub fn resize(&mut self, src: &PixelGrid, width: u32, height: u32) -> anyhow::Result<PixelGrid> {
        if src.width() == width && src.height() == height {
            return Ok(src.clone());
        }

        let src_image = Image::from_vec_u8(src.width(), src.height(), src.as_bytes().to_vec(), PixelType::U8x3)
            .context("failed to create source image")?;

        let mut dst_image = Image::new(width, height, PixelType::U8x3);

        self.resizer
            .resize(&src_image, &mut dst_image, &self.options)
            .context("resize failed")?;

        PixelGrid::from_rgb24(width, height, dst_image.into_vec())
    }
}

impl Default for FrameResizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Luma plane of `grid`, one byte per pixel.
pub fn to_grayscale(grid: &PixelGrid) -> Vec<u8> {
    grid.as_bytes()
        .chunks_exact(Rgb::SIZE)
        .map(|px| Rgb::from_bytes(px).luma())
        .collect()
}

/// Histogram equalization in place: stretch the cumulative distribution over
/// the full 0..=255 range. A flat image is left unchanged.
pub fn equalize_contrast(luma: &mut [u8]) {
    let mut hist = [0usize; 256];
    for &v in luma.iter() {
        hist[v as usize] += 1;
    }

    let total = luma.len();
    let Some(lowest) = hist.iter().position(|&n| n > 0) else {
        return;
    };
    if hist[lowest] == total {
        return;
    }

    let scale = 255.0 / (total - hist[lowest]) as f32;
    let mut lut = [0u8; 256];
    let mut sum = 0usize;
    for v in lowest + 1..256 {
        sum += hist[v];
        lut[v] = (sum as f32 * scale).round().min(255.0) as u8;
    }

    for v in luma.iter_mut() {
        *v = lut[*v as usize];
    }
}
