use rayon::prelude::*;

use crate::error::CoreError;

/// A decoded preview frame as an RGBA pixel buffer.
///
/// Frames are produced by the engine at storage resolution. Anamorphic
/// sources need [`resampled`](Self::resampled) to reach display size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    /// RGBA pixel data, 4 bytes per pixel, row-major order.
    pub pixels: Vec<u8>,
}

impl PreviewImage {
    /// Create a new image filled with black (opaque).
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0, 255])
    }

    /// Create an image where every pixel has the same RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Wrap raw RGBA bytes, checking that the length matches the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> crate::Result<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidDimensions { width, height });
        }
        let expected = byte_len(width, height);
        if pixels.len() != expected {
            return Err(CoreError::PixelBufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// RGBA value of the pixel at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[idx..idx + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Nearest-neighbour copy of this image at `width`×`height`.
    ///
    /// Rows are produced in parallel; each output row reads one source row.
    pub fn resampled(&self, width: u32, height: u32) -> crate::Result<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidDimensions { width, height });
        }
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }

        let src_w = self.width as usize;
        let src_h = self.height as usize;
        let dst_w = width as usize;
        let dst_h = height as usize;
        let mut pixels = vec![0u8; byte_len(width, height)];

        pixels
            .par_chunks_exact_mut(dst_w * 4)
            .enumerate()
            .for_each(|(dy, row)| {
                let sy = (dy * src_h / dst_h).min(src_h - 1);
                let src_row = &self.pixels[sy * src_w * 4..(sy + 1) * src_w * 4];
                for dx in 0..dst_w {
                    let sx = (dx * src_w / dst_w).min(src_w - 1);
                    row[dx * 4..dx * 4 + 4].copy_from_slice(&src_row[sx * 4..sx * 4 + 4]);
                }
            });

        Ok(Self {
            width,
            height,
            pixels,
        })
    }
}

fn byte_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}
