use crate::error::CoreError;

/// Title shown before any source has been scanned.
pub const NO_SOURCE_TITLE: &str = "Preview: No video source";

/// Storage size and pixel aspect ratio of a scanned title.
///
/// Storage pixels are not necessarily square. The display width is the
/// storage width stretched by `par_width / par_height`; height is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceGeometry {
    /// Storage width in pixels.
    pub width: u32,
    /// Storage height in pixels.
    pub height: u32,
    pub par_width: u32,
    pub par_height: u32,
}

impl SourceGeometry {
    pub fn new(width: u32, height: u32, par_width: u32, par_height: u32) -> crate::Result<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidDimensions { width, height });
        }
        if par_width == 0 || par_height == 0 {
            return Err(CoreError::InvalidPixelAspect {
                par_width,
                par_height,
            });
        }
        Ok(Self {
            width,
            height,
            par_width,
            par_height,
        })
    }

    /// Geometry with square pixels.
    pub fn square(width: u32, height: u32) -> crate::Result<Self> {
        Self::new(width, height, 1, 1)
    }

    pub fn has_square_pixels(&self) -> bool {
        self.par_width == self.par_height
    }

    pub fn display_width(&self) -> f64 {
        self.width as f64 * (self.par_width as f64 / self.par_height as f64)
    }

    pub fn display_height(&self) -> f64 {
        self.height as f64
    }

    /// Display size rounded to whole pixels, never below 1×1.
    pub fn display_size(&self) -> (u32, u32) {
        let w = self.display_width().round().max(1.0) as u32;
        let h = self.display_height().round().max(1.0) as u32;
        (w, h)
    }

    /// Window title describing this geometry.
    pub fn title(&self) -> String {
        if self.has_square_pixels() {
            format!("Preview: {}x{}", self.width, self.height)
        } else {
            format!(
                "Preview: Display {}x{} - Storage {}x{}",
                self.display_width().round(),
                self.display_height().round(),
                self.width,
                self.height
            )
        }
    }
}
