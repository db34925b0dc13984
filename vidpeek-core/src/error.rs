use thiserror::Error;

/// Errors originating from the preview data model and engine contracts.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid image dimensions: {width}×{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    PixelBufferSize { expected: usize, actual: usize },

    #[error("invalid pixel aspect ratio {par_width}:{par_height}")]
    InvalidPixelAspect { par_width: u32, par_height: u32 },

    #[error("engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
