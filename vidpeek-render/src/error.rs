use thiserror::Error;

/// Errors originating from the preview pipeline.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("preview work queue is empty")]
    EmptyQueue,

    #[error("PNG export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Core(#[from] vidpeek_core::CoreError),
}
