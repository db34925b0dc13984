pub mod cache;
pub mod error;
pub mod export;
pub mod queue;
pub mod request;
pub mod scheduler;
pub mod window;

pub use cache::PreviewImageCache;
pub use error::RenderError;
pub use export::{export_png, FrameMetadata};
pub use queue::PreviewWorkQueue;
pub use request::PreviewFrameRequest;
pub use scheduler::{PreviewEvent, PreviewScheduler};
pub use window::{RetentionWindow, DEFAULT_RETENTION_RADIUS};

/// Convenience result type for the render crate.
pub type Result<T> = std::result::Result<T, RenderError>;
