pub mod engine;
pub mod error;
pub mod geometry;
pub mod image;
pub mod job;
pub mod observer;

// Re-export primary types for convenience.
pub use engine::{
    EncodeService, EngineEvent, EngineFactory, EngineInstance, FileLauncher, FrameError,
    FrameSource, ScanRequest, ScanService,
};
pub use error::CoreError;
pub use geometry::{SourceGeometry, NO_SOURCE_TITLE};
pub use image::PreviewImage;
pub use job::{ContainerFormat, EncodeJob, OutputExtension};
pub use observer::{PreviewObserver, SessionState};

/// Convenience result type for the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
