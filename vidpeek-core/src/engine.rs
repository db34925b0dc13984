//! Contracts for the external transcoding engine.
//!
//! The engine is opaque: it can scan a source, decode a preview still for a
//! given index, and encode a short clip. Long-running operations report
//! back through [`EngineEvent`]s sent on the channel supplied with the
//! request, so callers resume on their own thread by draining it.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use thiserror::Error;

use crate::geometry::SourceGeometry;
use crate::image::PreviewImage;
use crate::job::EncodeJob;

/// Failure of a single preview-frame render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// This frame could not be produced. Other frames may still succeed.
    #[error("preview frame failed: {0}")]
    Frame(String),

    /// The render channel itself is gone; no further frame will succeed.
    #[error("preview session lost: {0}")]
    SessionLost(String),
}

/// Completion and progress messages emitted by an engine instance.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ScanCompleted {
        geometry: SourceGeometry,
        preview_count: usize,
    },
    ScanFailed {
        message: String,
    },
    /// Fraction of the clip encoded so far, in `[0, 1]`.
    EncodeProgress {
        fraction: f64,
    },
    EncodeCompleted {
        error: Option<String>,
        cancelled: bool,
    },
}

/// Parameters for a source scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub path: PathBuf,
    pub preview_count: usize,
    pub title: u32,
}

/// Produces preview stills. Called from the preview worker thread.
pub trait FrameSource: Send + Sync {
    /// Decode preview `index` for `job`. Blocks until the image is ready.
    fn preview_image(&self, job: &EncodeJob, index: usize) -> Result<PreviewImage, FrameError>;
}

pub trait ScanService: FrameSource {
    /// Start scanning asynchronously. The result arrives on `events` as
    /// [`EngineEvent::ScanCompleted`] or [`EngineEvent::ScanFailed`].
    fn start_scan(&self, request: ScanRequest, events: Sender<EngineEvent>) -> crate::Result<()>;

    /// Storage size and pixel aspect of the scanned title as encoded by `job`.
    fn geometry(&self, job: &EncodeJob) -> Option<SourceGeometry>;
}

pub trait EncodeService: Send + Sync {
    /// Start encoding a preview clip of `seconds` beginning at preview
    /// `preview_index`. Progress and completion arrive on `events`.
    fn start_encode(
        &self,
        job: &EncodeJob,
        preview_index: usize,
        seconds: u32,
        events: Sender<EngineEvent>,
    ) -> crate::Result<()>;

    /// Ask the running encode to stop. Completion is still reported.
    fn stop_encode(&self);
}

/// One engine instance that can both scan and encode.
pub trait EngineInstance: ScanService + EncodeService {
    /// View this instance as the frame source handed to the preview worker.
    fn frame_source(self: Arc<Self>) -> Arc<dyn FrameSource>;
}

impl<T: ScanService + EncodeService + 'static> EngineInstance for T {
    fn frame_source(self: Arc<Self>) -> Arc<dyn FrameSource> {
        self
    }
}

/// Creates fresh engine instances.
pub trait EngineFactory: Send + Sync {
    fn create_instance(&self) -> crate::Result<Arc<dyn EngineInstance>>;
}

/// Opens a file with the operating system's default handler.
pub trait FileLauncher {
    fn launch_file(&self, path: &Path) -> crate::Result<()>;
}
