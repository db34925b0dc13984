use std::fmt;
use std::sync::Arc;

use vidpeek_core::{EncodeJob, FrameSource};

/// One pending preview-frame render.
///
/// Captures the generation it was queued under so a result that finishes
/// after a reset can be recognised as stale and dropped.
#[derive(Clone)]
pub struct PreviewFrameRequest {
    pub generation: u64,
    pub index: usize,
    pub source: Arc<dyn FrameSource>,
    pub job: Arc<EncodeJob>,
}

impl PreviewFrameRequest {
    pub fn new(
        generation: u64,
        index: usize,
        source: Arc<dyn FrameSource>,
        job: Arc<EncodeJob>,
    ) -> Self {
        Self {
            generation,
            index,
            source,
            job,
        }
    }

    /// Whether this request targets the same slot of the same generation.
    pub fn same_slot(&self, generation: u64, index: usize) -> bool {
        self.generation == generation && self.index == index
    }
}

impl fmt::Debug for PreviewFrameRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewFrameRequest")
            .field("generation", &self.generation)
            .field("index", &self.index)
            .field("source", &self.job.source_path)
            .finish()
    }
}
