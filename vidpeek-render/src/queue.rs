use std::collections::VecDeque;

use crate::error::RenderError;
use crate::request::PreviewFrameRequest;

/// FIFO of pending preview renders with per-generation de-duplication.
///
/// Not a priority queue: the scheduler enqueues near-to-far so the focused
/// frame is normally serviced first.
#[derive(Debug, Default)]
pub struct PreviewWorkQueue {
    entries: VecDeque<PreviewFrameRequest>,
}

impl PreviewWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `request` unless the same `(generation, index)` is already
    /// queued. Returns `true` if it was added.
    pub fn enqueue(&mut self, request: PreviewFrameRequest) -> bool {
        if self.contains(request.generation, request.index) {
            return false;
        }
        self.entries.push_back(request);
        true
    }

    pub fn dequeue(&mut self) -> crate::Result<PreviewFrameRequest> {
        self.entries.pop_front().ok_or(RenderError::EmptyQueue)
    }

    /// Keep only entries for which `keep` returns `true`. Returns how many
    /// were removed. Survivors keep their relative order.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&PreviewFrameRequest) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|r| keep(r));
        before - self.entries.len()
    }

    pub fn contains(&self, generation: u64, index: usize) -> bool {
        self.entries.iter().any(|r| r.same_slot(generation, index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued preview indices in service order.
    pub fn indices(&self) -> Vec<usize> {
        self.entries.iter().map(|r| r.index).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vidpeek_core::{EncodeJob, FrameError, FrameSource, PreviewImage};

    use super::*;

    struct Blank;

    impl FrameSource for Blank {
        fn preview_image(&self, _: &EncodeJob, _: usize) -> Result<PreviewImage, FrameError> {
            Ok(PreviewImage::new(1, 1))
        }
    }

    fn request(generation: u64, index: usize) -> PreviewFrameRequest {
        PreviewFrameRequest::new(
            generation,
            index,
            Arc::new(Blank),
            Arc::new(EncodeJob::new("clip.mp4")),
        )
    }

    #[test]
    fn dequeue_is_fifo() {
        let mut q = PreviewWorkQueue::new();
        q.enqueue(request(1, 5));
        q.enqueue(request(1, 4));
        q.enqueue(request(1, 6));

        assert_eq!(q.dequeue().unwrap().index, 5);
        assert_eq!(q.dequeue().unwrap().index, 4);
        assert_eq!(q.dequeue().unwrap().index, 6);
        assert!(matches!(q.dequeue(), Err(RenderError::EmptyQueue)));
    }

    #[test]
    fn duplicate_slot_rejected() {
        let mut q = PreviewWorkQueue::new();
        assert!(q.enqueue(request(1, 3)));
        assert!(!q.enqueue(request(1, 3)));
        // Same index under a newer generation is a different slot.
        assert!(q.enqueue(request(2, 3)));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn retain_prunes_and_keeps_order() {
        let mut q = PreviewWorkQueue::new();
        for i in [5, 4, 6, 3, 7, 2, 8] {
            q.enqueue(request(1, i));
        }

        let removed = q.retain(|r| r.index <= 3);
        assert_eq!(removed, 5);
        assert_eq!(q.indices(), vec![3, 2]);
    }
}
