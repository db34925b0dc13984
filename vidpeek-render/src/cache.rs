use std::sync::Arc;

use tracing::debug;
use vidpeek_core::PreviewImage;

use crate::window::RetentionWindow;

/// Fixed-size slot array of decoded previews, indexed by preview number.
///
/// The generation tag is bumped on every [`resize`](Self::resize). Writes
/// carrying an older generation are ignored, which is how renders started
/// before a reset get discarded. Not synchronised; the scheduler guards it.
#[derive(Debug, Default)]
pub struct PreviewImageCache {
    slots: Vec<Option<Arc<PreviewImage>>>,
    generation: u64,
}

impl PreviewImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry, reallocate `count` empty slots and start a new
    /// generation. Returns the new generation.
    pub fn resize(&mut self, count: usize) -> u64 {
        self.slots = vec![None; count];
        self.generation += 1;
        debug!(count, generation = self.generation, "Preview cache reset");
        self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<PreviewImage>> {
        self.slots.get(index).and_then(Clone::clone)
    }

    pub fn contains(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Store `image` at `index` if `generation` is still current.
    ///
    /// Returns `true` when the slot was written.
    pub fn set(&mut self, index: usize, image: Arc<PreviewImage>, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = Some(image);
                true
            }
            None => false,
        }
    }

    pub fn evict(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
    }

    /// Evict every entry outside `window`. Returns how many were dropped.
    pub fn evict_outside(&mut self, window: &RetentionWindow) -> usize {
        let mut evicted = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some() && !window.contains(index) {
                *slot = None;
                evicted += 1;
            }
        }
        evicted
    }

    /// Indices that currently hold an image, ascending.
    pub fn cached_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
            .collect()
    }
}
