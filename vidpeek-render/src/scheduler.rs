//! Background preview scheduling.
//!
//! The scheduler owns the preview cache and work queue behind one mutex and
//! drives at most one worker thread. The worker is spawned when the queue
//! goes from idle to non-empty and exits once it finds the queue empty;
//! that final check and clearing `worker_active` happen under the same lock
//! acquisition, so an enqueuer either sees an active worker that will pick
//! its request up or spawns a new one.
//!
//! There is no cancellation signal. Resets bump the cache generation and a
//! render that finishes under an old generation is simply dropped, as is
//! one whose index left the retention window while it was in flight.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, error, info, warn};
use vidpeek_core::{EncodeJob, FrameError, FrameSource, PreviewImage};

use crate::cache::PreviewImageCache;
use crate::queue::PreviewWorkQueue;
use crate::request::PreviewFrameRequest;
use crate::window::{RetentionWindow, DEFAULT_RETENTION_RADIUS};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Sent from the worker thread to whoever pumps the UI-affine thread.
#[derive(Debug, Clone)]
pub enum PreviewEvent {
    /// A frame for the focused index finished rendering.
    Published {
        generation: u64,
        index: usize,
        image: Arc<PreviewImage>,
    },
    /// The frame source reported the whole session lost. Sent once.
    SessionFailed { generation: u64, message: String },
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SchedulerState {
    cache: PreviewImageCache,
    queue: PreviewWorkQueue,
    selected: usize,
    source: Option<Arc<dyn FrameSource>>,
    job: Option<Arc<EncodeJob>>,
    /// `(generation, index)` the worker is rendering right now.
    in_flight: Option<(u64, usize)>,
    worker_active: bool,
    failed: bool,
}

impl SchedulerState {
    fn window(&self, radius: usize) -> RetentionWindow {
        RetentionWindow::new(self.selected, radius, self.cache.len())
    }

    /// Move the focus, drop out-of-window work and queue what is missing.
    /// Returns the cached frame for the new focus, if any.
    fn focus(&mut self, index: usize, radius: usize) -> Option<Arc<PreviewImage>> {
        let count = self.cache.len();
        if count == 0 {
            return None;
        }
        self.selected = index.min(count - 1);

        let window = self.window(radius);
        let pruned = self.queue.retain(|r| window.contains(r.index));
        let evicted = self.cache.evict_outside(&window);
        if pruned > 0 || evicted > 0 {
            debug!(
                selected = self.selected,
                pruned, evicted, "Dropped out-of-window previews"
            );
        }

        self.enqueue_window(radius);
        self.cache.get(self.selected)
    }

    /// Reallocate for a new source. Returns the new generation.
    fn reset(
        &mut self,
        count: usize,
        source: Arc<dyn FrameSource>,
        job: Arc<EncodeJob>,
        radius: usize,
    ) -> u64 {
        let generation = self.cache.resize(count);
        self.queue.clear();
        self.source = Some(source);
        self.job = Some(job);
        self.failed = false;
        if count > 0 && self.selected >= count {
            self.selected = count - 1;
        }
        self.enqueue_window(radius);
        generation
    }

    /// Queue every in-window index that is not cached, queued or rendering.
    fn enqueue_window(&mut self, radius: usize) {
        let (Some(source), Some(job)) = (&self.source, &self.job) else {
            return;
        };
        let generation = self.cache.generation();
        for index in self.window(radius).fill_order() {
            if self.cache.contains(index) || self.in_flight == Some((generation, index)) {
                continue;
            }
            let request =
                PreviewFrameRequest::new(generation, index, Arc::clone(source), Arc::clone(job));
            self.queue.enqueue(request);
        }
    }

    /// Mark the worker active if one is needed and none is running.
    fn claim_worker(&mut self) -> bool {
        if self.worker_active || self.failed || self.queue.is_empty() {
            return false;
        }
        self.worker_active = true;
        true
    }
}

fn lock(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    // Every critical section leaves the state consistent, so a panic in
    // another holder does not invalidate it.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Coordinates the preview cache, the work queue and the render worker.
///
/// The public entry points are meant for the UI-affine thread and are safe
/// to call while the worker is draining the queue.
pub struct PreviewScheduler {
    state: Arc<Mutex<SchedulerState>>,
    events: Sender<PreviewEvent>,
    radius: usize,
}

impl PreviewScheduler {
    /// Create a scheduler with the default retention radius.
    ///
    /// Returns the receive side for worker events; drain it on the UI thread.
    pub fn new() -> (Self, Receiver<PreviewEvent>) {
        Self::with_radius(DEFAULT_RETENTION_RADIUS)
    }

    pub fn with_radius(radius: usize) -> (Self, Receiver<PreviewEvent>) {
        let (tx, rx) = mpsc::channel();
        let scheduler = Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            events: tx,
            radius,
        };
        (scheduler, rx)
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Focus `index` (clamped into range). Returns the cached frame for it
    /// so the caller can show it without waiting for the worker.
    pub fn on_focus_changed(&self, index: usize) -> Option<Arc<PreviewImage>> {
        let mut state = lock(&self.state);
        let cached = state.focus(index, self.radius);
        self.ensure_worker(&mut state);
        cached
    }

    /// Start a new session with `preview_count` slots rendered from `source`.
    /// Returns the new generation.
    pub fn on_source_reset(
        &self,
        preview_count: usize,
        source: Arc<dyn FrameSource>,
        job: Arc<EncodeJob>,
    ) -> u64 {
        let mut state = lock(&self.state);
        let generation = state.reset(preview_count, source, job, self.radius);
        info!(
            generation,
            preview_count,
            selected = state.selected,
            "Preview session reset"
        );
        self.ensure_worker(&mut state);
        generation
    }

    /// Whether a frame for `(generation, index)` is still what the UI wants.
    pub fn is_live(&self, generation: u64, index: usize) -> bool {
        let state = lock(&self.state);
        state.cache.generation() == generation && state.selected == index
    }

    pub fn generation(&self) -> u64 {
        lock(&self.state).cache.generation()
    }

    pub fn selected(&self) -> usize {
        lock(&self.state).selected
    }

    pub fn preview_count(&self) -> usize {
        lock(&self.state).cache.len()
    }

    pub fn cached(&self, index: usize) -> Option<Arc<PreviewImage>> {
        lock(&self.state).cache.get(index)
    }

    pub fn cached_indices(&self) -> Vec<usize> {
        lock(&self.state).cache.cached_indices()
    }

    pub fn queued_indices(&self) -> Vec<usize> {
        lock(&self.state).queue.indices()
    }

    pub fn is_worker_active(&self) -> bool {
        lock(&self.state).worker_active
    }

    /// Whether the current session has been marked failed by the worker.
    pub fn is_failed(&self) -> bool {
        lock(&self.state).failed
    }

    fn ensure_worker(&self, state: &mut SchedulerState) {
        if !state.claim_worker() {
            return;
        }
        let shared = Arc::clone(&self.state);
        let events = self.events.clone();
        let radius = self.radius;
        let spawned = thread::Builder::new()
            .name("preview-worker".into())
            .spawn(move || run_worker(&shared, &events, radius));
        if let Err(e) = spawned {
            error!("Failed to spawn preview worker: {e}");
            state.worker_active = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

fn run_worker(shared: &Mutex<SchedulerState>, events: &Sender<PreviewEvent>, radius: usize) {
    debug!("Preview worker started");
    loop {
        let request = {
            let mut state = lock(shared);
            match state.queue.dequeue() {
                Ok(request) => {
                    state.in_flight = Some((request.generation, request.index));
                    request
                }
                Err(_) => {
                    state.worker_active = false;
                    break;
                }
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            request.source.preview_image(&request.job, request.index)
        }))
        .unwrap_or_else(|_| Err(FrameError::Frame("frame source panicked".into())));

        let mut state = lock(shared);
        state.in_flight = None;
        match outcome {
            Ok(image) => {
                let image = Arc::new(image);
                let stored = state.window(radius).contains(request.index)
                    && state
                        .cache
                        .set(request.index, Arc::clone(&image), request.generation);
                if !stored {
                    debug!(
                        generation = request.generation,
                        index = request.index,
                        "Discarded stale preview"
                    );
                } else if state.selected == request.index {
                    let _ = events.send(PreviewEvent::Published {
                        generation: request.generation,
                        index: request.index,
                        image,
                    });
                }
            }
            Err(FrameError::Frame(message)) => {
                warn!(index = request.index, "Preview render failed: {message}");
            }
            Err(FrameError::SessionLost(message)) => {
                if request.generation == state.cache.generation() {
                    error!(
                        generation = request.generation,
                        "Preview session failed: {message}"
                    );
                    state.queue.clear();
                    state.failed = true;
                    state.worker_active = false;
                    let _ = events.send(PreviewEvent::SessionFailed {
                        generation: request.generation,
                        message,
                    });
                    break;
                }
                debug!(
                    generation = request.generation,
                    "Ignoring failure from superseded session: {message}"
                );
            }
        }

        if state.queue.is_empty() {
            state.worker_active = false;
            break;
        }
    }
    debug!("Preview worker exiting");
}
