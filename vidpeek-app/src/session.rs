//! Preview session state machine.
//!
//! Drives scan → reset → schedule for the preview strip, and the separate
//! scan → encode → launch flow for preview clips. Engine completions arrive
//! as [`EngineEvent`]s on per-request channels and are applied in [`pump`],
//! which must run on the UI-affine thread together with every other method.
//!
//! [`pump`]: PreviewSessionController::pump

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use vidpeek_core::{
    EncodeJob, EngineEvent, EngineFactory, EngineInstance, FileLauncher, PreviewObserver,
    ScanRequest, SessionState, SourceGeometry, NO_SOURCE_TITLE,
};
use vidpeek_render::{PreviewEvent, PreviewScheduler};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings a session reads at construction time.
#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    /// Previews requested from every scan.
    pub(crate) preview_count: usize,
    /// Length of generated preview clips.
    pub(crate) preview_seconds: u32,
    pub(crate) retention_radius: usize,
    /// Directory preview clips are written to.
    pub(crate) clip_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClipPhase {
    Scanning,
    Encoding,
}

struct ClipRun {
    instance: Arc<dyn EngineInstance>,
    events: Receiver<EngineEvent>,
    phase: ClipPhase,
    job: EncodeJob,
    cancelled: bool,
}

struct ScanRun {
    instance: Arc<dyn EngineInstance>,
    events: Receiver<EngineEvent>,
    job: EncodeJob,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub(crate) struct PreviewSessionController<O: PreviewObserver> {
    factory: Arc<dyn EngineFactory>,
    launcher: Box<dyn FileLauncher>,
    observer: O,
    config: SessionConfig,

    scheduler: PreviewScheduler,
    preview_events: Receiver<PreviewEvent>,

    state: SessionState,
    job: Option<EncodeJob>,
    /// Job the current preview strip was rendered for.
    active_job: Option<Arc<EncodeJob>>,
    geometry: Option<SourceGeometry>,
    title: String,
    has_preview: bool,
    progress: f64,

    scan: Option<ScanRun>,
    clip: Option<ClipRun>,
}

impl<O: PreviewObserver> PreviewSessionController<O> {
    pub(crate) fn new(
        factory: Arc<dyn EngineFactory>,
        launcher: Box<dyn FileLauncher>,
        observer: O,
        config: SessionConfig,
    ) -> Self {
        let (scheduler, preview_events) = PreviewScheduler::with_radius(config.retention_radius);
        Self {
            factory,
            launcher,
            observer,
            config,
            scheduler,
            preview_events,
            state: SessionState::NoSource,
            job: None,
            active_job: None,
            geometry: None,
            title: NO_SOURCE_TITLE.to_string(),
            has_preview: false,
            progress: 0.0,
            scan: None,
            clip: None,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn observer(&self) -> &O {
        &self.observer
    }

    pub(crate) fn scheduler(&self) -> &PreviewScheduler {
        &self.scheduler
    }

    pub(crate) fn title(&self) -> &str {
        &self.title
    }

    pub(crate) fn geometry(&self) -> Option<SourceGeometry> {
        self.geometry
    }

    pub(crate) fn active_job(&self) -> Option<&EncodeJob> {
        self.active_job.as_deref()
    }

    pub(crate) fn has_preview(&self) -> bool {
        self.has_preview
    }

    pub(crate) fn selected(&self) -> usize {
        self.scheduler.selected()
    }

    /// Clip encode progress in `[0, 1]`.
    pub(crate) fn progress(&self) -> f64 {
        self.progress
    }

    pub(crate) fn preview_seconds(&self) -> u32 {
        self.config.preview_seconds
    }

    pub(crate) fn set_preview_seconds(&mut self, seconds: u32) {
        self.config.preview_seconds = seconds;
    }

    /// Highest index the preview slider can reach.
    pub(crate) fn slider_max(&self) -> usize {
        let count = self.scheduler.preview_count();
        if count > 0 {
            count - 1
        } else {
            self.config.preview_count.saturating_sub(1)
        }
    }

    pub(crate) fn slider_enabled(&self) -> bool {
        self.has_preview && self.state != SessionState::GeneratingClip
    }

    pub(crate) fn can_generate_clip(&self) -> bool {
        self.has_preview && self.state == SessionState::Ready
    }

    pub(crate) fn can_refresh(&self) -> bool {
        !self.state.is_busy()
    }

    // -- Commands -----------------------------------------------------------

    /// Replace the video source. Takes effect on the next [`refresh`](Self::refresh).
    pub(crate) fn set_source(&mut self, job: Option<EncodeJob>) {
        self.job = job;
    }

    /// Rescan the current source. Returns whether a scan was started.
    ///
    /// Rejected while a scan or clip encode is running.
    pub(crate) fn refresh(&mut self) -> bool {
        if !self.can_refresh() {
            debug!(state = ?self.state, "Refresh rejected while busy");
            return false;
        }

        let Some(job) = self.job.clone() else {
            self.has_preview = false;
            self.geometry = None;
            self.title = NO_SOURCE_TITLE.to_string();
            self.set_state(SessionState::NoSource);
            return false;
        };

        let instance = match self.factory.create_instance() {
            Ok(instance) => instance,
            Err(e) => {
                self.fail(&format!("Could not start preview scan: {e}"), SessionState::NoSource);
                return false;
            }
        };

        let (tx, rx) = mpsc::channel();
        let request = ScanRequest {
            path: job.source_path.clone(),
            preview_count: self.config.preview_count,
            title: job.title,
        };
        if let Err(e) = instance.start_scan(request, tx) {
            self.fail(&format!("Could not start preview scan: {e}"), SessionState::NoSource);
            return false;
        }

        info!("Scanning {} for previews", job.source_path.display());
        self.scan = Some(ScanRun {
            instance,
            events: rx,
            job,
        });
        self.set_state(SessionState::Scanning);
        true
    }

    /// Focus preview `index`. A frame already in the cache is published
    /// immediately; otherwise it is published when the worker finishes it.
    pub(crate) fn select_preview(&mut self, index: usize) -> bool {
        if !self.slider_enabled() {
            return false;
        }
        if let Some(image) = self.scheduler.on_focus_changed(index) {
            self.observer
                .on_image_published(self.scheduler.selected(), image);
        }
        true
    }

    /// Encode a short clip starting at the selected preview.
    pub(crate) fn generate_clip(&mut self) -> bool {
        if !self.can_generate_clip() {
            return false;
        }
        let Some(job) = self.active_job.as_deref().cloned() else {
            return false;
        };

        info!("Generating preview clip");
        info!("Scanning title");

        let instance = match self.factory.create_instance() {
            Ok(instance) => instance,
            Err(e) => {
                self.fail(&format!("Could not start preview clip: {e}"), SessionState::Ready);
                return false;
            }
        };

        let (tx, rx) = mpsc::channel();
        let request = ScanRequest {
            path: job.source_path.clone(),
            preview_count: self.config.preview_count,
            title: job.title,
        };
        if let Err(e) = instance.start_scan(request, tx) {
            self.fail(&format!("Could not start preview clip: {e}"), SessionState::Ready);
            return false;
        }

        self.clip = Some(ClipRun {
            instance,
            events: rx,
            phase: ClipPhase::Scanning,
            job,
            cancelled: false,
        });
        self.set_progress(0.0);
        self.set_state(SessionState::GeneratingClip);
        true
    }

    /// Stop the running clip encode. The session returns to `Ready` once the
    /// engine confirms completion.
    pub(crate) fn cancel_clip(&mut self) -> bool {
        let Some(clip) = self.clip.as_mut() else {
            return false;
        };
        if clip.cancelled {
            return false;
        }
        clip.cancelled = true;
        if clip.phase == ClipPhase::Encoding {
            clip.instance.stop_encode();
        }
        debug!(phase = ?clip.phase, "Preview clip cancel requested");
        true
    }

    // -- Event pump ---------------------------------------------------------

    /// Apply every pending engine and worker event. Returns how many were
    /// handled.
    pub(crate) fn pump(&mut self) -> usize {
        let mut handled = 0;

        let preview: Vec<PreviewEvent> = self.preview_events.try_iter().collect();
        for event in preview {
            self.on_preview_event(event);
            handled += 1;
        }

        let scan: Vec<EngineEvent> = self
            .scan
            .as_ref()
            .map(|run| run.events.try_iter().collect())
            .unwrap_or_default();
        for event in scan {
            self.on_scan_event(event);
            handled += 1;
        }

        let clip: Vec<EngineEvent> = self
            .clip
            .as_ref()
            .map(|run| run.events.try_iter().collect())
            .unwrap_or_default();
        for event in clip {
            self.on_clip_event(event);
            handled += 1;
        }

        handled
    }

    fn on_preview_event(&mut self, event: PreviewEvent) {
        match event {
            PreviewEvent::Published {
                generation,
                index,
                image,
            } => {
                if self.scheduler.is_live(generation, index) {
                    self.observer.on_image_published(index, image);
                }
            }
            PreviewEvent::SessionFailed {
                generation,
                message,
            } => {
                if generation != self.scheduler.generation() {
                    return;
                }
                self.has_preview = false;
                let next = if self.state == SessionState::Ready {
                    SessionState::NoSource
                } else {
                    self.state
                };
                self.fail(&format!("Preview generation failed: {message}"), next);
            }
        }
    }

    fn on_scan_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::ScanCompleted {
                geometry,
                preview_count,
            } => {
                let Some(run) = self.scan.take() else {
                    return;
                };
                let geometry = run.instance.geometry(&run.job).unwrap_or(geometry);
                if preview_count == 0 {
                    self.has_preview = false;
                    self.fail("Source produced no previews", SessionState::NoSource);
                    return;
                }

                let job = Arc::new(run.job);
                let source = Arc::clone(&run.instance).frame_source();
                self.scheduler
                    .on_source_reset(preview_count, source, Arc::clone(&job));

                self.active_job = Some(job);
                self.geometry = Some(geometry);
                self.title = geometry.title();
                self.has_preview = true;
                info!("{}", self.title);
                self.set_state(SessionState::Ready);
            }
            EngineEvent::ScanFailed { message } => {
                self.scan = None;
                self.has_preview = false;
                self.fail(&format!("Scan failed: {message}"), SessionState::NoSource);
            }
            other => debug!("Ignoring {other:?} from preview scan"),
        }
    }

    fn on_clip_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::ScanCompleted { .. } => self.start_clip_encode(),
            EngineEvent::ScanFailed { message } => {
                self.clip = None;
                self.fail(
                    &format!("Preview clip generation failed: {message}"),
                    SessionState::Ready,
                );
            }
            EngineEvent::EncodeProgress { fraction } => {
                self.set_progress(fraction.clamp(0.0, 1.0));
            }
            EngineEvent::EncodeCompleted {
                error: failure,
                cancelled,
            } => {
                let Some(clip) = self.clip.take() else {
                    return;
                };
                self.set_state(SessionState::Ready);

                if clip.cancelled || cancelled {
                    info!("Cancelled preview clip generation");
                } else if let Some(message) = failure {
                    error!("Preview clip generation failed: {message}");
                    self.observer.on_error(
                        "Preview clip generation failed. See the log for details.",
                    );
                } else if let Some(path) = clip.job.output_path.as_deref() {
                    info!("Finished preview clip generation");
                    if let Err(e) = self.launcher.launch_file(path) {
                        warn!("Could not open {}: {e}", path.display());
                        self.observer
                            .on_error(&format!("Could not open preview clip: {e}"));
                    }
                }
            }
        }
    }

    fn start_clip_encode(&mut self) {
        let selected = self.scheduler.selected();
        let seconds = self.config.preview_seconds;
        let clip_dir = self.config.clip_dir.clone();

        let Some(clip) = self.clip.as_mut() else {
            return;
        };
        if clip.cancelled {
            self.clip = None;
            info!("Cancelled preview clip generation");
            self.set_state(SessionState::Ready);
            return;
        }

        if let Err(e) = std::fs::create_dir_all(&clip_dir) {
            self.clip = None;
            self.fail(
                &format!("Could not create {}: {e}", clip_dir.display()),
                SessionState::Ready,
            );
            return;
        }

        let output = clip.job.preview_clip_path(&clip_dir);
        clip.job.output_path = Some(output.clone());

        info!("Encoding clip");
        info!("  Path: {}", output.display());
        info!("  Title: {}", clip.job.title);
        info!("  Preview #: {selected}");

        let (tx, rx) = mpsc::channel();
        clip.events = rx;
        clip.phase = ClipPhase::Encoding;
        if let Err(e) = clip.instance.start_encode(&clip.job, selected, seconds, tx) {
            self.clip = None;
            self.fail(
                &format!("Preview clip generation failed: {e}"),
                SessionState::Ready,
            );
        }
    }

    // -- Helpers ------------------------------------------------------------

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Session state changed");
            self.state = state;
            self.observer.on_state_changed(state);
        }
    }

    fn set_progress(&mut self, fraction: f64) {
        self.progress = fraction;
        self.observer.on_progress(fraction);
    }

    /// Report a session-level failure once and move to `next`.
    fn fail(&mut self, message: &str, next: SessionState) {
        error!("{message}");
        self.observer.on_error(message);
        self.set_state(next);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::mpsc::Sender;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use vidpeek_core::{
        CoreError, EncodeService, FrameError, FrameSource, PreviewImage, ScanService,
    };

    use super::*;

    // -- Fakes --------------------------------------------------------------

    /// Engine instance that records requests and lets the test emit events.
    #[derive(Default)]
    struct FakeInstance {
        scan_tx: Mutex<Option<Sender<EngineEvent>>>,
        encode_tx: Mutex<Option<Sender<EngineEvent>>>,
        encodes: Mutex<Vec<(PathBuf, usize, u32)>>,
        stops: Mutex<usize>,
        geometry: Option<SourceGeometry>,
        /// Every preview render reports the session lost.
        lost: bool,
    }

    impl FrameSource for FakeInstance {
        fn preview_image(&self, _: &EncodeJob, index: usize) -> Result<PreviewImage, FrameError> {
            if self.lost {
                return Err(FrameError::SessionLost("engine went away".into()));
            }
            Ok(PreviewImage::filled(2, 2, [index as u8, 0, 0, 255]))
        }
    }

    impl ScanService for FakeInstance {
        fn start_scan(
            &self,
            _request: ScanRequest,
            events: Sender<EngineEvent>,
        ) -> vidpeek_core::Result<()> {
            *self.scan_tx.lock().unwrap() = Some(events);
            Ok(())
        }

        fn geometry(&self, _: &EncodeJob) -> Option<SourceGeometry> {
            self.geometry
        }
    }

    impl EncodeService for FakeInstance {
        fn start_encode(
            &self,
            job: &EncodeJob,
            preview_index: usize,
            seconds: u32,
            events: Sender<EngineEvent>,
        ) -> vidpeek_core::Result<()> {
            let output = job
                .output_path
                .clone()
                .ok_or_else(|| CoreError::Engine("no output path".into()))?;
            self.encodes
                .lock()
                .unwrap()
                .push((output, preview_index, seconds));
            *self.encode_tx.lock().unwrap() = Some(events);
            Ok(())
        }

        fn stop_encode(&self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    impl FakeInstance {
        fn emit_scan(&self, event: EngineEvent) {
            let tx = self.scan_tx.lock().unwrap();
            tx.as_ref().expect("scan started").send(event).unwrap();
        }

        fn emit_encode(&self, event: EngineEvent) {
            let tx = self.encode_tx.lock().unwrap();
            tx.as_ref().expect("encode started").send(event).unwrap();
        }

        fn scan_started(&self) -> bool {
            self.scan_tx.lock().unwrap().is_some()
        }
    }

    /// Hands out pre-built instances in order.
    struct FakeFactory {
        instances: Mutex<Vec<Arc<FakeInstance>>>,
    }

    impl FakeFactory {
        fn new(instances: Vec<Arc<FakeInstance>>) -> Arc<Self> {
            Arc::new(Self {
                instances: Mutex::new(instances.into_iter().rev().collect()),
            })
        }
    }

    impl EngineFactory for FakeFactory {
        fn create_instance(&self) -> vidpeek_core::Result<Arc<dyn EngineInstance>> {
            let instance: Arc<dyn EngineInstance> = self
                .instances
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| CoreError::Engine("no more instances".into()))?;
            Ok(instance)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingLauncher {
        launched: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl FileLauncher for RecordingLauncher {
        fn launch_file(&self, path: &Path) -> vidpeek_core::Result<()> {
            self.launched.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        images: Vec<usize>,
        progress: Vec<f64>,
        states: Vec<SessionState>,
        errors: Vec<String>,
    }

    impl PreviewObserver for Recorder {
        fn on_image_published(&mut self, index: usize, _image: Arc<PreviewImage>) {
            self.images.push(index);
        }
        fn on_progress(&mut self, fraction: f64) {
            self.progress.push(fraction);
        }
        fn on_state_changed(&mut self, state: SessionState) {
            self.states.push(state);
        }
        fn on_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    // -- Harness ------------------------------------------------------------

    struct Harness {
        controller: PreviewSessionController<Recorder>,
        preview: Arc<FakeInstance>,
        clip: Arc<FakeInstance>,
        launched: Arc<Mutex<Vec<PathBuf>>>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        harness_with(FakeInstance::default())
    }

    fn harness_with(preview: FakeInstance) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let preview = Arc::new(preview);
        let clip = Arc::new(FakeInstance::default());
        let factory = FakeFactory::new(vec![preview.clone(), clip.clone()]);
        let launcher = RecordingLauncher::default();
        let launched = Arc::clone(&launcher.launched);
        let config = SessionConfig {
            preview_count: 10,
            preview_seconds: 15,
            retention_radius: 3,
            clip_dir: dir.path().join("clips"),
        };
        let mut controller =
            PreviewSessionController::new(factory, Box::new(launcher), Recorder::default(), config);
        controller.set_source(Some(EncodeJob::new("/videos/holiday.mkv")));
        Harness {
            controller,
            preview,
            clip,
            launched,
            _dir: dir,
        }
    }

    fn scan_completed(preview_count: usize) -> EngineEvent {
        EngineEvent::ScanCompleted {
            geometry: SourceGeometry::new(720, 480, 32, 27).unwrap(),
            preview_count,
        }
    }

    fn ready_harness() -> Harness {
        let mut h = harness();
        assert!(h.controller.refresh());
        h.preview.emit_scan(scan_completed(10));
        h.controller.pump();
        assert_eq!(h.controller.state(), SessionState::Ready);
        h
    }

    fn pump_until<F>(controller: &mut PreviewSessionController<Recorder>, mut done: F)
    where
        F: FnMut(&PreviewSessionController<Recorder>) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            controller.pump();
            if done(&*controller) {
                return;
            }
            assert!(Instant::now() < deadline, "condition not reached");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn refresh_without_source_stays_idle() {
        let mut h = harness();
        h.controller.set_source(None);

        assert!(!h.controller.refresh());
        assert_eq!(h.controller.state(), SessionState::NoSource);
        assert_eq!(h.controller.title(), NO_SOURCE_TITLE);
        assert!(!h.preview.scan_started());
    }

    #[test]
    fn scan_completion_makes_session_ready() {
        let mut h = ready_harness();

        assert!(h.controller.has_preview());
        assert_eq!(
            h.controller.title(),
            "Preview: Display 853x480 - Storage 720x480"
        );
        assert_eq!(h.controller.slider_max(), 9);
        assert!(h.controller.slider_enabled());
        assert_eq!(
            h.controller.observer().states,
            vec![SessionState::Scanning, SessionState::Ready]
        );

        // The worker publishes the focused frame.
        pump_until(&mut h.controller, |c| c.observer().images.contains(&0));
    }

    #[test]
    fn refresh_while_scanning_is_rejected() {
        let mut h = harness();
        assert!(h.controller.refresh());
        assert!(!h.controller.refresh());
        assert_eq!(h.controller.state(), SessionState::Scanning);

        // The pending scan still completes normally.
        h.preview.emit_scan(scan_completed(10));
        h.controller.pump();
        assert_eq!(h.controller.state(), SessionState::Ready);
    }

    #[test]
    fn scan_failure_reports_once() {
        let mut h = harness();
        h.controller.refresh();
        h.preview.emit_scan(EngineEvent::ScanFailed {
            message: "unsupported".into(),
        });
        h.controller.pump();
        h.controller.pump();

        assert_eq!(h.controller.state(), SessionState::NoSource);
        assert_eq!(h.controller.observer().errors.len(), 1);
        assert!(h.controller.observer().errors[0].contains("unsupported"));
    }

    #[test]
    fn selecting_cached_preview_publishes_immediately() {
        let mut h = ready_harness();
        pump_until(&mut h.controller, |c| {
            c.scheduler().cached_indices() == vec![0, 1, 2, 3]
        });

        let before = h.controller.observer().images.len();
        assert!(h.controller.select_preview(2));
        assert_eq!(h.controller.observer().images.len(), before + 1);
        assert_eq!(h.controller.observer().images.last(), Some(&2));
    }

    #[test]
    fn clip_success_launches_output() {
        let mut h = ready_harness();
        h.controller.select_preview(4);

        assert!(h.controller.generate_clip());
        assert_eq!(h.controller.state(), SessionState::GeneratingClip);
        assert!(!h.controller.slider_enabled());
        assert!(!h.controller.refresh());

        h.clip.emit_scan(scan_completed(10));
        h.controller.pump();
        let encodes = h.clip.encodes.lock().unwrap().clone();
        assert_eq!(encodes.len(), 1);
        let (output, index, seconds) = &encodes[0];
        assert!(output.ends_with("clips/preview.mp4"));
        assert_eq!((*index, *seconds), (4, 15));

        h.clip
            .emit_encode(EngineEvent::EncodeProgress { fraction: 0.5 });
        h.clip.emit_encode(EngineEvent::EncodeCompleted {
            error: None,
            cancelled: false,
        });
        h.controller.pump();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert_eq!(h.controller.observer().progress, vec![0.0, 0.5]);
        assert_eq!(*h.launched.lock().unwrap(), vec![output.clone()]);
        assert!(h.controller.observer().errors.is_empty());
    }

    #[test]
    fn cancelled_clip_returns_to_ready_silently() {
        let mut h = ready_harness();
        h.controller.generate_clip();
        h.clip.emit_scan(scan_completed(10));
        h.controller.pump();

        assert!(h.controller.cancel_clip());
        assert_eq!(*h.clip.stops.lock().unwrap(), 1);
        // Still generating until the engine confirms.
        assert_eq!(h.controller.state(), SessionState::GeneratingClip);

        h.clip.emit_encode(EngineEvent::EncodeCompleted {
            error: None,
            cancelled: true,
        });
        h.controller.pump();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert!(h.launched.lock().unwrap().is_empty());
        assert!(h.controller.observer().errors.is_empty());
    }

    #[test]
    fn cancel_during_clip_scan_skips_encode() {
        let mut h = ready_harness();
        h.controller.generate_clip();
        assert!(h.controller.cancel_clip());
        assert!(!h.controller.cancel_clip());

        h.clip.emit_scan(scan_completed(10));
        h.controller.pump();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert!(h.clip.encodes.lock().unwrap().is_empty());
        assert_eq!(*h.clip.stops.lock().unwrap(), 0);
        assert!(h.controller.observer().errors.is_empty());
    }

    #[test]
    fn failed_clip_reports_error_without_launch() {
        let mut h = ready_harness();
        h.controller.generate_clip();
        h.clip.emit_scan(scan_completed(10));
        h.controller.pump();
        h.clip.emit_encode(EngineEvent::EncodeCompleted {
            error: Some("encoder exploded".into()),
            cancelled: false,
        });
        h.controller.pump();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert_eq!(h.controller.observer().errors.len(), 1);
        assert!(h.launched.lock().unwrap().is_empty());
    }

    #[test]
    fn cancel_without_clip_is_rejected() {
        let mut h = ready_harness();
        assert!(!h.controller.cancel_clip());
        assert_eq!(h.controller.state(), SessionState::Ready);
    }

    #[test]
    fn geometry_from_instance_wins_over_event() {
        let dir = tempfile::tempdir().unwrap();
        let preview = Arc::new(FakeInstance {
            geometry: Some(SourceGeometry::square(1280, 720).unwrap()),
            ..FakeInstance::default()
        });
        let factory = FakeFactory::new(vec![preview.clone()]);
        let config = SessionConfig {
            preview_count: 10,
            preview_seconds: 10,
            retention_radius: 3,
            clip_dir: dir.path().to_path_buf(),
        };
        let mut controller = PreviewSessionController::new(
            factory,
            Box::new(RecordingLauncher::default()),
            Recorder::default(),
            config,
        );
        controller.set_source(Some(EncodeJob::new("a.mp4")));
        controller.refresh();
        preview.emit_scan(scan_completed(10));
        controller.pump();

        assert_eq!(controller.title(), "Preview: 1280x720");
    }

    #[test]
    fn scan_without_previews_is_an_error() {
        let mut h = harness();
        h.controller.refresh();
        h.preview.emit_scan(scan_completed(0));
        h.controller.pump();

        assert_eq!(h.controller.state(), SessionState::NoSource);
        assert!(!h.controller.has_preview());
        assert!(!h.controller.can_generate_clip());
        assert_eq!(h.controller.observer().errors.len(), 1);
    }

    #[test]
    fn ready_session_exposes_job_and_geometry() {
        let mut h = ready_harness();
        h.controller.set_preview_seconds(42);
        assert_eq!(h.controller.preview_seconds(), 42);
        assert!(h.controller.can_refresh());
        assert_eq!(h.controller.active_job().map(|j| j.title), Some(1));
        assert_eq!(h.controller.geometry().map(|g| g.display_size()), Some((853, 480)));
    }
    #[test]
    fn lost_preview_session_reports_once_and_clears_preview() {
        let mut h = harness_with(FakeInstance {
            lost: true,
            ..FakeInstance::default()
        });
        h.controller.refresh();
        h.preview.emit_scan(scan_completed(10));
        pump_until(&mut h.controller, |c| c.state() == SessionState::NoSource);

        assert!(!h.controller.has_preview());
        assert!(!h.controller.slider_enabled());
        assert!(!h.controller.select_preview(3));
        assert_eq!(
            h.controller.observer().states,
            vec![
                SessionState::Scanning,
                SessionState::Ready,
                SessionState::NoSource
            ]
        );

        h.controller.pump();
        let errors = &h.controller.observer().errors;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("engine went away"));
    }

    #[test]
    fn failure_from_superseded_generation_is_ignored() {
        let mut h = harness_with(FakeInstance {
            lost: true,
            ..FakeInstance::default()
        });
        h.controller.refresh();
        h.preview.emit_scan(scan_completed(10));
        h.controller.pump();
        assert_eq!(h.controller.state(), SessionState::Ready);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !h.controller.scheduler().is_failed() {
            assert!(Instant::now() < deadline, "session never failed");
            std::thread::sleep(Duration::from_millis(2));
        }

        // A newer source replaces the failed one before the event is pumped.
        let healthy: Arc<dyn FrameSource> = Arc::new(FakeInstance::default());
        h.controller.scheduler().on_source_reset(
            10,
            healthy,
            Arc::new(EncodeJob::new("/videos/holiday.mkv")),
        );
        h.controller.pump();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert!(h.controller.has_preview());
        assert!(h.controller.observer().errors.is_empty());
    }

    #[test]
    fn clip_scan_failure_returns_to_ready_with_one_error() {
        let mut h = ready_harness();
        assert!(h.controller.generate_clip());

        h.clip.emit_scan(EngineEvent::ScanFailed {
            message: "title vanished".into(),
        });
        h.controller.pump();
        h.controller.pump();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert!(h.clip.encodes.lock().unwrap().is_empty());
        assert!(h.launched.lock().unwrap().is_empty());
        let errors = &h.controller.observer().errors;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("title vanished"));
        assert!(h.controller.can_generate_clip());
    }
}
