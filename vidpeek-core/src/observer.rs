use std::sync::Arc;

use crate::image::PreviewImage;

/// Lifecycle state of a preview session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NoSource,
    Scanning,
    Ready,
    GeneratingClip,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::NoSource => "No source",
            Self::Scanning => "Scanning\u{2026}",
            Self::Ready => "Ready",
            Self::GeneratingClip => "Generating clip\u{2026}",
        }
    }

    /// Whether a new scan or clip encode may start from this state.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Scanning | Self::GeneratingClip)
    }
}

/// UI-facing sink for session output.
///
/// Every method is invoked on the thread that pumps the session, never on
/// a worker thread.
pub trait PreviewObserver {
    fn on_image_published(&mut self, index: usize, image: Arc<PreviewImage>);
    fn on_progress(&mut self, fraction: f64);
    fn on_state_changed(&mut self, state: SessionState);
    fn on_error(&mut self, message: &str);
}
