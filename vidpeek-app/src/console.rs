//! Terminal observer for headless runs.

use std::sync::Arc;

use tracing::{debug, info};
use vidpeek_core::{PreviewImage, PreviewObserver, SessionState};

#[derive(Default)]
pub(crate) struct ConsoleObserver {
    pub(crate) last_image: Option<(usize, Arc<PreviewImage>)>,
    pub(crate) errors: Vec<String>,
    last_percent: Option<u32>,
}

impl ConsoleObserver {
    pub(crate) fn image_for(&self, index: usize) -> Option<&Arc<PreviewImage>> {
        match &self.last_image {
            Some((i, image)) if *i == index => Some(image),
            _ => None,
        }
    }
}

impl PreviewObserver for ConsoleObserver {
    fn on_image_published(&mut self, index: usize, image: Arc<PreviewImage>) {
        info!("Preview #{} ready ({}x{})", index + 1, image.width, image.height);
        self.last_image = Some((index, image));
    }

    fn on_progress(&mut self, fraction: f64) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u32;
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            info!("Encoding preview clip: {percent}%");
        }
    }

    fn on_state_changed(&mut self, state: SessionState) {
        debug!("Session state: {}", state.label());
        if state != SessionState::GeneratingClip {
            self.last_percent = None;
        }
    }

    fn on_error(&mut self, message: &str) {
        debug!("Reported: {message}");
        self.errors.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_latest_image() {
        let mut observer = ConsoleObserver::default();
        observer.on_image_published(2, Arc::new(PreviewImage::new(4, 4)));
        observer.on_image_published(3, Arc::new(PreviewImage::new(8, 8)));
        assert!(observer.image_for(2).is_none());
        assert_eq!(observer.image_for(3).map(|i| i.width), Some(8));
    }

    #[test]
    fn repeated_progress_is_coalesced() {
        let mut observer = ConsoleObserver::default();
        observer.on_progress(0.504);
        assert_eq!(observer.last_percent, Some(50));
        observer.on_progress(1.7);
        assert_eq!(observer.last_percent, Some(100));
        observer.on_state_changed(SessionState::Ready);
        assert_eq!(observer.last_percent, None);
    }
}
