use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

// ---------------------------------------------------------------------------
// Application preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppPreferences {
    /// Preview stills requested from every scan.
    #[serde(default = "default_preview_count")]
    pub preview_count: usize,
    /// Length in seconds of generated preview clips. Persisted whenever changed.
    #[serde(default = "default_preview_seconds")]
    pub preview_seconds: u32,
    /// Frames kept cached on each side of the selected preview.
    #[serde(default = "default_retention_radius")]
    pub retention_radius: usize,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    /// Custom clip output directory. When empty, the per-user data directory is used.
    #[serde(default)]
    pub clip_dir: String,
}

fn default_preview_count() -> usize {
    10
}
fn default_preview_seconds() -> u32 {
    10
}
fn default_retention_radius() -> usize {
    vidpeek_render::DEFAULT_RETENTION_RADIUS
}
fn default_log_filter() -> String {
    "info".to_string()
}
fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}
fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

impl Default for AppPreferences {
    fn default() -> Self {
        Self {
            preview_count: default_preview_count(),
            preview_seconds: default_preview_seconds(),
            retention_radius: default_retention_radius(),
            log_filter: default_log_filter(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            clip_dir: String::new(),
        }
    }
}

/// Result of reading the preferences file. Nothing is logged until
/// [`into_preferences`](Self::into_preferences), so the log filter can be
/// taken from the file before the subscriber exists.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(AppPreferences),
    Missing,
    Failed(String),
}

impl LoadOutcome {
    /// Filter to install the subscriber with.
    pub fn log_filter(&self) -> String {
        match self {
            Self::Loaded(prefs) => prefs.log_filter.clone(),
            Self::Missing | Self::Failed(_) => default_log_filter(),
        }
    }

    /// Log how loading went and fall back to defaults where needed.
    pub fn into_preferences(self, path: &Path) -> AppPreferences {
        match self {
            Self::Loaded(mut prefs) => {
                info!("Loaded preferences from {}", path.display());
                if prefs.preview_count == 0 {
                    prefs.preview_count = default_preview_count();
                }
                prefs
            }
            Self::Missing => {
                debug!("No preferences file at {}", path.display());
                AppPreferences::default()
            }
            Self::Failed(message) => {
                error!("{message}");
                AppPreferences::default()
            }
        }
    }
}

impl AppPreferences {
    /// Read preferences from `path` without logging.
    pub fn read_from(path: &Path) -> LoadOutcome {
        if !path.exists() {
            return LoadOutcome::Missing;
        }
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<AppPreferences>(&json) {
                Ok(prefs) => LoadOutcome::Loaded(prefs),
                Err(e) => LoadOutcome::Failed(format!("Failed to parse preferences: {e}")),
            },
            Err(e) => LoadOutcome::Failed(format!("Failed to read preferences file: {e}")),
        }
    }

    /// Persist preferences to `path`.
    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory: {e}");
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, &json) {
                    error!("Failed to write preferences: {e}");
                } else {
                    debug!("Saved preferences");
                }
            }
            Err(e) => error!("Failed to serialize preferences: {e}"),
        }
    }

    /// Update the clip length and persist it. Returns whether it changed.
    pub fn set_preview_seconds(&mut self, seconds: u32, path: &Path) -> bool {
        if seconds == 0 || seconds == self.preview_seconds {
            return false;
        }
        self.preview_seconds = seconds;
        self.save_to(path);
        true
    }

    /// Directory preview clips are written to.
    pub fn clip_directory(&self) -> PathBuf {
        if self.clip_dir.is_empty() {
            crate::app_dir::clips_directory()
        } else {
            PathBuf::from(&self.clip_dir)
        }
    }
}

pub fn config_path() -> PathBuf {
    crate::app_dir::exe_directory().join("preferences.json")
}
