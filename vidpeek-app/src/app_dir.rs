//! Directories used by the app. Preferences live next to the executable;
//! generated clips go to the per-user data directory.

use std::path::PathBuf;

use directories::ProjectDirs;

/// Directory containing the running executable. Falls back to current directory if unavailable.
pub fn exe_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Per-user data directory, or the executable directory when the platform has none.
pub fn data_directory() -> PathBuf {
    ProjectDirs::from("", "", "VidPeek")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(exe_directory)
}

/// Directory for generated preview clips.
pub fn clips_directory() -> PathBuf {
    data_directory().join("preview")
}
