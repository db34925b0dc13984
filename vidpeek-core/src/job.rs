use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Output container produced by an encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    #[default]
    Mp4,
    Mkv,
}

/// File extension preferred for MP4 output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputExtension {
    #[default]
    Mp4,
    M4v,
}

/// The encode settings a preview session renders against.
///
/// The engine treats this as opaque; the preview pipeline only reads the
/// source path, title and container to pick the clip file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeJob {
    pub source_path: PathBuf,
    /// 1-based title number within the source.
    #[serde(default = "default_title")]
    pub title: u32,
    #[serde(default)]
    pub container: ContainerFormat,
    #[serde(default)]
    pub preferred_extension: OutputExtension,
    /// Where the encode writes its output. Set by the clip flow.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

fn default_title() -> u32 {
    1
}

impl EncodeJob {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            title: default_title(),
            container: ContainerFormat::default(),
            preferred_extension: OutputExtension::default(),
            output_path: None,
        }
    }

    /// Extension (with leading dot) for a preview clip of this job.
    pub fn preview_extension(&self) -> &'static str {
        match (self.container, self.preferred_extension) {
            (ContainerFormat::Mkv, _) => ".mkv",
            (ContainerFormat::Mp4, OutputExtension::M4v) => ".m4v",
            (ContainerFormat::Mp4, OutputExtension::Mp4) => ".mp4",
        }
    }

    /// Full path of the preview clip inside `dir`.
    pub fn preview_clip_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("preview{}", self.preview_extension()))
    }
}
