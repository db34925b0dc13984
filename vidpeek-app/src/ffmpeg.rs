//! Engine adapter that shells out to the `ffprobe` / `ffmpeg` binaries.
//!
//! Scans run `ffprobe` on a background thread. Preview stills decode a
//! single frame as raw RGBA on the calling (worker) thread. Clip encodes
//! stream `-progress` output from a child process that `stop_encode` kills.

use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::{debug, warn};

use vidpeek_core::{
    CoreError, EncodeJob, EncodeService, EngineEvent, EngineFactory, EngineInstance, FrameError,
    FrameSource, PreviewImage, ScanRequest, ScanService, SourceGeometry,
};

// ---------------------------------------------------------------------------
// Probe results
// ---------------------------------------------------------------------------

/// What `ffprobe` reported about the first video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ProbeInfo {
    pub(crate) geometry: SourceGeometry,
    pub(crate) duration: Option<f64>,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub(crate) fn parse_probe_json(json: &str) -> Result<ProbeInfo, String> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| format!("Failed to parse ffprobe JSON: {e}"))?;

    let stream = value["streams"]
        .as_array()
        .and_then(|s| s.first())
        .ok_or("No video stream found")?;

    let width = stream["width"].as_u64().ok_or("Failed to get video width")? as u32;
    let height = stream["height"]
        .as_u64()
        .ok_or("Failed to get video height")? as u32;
    let (par_width, par_height) = stream["sample_aspect_ratio"]
        .as_str()
        .and_then(parse_ratio)
        .unwrap_or((1, 1));

    let duration = value["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| *d > 0.0);

    let geometry =
        SourceGeometry::new(width, height, par_width, par_height).map_err(|e| e.to_string())?;
    Ok(ProbeInfo { geometry, duration })
}

/// Parse a ratio like `"32:27"`. Returns `None` for unknown (`"0:1"`) values.
fn parse_ratio(s: &str) -> Option<(u32, u32)> {
    let (num, den) = s.split_once(':')?;
    let num: u32 = num.trim().parse().ok()?;
    let den: u32 = den.trim().parse().ok()?;
    if num == 0 || den == 0 {
        return None;
    }
    Some((num, den))
}

/// Timestamp of preview `index` when `count` previews are spread evenly
/// over `duration`, excluding the very start and end.
pub(crate) fn preview_timestamp(duration: Option<f64>, index: usize, count: usize) -> f64 {
    match duration {
        Some(d) if count > 0 => d * (index + 1) as f64 / (count + 1) as f64,
        _ => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Parser for ffmpeg `-progress` output (key=value lines).
#[derive(Debug, Default, Clone)]
pub(crate) struct ProgressParser {
    pub(crate) out_time_us: u64,
    pub(crate) is_complete: bool,
}

impl ProgressParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parse one line. Returns `true` if it updated the output time.
    pub(crate) fn parse_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.split_once('=') else {
            return false;
        };
        match key.trim() {
            "out_time_us" => match value.trim().parse::<u64>() {
                Ok(us) => {
                    self.out_time_us = us;
                    true
                }
                Err(_) => false,
            },
            "progress" => {
                if value.trim() == "end" {
                    self.is_complete = true;
                }
                false
            }
            _ => false,
        }
    }

    pub(crate) fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Fraction of `duration_s` encoded so far, capped at 1.
    pub(crate) fn fraction(&self, duration_s: f64) -> f64 {
        if self.is_complete {
            return 1.0;
        }
        if duration_s > 0.0 {
            (self.out_time_s() / duration_s).min(1.0)
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Creates [`FfmpegEngine`] instances bound to the configured binaries.
pub(crate) struct FfmpegFactory {
    pub(crate) ffmpeg: PathBuf,
    pub(crate) ffprobe: PathBuf,
}

impl EngineFactory for FfmpegFactory {
    fn create_instance(&self) -> vidpeek_core::Result<Arc<dyn EngineInstance>> {
        let engine: Arc<dyn EngineInstance> =
            Arc::new(FfmpegEngine::new(&self.ffmpeg, &self.ffprobe));
        Ok(engine)
    }
}

struct Inner {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    probe: Mutex<Option<ProbeInfo>>,
    preview_count: Mutex<usize>,
    child: Mutex<Option<Child>>,
    stop_requested: AtomicBool,
}

/// One scan/encode context for a single source.
pub(crate) struct FfmpegEngine {
    inner: Arc<Inner>,
}

impl FfmpegEngine {
    pub(crate) fn new(ffmpeg: &Path, ffprobe: &Path) -> Self {
        Self {
            inner: Arc::new(Inner {
                ffmpeg: ffmpeg.to_path_buf(),
                ffprobe: ffprobe.to_path_buf(),
                probe: Mutex::new(None),
                preview_count: Mutex::new(0),
                child: Mutex::new(None),
                stop_requested: AtomicBool::new(false),
            }),
        }
    }

    fn probe_info(&self) -> Option<ProbeInfo> {
        *self
            .inner
            .probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn preview_count(&self) -> usize {
        *self
            .inner
            .preview_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_probe(ffprobe: &Path, source: &Path) -> Result<ProbeInfo, String> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "v:0",
        ])
        .arg(source)
        .output()
        .map_err(|e| format!("Failed to run ffprobe: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    parse_probe_json(&String::from_utf8_lossy(&output.stdout))
}

impl FrameSource for FfmpegEngine {
    fn preview_image(&self, job: &EncodeJob, index: usize) -> Result<PreviewImage, FrameError> {
        let info = self
            .probe_info()
            .ok_or_else(|| FrameError::SessionLost("source has not been scanned".into()))?;
        let seek = preview_timestamp(info.duration, index, self.preview_count());

        let output = Command::new(&self.inner.ffmpeg)
            .args(["-v", "error", "-noautorotate", "-ss"])
            .arg(format!("{seek:.3}"))
            .arg("-i")
            .arg(&job.source_path)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => FrameError::SessionLost(format!("ffmpeg not found: {e}")),
                _ => FrameError::Frame(format!("failed to run ffmpeg: {e}")),
            })?;

        if !output.status.success() {
            return Err(FrameError::Frame(format!(
                "ffmpeg failed at {seek:.3}s: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let geometry = info.geometry;
        PreviewImage::from_rgba(geometry.width, geometry.height, output.stdout)
            .map_err(|e| FrameError::Frame(e.to_string()))
    }
}

impl ScanService for FfmpegEngine {
    fn start_scan(&self, request: ScanRequest, events: Sender<EngineEvent>) -> vidpeek_core::Result<()> {
        *self
            .inner
            .preview_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = request.preview_count;

        let inner = Arc::clone(&self.inner);
        thread::Builder::new()
            .name("ffprobe-scan".into())
            .spawn(move || {
                debug!("Probing {}", request.path.display());
                let event = match run_probe(&inner.ffprobe, &request.path) {
                    Ok(info) => {
                        *inner.probe.lock().unwrap_or_else(PoisonError::into_inner) = Some(info);
                        // Without a duration every preview would land on frame 0.
                        let preview_count = if info.duration.is_some() {
                            request.preview_count
                        } else {
                            1
                        };
                        EngineEvent::ScanCompleted {
                            geometry: info.geometry,
                            preview_count,
                        }
                    }
                    Err(message) => EngineEvent::ScanFailed { message },
                };
                let _ = events.send(event);
            })?;
        Ok(())
    }

    fn geometry(&self, _job: &EncodeJob) -> Option<SourceGeometry> {
        self.probe_info().map(|info| info.geometry)
    }
}

impl EncodeService for FfmpegEngine {
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
            .ok_or_else(|| CoreError::Engine("encode job has no output path".into()))?;
        let info = self
            .probe_info()
            .ok_or_else(|| CoreError::Engine("source has not been scanned".into()))?;
        let seek = preview_timestamp(info.duration, preview_index, self.preview_count());

        let mut child = Command::new(&self.inner.ffmpeg)
            .args(["-y", "-v", "error", "-ss"])
            .arg(format!("{seek:.3}"))
            .arg("-i")
            .arg(&job.source_path)
            .arg("-t")
            .arg(seconds.to_string())
            .args(["-map", "0:v:0", "-map", "0:a?"])
            .args(["-c:v", "libx264", "-preset", "veryfast", "-c:a", "aac"])
            .args(["-progress", "-", "-nostats"])
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::Engine("ffmpeg stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CoreError::Engine("ffmpeg stderr unavailable".into()))?;

        self.inner.stop_requested.store(false, Ordering::SeqCst);
        *self.inner.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);

        let inner = Arc::clone(&self.inner);
        let duration = seconds as f64;
        thread::Builder::new()
            .name("ffmpeg-encode".into())
            .spawn(move || {
                // stderr must be drained concurrently or ffmpeg blocks once the pipe fills.
                let stderr_thread = thread::spawn(move || {
                    let mut output = String::new();
                    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                        output.push_str(&line);
                        output.push('\n');
                    }
                    output
                });

                let mut parser = ProgressParser::new();
                for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                    if parser.parse_line(&line) {
                        let _ = events.send(EngineEvent::EncodeProgress {
                            fraction: parser.fraction(duration),
                        });
                    }
                }

                let diagnostics = stderr_thread.join().unwrap_or_default();

                let status = inner
                    .child
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .map(|mut child| child.wait());
                let cancelled = inner.stop_requested.load(Ordering::SeqCst);

                let error = match status {
                    _ if cancelled => None,
                    Some(Ok(status)) if status.success() => None,
                    Some(Ok(status)) => Some(format!("ffmpeg exited with {status}: {}", diagnostics.trim())),
                    Some(Err(e)) => Some(format!("failed to wait for ffmpeg: {e}")),
                    None => Some("ffmpeg process lost".to_string()),
                };
                let _ = events.send(EngineEvent::EncodeCompleted { error, cancelled });
            })?;
        Ok(())
    }

    fn stop_encode(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        let mut child = self.inner.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(child) = child.as_mut() {
            if let Err(e) = child.kill() {
                warn!("Failed to stop ffmpeg: {e}");
            }
        }
    }
}
