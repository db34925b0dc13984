mod app_dir;
mod console;
mod ffmpeg;
mod launcher;
mod preferences;
mod session;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, info, warn};

use vidpeek_core::{ContainerFormat, EncodeJob, OutputExtension, SessionState};
use vidpeek_render::{export_png, FrameMetadata};

use console::ConsoleObserver;
use ffmpeg::FfmpegFactory;
use launcher::SystemLauncher;
use preferences::AppPreferences;
use session::{PreviewSessionController, SessionConfig};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How often the headless loop drains session events.
const POLL_INTERVAL: Duration = Duration::from_millis(15);
const SCAN_TIMEOUT: Duration = Duration::from_secs(120);
const FRAME_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "vidpeek", version, about = "Preview stills and clips from a video source")]
struct Cli {
    /// Video file to preview
    source: PathBuf,

    /// 1-based preview to select
    #[arg(short, long, default_value_t = 1)]
    index: usize,

    /// Number of previews to generate (overrides preferences for this run)
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Title number within the source
    #[arg(short, long, default_value_t = 1)]
    title: u32,

    /// Encode a preview clip starting at the selected preview
    #[arg(long)]
    clip: bool,

    /// Preview clip length in seconds (saved to preferences)
    #[arg(short, long)]
    seconds: Option<u32>,

    /// Give up on the clip encode after this many seconds
    #[arg(long)]
    clip_timeout: Option<u64>,

    /// Write the cached preview frames as PNG files into this directory
    #[arg(long, value_name = "DIR")]
    export: Option<PathBuf>,

    /// Produce Matroska clips instead of MP4
    #[arg(long)]
    mkv: bool,

    /// Use the .m4v extension for MP4 clips
    #[arg(long, conflicts_with = "mkv")]
    m4v: bool,
}

type Session = PreviewSessionController<ConsoleObserver>;

/// Pump `session` until `done` holds. Returns `false` on timeout.
fn pump_until(
    session: &mut Session,
    timeout: Option<Duration>,
    mut done: impl FnMut(&Session) -> bool,
) -> bool {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        session.pump();
        if done(&*session) {
            return true;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn last_error(session: &Session) -> String {
    session
        .observer()
        .errors
        .last()
        .cloned()
        .unwrap_or_else(|| "unknown error".to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let prefs_path = preferences::config_path();
    let loaded = AppPreferences::read_from(&prefs_path);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(loaded.log_filter())),
        )
        .init();

    info!("Starting VidPeek");
    let mut prefs = loaded.into_preferences(&prefs_path);
    debug!("Preferences: {:?}", prefs);

    if !cli.source.is_file() {
        bail!("{} is not a file", cli.source.display());
    }

    let mut job = EncodeJob::new(&cli.source);
    job.title = cli.title;
    if cli.mkv {
        job.container = ContainerFormat::Mkv;
    }
    if cli.m4v {
        job.preferred_extension = OutputExtension::M4v;
    }

    let config = SessionConfig {
        preview_count: cli.count.unwrap_or(prefs.preview_count).max(1),
        preview_seconds: prefs.preview_seconds,
        retention_radius: prefs.retention_radius,
        clip_dir: prefs.clip_directory(),
    };
    let factory = Arc::new(FfmpegFactory {
        ffmpeg: PathBuf::from(&prefs.ffmpeg_path),
        ffprobe: PathBuf::from(&prefs.ffprobe_path),
    });
    let mut session = PreviewSessionController::new(
        factory,
        Box::new(SystemLauncher),
        ConsoleObserver::default(),
        config,
    );

    if let Some(seconds) = cli.seconds {
        if prefs.set_preview_seconds(seconds, &prefs_path) {
            info!("Preview clip length set to {seconds}s");
        }
        session.set_preview_seconds(prefs.preview_seconds);
    }

    // -- Scan ---------------------------------------------------------------

    session.set_source(Some(job));
    if !session.refresh() {
        bail!("{}", last_error(&session));
    }
    if !pump_until(&mut session, Some(SCAN_TIMEOUT), |s| {
        s.state() != SessionState::Scanning
    }) {
        bail!("Timed out scanning {}", cli.source.display());
    }
    if session.state() != SessionState::Ready {
        bail!("{}", last_error(&session));
    }
    println!("{}", session.title());

    // -- Select -------------------------------------------------------------

    let index = cli.index.saturating_sub(1).min(session.slider_max());
    session.select_preview(index);
    let selected = session.selected();
    let published = pump_until(&mut session, Some(FRAME_TIMEOUT), |s| {
        s.observer().image_for(selected).is_some() || !s.has_preview()
    });
    if !published {
        warn!("Preview #{} was not ready in time", selected + 1);
    } else if let Some(image) = session.observer().image_for(selected) {
        println!(
            "Preview {} of {}: {}x{}",
            selected + 1,
            session.slider_max() + 1,
            image.width,
            image.height
        );
    } else {
        bail!("{}", last_error(&session));
    }

    // -- Export -------------------------------------------------------------

    if let Some(dir) = &cli.export {
        pump_until(&mut session, Some(FRAME_TIMEOUT), |s| {
            !s.scheduler().is_worker_active()
        });
        let written = export_cached(&session, dir)?;
        println!("Exported {written} preview(s) to {}", dir.display());
    }

    // -- Clip ---------------------------------------------------------------

    if cli.clip {
        let errors_before = session.observer().errors.len();
        if !session.generate_clip() {
            bail!("Cannot generate a preview clip: {}", last_error(&session));
        }
        println!(
            "Encoding {}s clip from preview {}",
            session.preview_seconds(),
            selected + 1
        );
        let timeout = cli.clip_timeout.map(Duration::from_secs);
        if !pump_until(&mut session, timeout, |s| s.state() != SessionState::GeneratingClip) {
            warn!("Preview clip timed out, cancelling");
            session.cancel_clip();
            pump_until(&mut session, None, |s| s.state() != SessionState::GeneratingClip);
        }
        if session.observer().errors.len() > errors_before {
            bail!("{}", last_error(&session));
        }
        debug!("Clip finished at {:.0}%", session.progress() * 100.0);
    }

    Ok(())
}

/// Write every cached frame of the current session as a display-sized PNG.
fn export_cached(session: &Session, dir: &std::path::Path) -> anyhow::Result<usize> {
    let (Some(geometry), Some(job)) = (session.geometry(), session.active_job()) else {
        bail!("No preview to export");
    };
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let scheduler = session.scheduler();
    let (display_width, display_height) = geometry.display_size();
    let source = job
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut written = 0;
    for index in scheduler.cached_indices() {
        let Some(image) = scheduler.cached(index) else {
            continue;
        };
        let frame = if geometry.has_square_pixels() {
            (*image).clone()
        } else {
            image.resampled(display_width, display_height)?
        };
        let meta = FrameMetadata {
            source: source.clone(),
            title: job.title,
            preview_index: index,
            preview_count: scheduler.preview_count(),
            display_width,
            display_height,
        };
        let path = dir.join(format!("preview-{:02}.png", index + 1));
        export_png(&frame, &path, &meta)
            .with_context(|| format!("exporting {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}
