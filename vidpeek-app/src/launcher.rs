use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;
use vidpeek_core::FileLauncher;

/// Opens files with the platform's default handler.
pub(crate) struct SystemLauncher;

impl FileLauncher for SystemLauncher {
    fn launch_file(&self, path: &Path) -> vidpeek_core::Result<()> {
        let mut command = open_command(path);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = command.spawn()?;
        debug!(pid = child.id(), "Launched {}", path.display());
        Ok(())
    }
}

#[cfg(target_os = "windows")]
fn open_command(path: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", ""]).arg(path);
    command
}

#[cfg(target_os = "macos")]
fn open_command(path: &Path) -> Command {
    let mut command = Command::new("open");
    command.arg(path);
    command
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn open_command(path: &Path) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(path);
    command
}
