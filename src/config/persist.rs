//! Locating, loading and saving `monitors.xml`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context};
use tracing::{debug, info, warn};

use super::{xml, Configuration};

pub const DEFAULT_FILENAME: &str = "monitors.xml";
pub const FILENAME_ENV: &str = "GF_MONITOR_FILENAME";
const DEFAULT_SYSTEM_CONFIG_DIR: &str = "/etc/xdg";

pub fn config_filename() -> String {
    env::var(FILENAME_ENV)
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// `$XDG_CONFIG_HOME/<filename>`, the file configurations are saved to.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(config_filename()))
}

/// Read-only fallbacks, one per entry of `$XDG_CONFIG_DIRS`.
pub fn system_config_paths() -> Vec<PathBuf> {
    let dirs = env::var("XDG_CONFIG_DIRS")
        .ok()
        .filter(|dirs| !dirs.is_empty())
        .unwrap_or_else(|| DEFAULT_SYSTEM_CONFIG_DIR.to_string());
    let filename = config_filename();
    dirs.split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(&filename))
        .collect()
}

pub fn load_file(path: &Path) -> anyhow::Result<Vec<Configuration>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let configs = xml::parse(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(configs)
}

/// Load the first candidate that exists and parses. Broken files are logged
/// and skipped.
pub fn load_first<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> Vec<Configuration> {
    for path in candidates {
        if !path.exists() {
            debug!("{} does not exist", path.display());
            continue;
        }
        match load_file(path) {
            Ok(configs) => {
                info!("Loaded {} configurations from {}", configs.len(), path.display());
                return configs;
            }
            Err(err) => warn!("Ignoring monitor configuration: {:?}", err),
        }
    }
    Vec::new()
}

fn write_atomically(path: &Path, contents: &str, cancelled: &AtomicBool) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let file_name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?;
    let tmp = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));

    fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
    if cancelled.load(Ordering::Acquire) {
        let _ = fs::remove_file(&tmp);
        bail!("save to {} cancelled", path.display());
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

struct PendingSave {
    path: PathBuf,
    cancelled: Arc<AtomicBool>,
    thread: JoinHandle<anyhow::Result<()>>,
}

/// Background writer with at most one save in flight.
#[derive(Default)]
pub struct Saver {
    pending: Option<PendingSave>,
}

impl Saver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and join the save in flight, then start writing `contents`.
    ///
    /// The join happens on the calling thread. Cancellation is only checked
    /// after the superseded write finishes, so a slow disk stalls the caller
    /// (hotplug and lid handling in the manager) until that write returns.
    pub fn save(&mut self, path: PathBuf, contents: String) {
        if let Some(pending) = self.pending.take() {
            pending.cancelled.store(true, Ordering::Release);
            if let Ok(Err(err)) = pending.thread.join() {
                debug!("Previous save superseded: {:?}", err);
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let thread = {
            let cancelled = cancelled.clone();
            let path = path.clone();
            thread::spawn(move || write_atomically(&path, &contents, &cancelled))
        };
        self.pending = Some(PendingSave {
            path,
            cancelled,
            thread,
        });
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Collect the save in flight if it has finished.
    pub fn poll(&mut self) -> Option<(PathBuf, anyhow::Result<()>)> {
        if !self.pending.as_ref()?.thread.is_finished() {
            return None;
        }
        self.wait()
    }

    /// Block until the save in flight has finished.
    pub fn wait(&mut self) -> Option<(PathBuf, anyhow::Result<()>)> {
        let pending = self.pending.take()?;
        let result = match pending.thread.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("save thread panicked")),
        };
        Some((pending.path, result))
    }
}

impl Drop for Saver {
    fn drop(&mut self) {
        if let Some((path, Err(err))) = self.wait() {
            warn!("Saving {} failed: {:?}", path.display(), err);
        }
    }
}
