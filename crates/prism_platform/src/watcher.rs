//! Background directory watcher feeding a [`ChangeQueue`].
//!
//! One thread owns the `notify` watcher and waits on its event channel with a
//! short timeout so it notices the running flag being cleared promptly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::change_queue::{ChangeEvent, ChangeKind, ChangeQueue};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
/// Repeats of the same change inside this window are collapsed.
const DEBOUNCE: Duration = Duration::from_millis(50);

pub struct FileWatcher {
    dir: PathBuf,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Starts watching `dir` (non-recursively). Events are pushed into `queue`.
    pub fn start(dir: &Path, queue: ChangeQueue) -> Result<Self, String> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)
            .map_err(|e| format!("Failed to create file watcher for {}: {e}", dir.display()))?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| format!("Failed to watch directory {}: {e}", dir.display()))?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("prism-file-watch".to_string())
            .spawn(move || watch_loop(watcher, rx, flag, queue))
            .map_err(|e| format!("Failed to spawn file watch thread: {e}"))?;

        log::info!("Watching {} for changes", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            running,
            thread: Some(thread),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks the thread to exit. It notices within one poll timeout.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("File watch thread for {} panicked", self.dir.display());
            }
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

fn watch_loop(
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    running: Arc<AtomicBool>,
    queue: ChangeQueue,
) {
    let mut debounce = Debounce::new(DEBOUNCE);
    while running.load(Ordering::Acquire) {
        match rx.recv_timeout(POLL_TIMEOUT) {
            Ok(Ok(event)) => {
                let now = Instant::now();
                for change in map_event(&event) {
                    if debounce.should_forward(&change, now) {
                        log::trace!("File change: {change:?}");
                        queue.push(change);
                    }
                }
            }
            Ok(Err(e)) => log::warn!("File watch error: {e}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("File watch channel closed");
                break;
            }
        }
    }
    log::debug!("File watch thread exiting");
}

/// Converts a `notify` event into one change per affected path.
///
/// A file recreated or renamed into place counts as modified, since that is
/// how many editors save.
pub fn map_event(event: &Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(CreateKind::Folder) => ChangeKind::CREATED | ChangeKind::IS_DIRECTORY,
        EventKind::Create(_) => ChangeKind::CREATED | ChangeKind::MODIFIED,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::CREATED | ChangeKind::MODIFIED,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::MODIFIED,
        EventKind::Remove(RemoveKind::Folder) => ChangeKind::DELETED | ChangeKind::IS_DIRECTORY,
        EventKind::Remove(_) => ChangeKind::DELETED,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let mut path_kind = kind;
            if path.is_dir() {
                path_kind |= ChangeKind::IS_DIRECTORY;
            }
            Some(ChangeEvent {
                path_name: name,
                kind: path_kind,
            })
        })
        .collect()
}

/// File modifications are keyed by name alone, so a save that arrives as a
/// create followed by a write only triggers one recompile.
struct Debounce {
    window: Duration,
    last: HashMap<(String, Option<ChangeKind>), Instant>,
}

impl Debounce {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    fn should_forward(&mut self, change: &ChangeEvent, now: Instant) -> bool {
        let kind = (!change.is_file_modification()).then_some(change.kind);
        let key = (change.path_name.clone(), kind);
        if let Some(last) = self.last.get(&key) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }
        self.last.insert(key, now);
        true
    }
}
