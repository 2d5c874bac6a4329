//! Filesystem actor.
//!
//! Watches the source directories and forwards debounced change batches to
//! the build actor. The watcher starts in [`FsActor::new`], so events that
//! arrive before [`FsActor::run`] are buffered, not lost.
//!
//! ```text
//! notify -> Debouncer (timing, dedup) -> reconcile (existence) -> BuildMsg
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use super::messages::BuildMsg;
use crate::utils::path::normalize_path;
use crate::{debug, log};

const DEBOUNCE_MS: u64 = 300;
const REBUILD_COOLDOWN_MS: u64 = 800;

/// Editor swap/backup files and dotfiles.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Directories to hand to notify: each path or its nearest existing
/// ancestor, without entries nested in another one.
fn watch_targets(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut targets: Vec<PathBuf> = paths
        .iter()
        .filter_map(|path| {
            let existing = path.ancestors().find(|p| p.exists())?;
            if existing != path.as_path() {
                log!("watch"; "{} does not exist yet, watching {}", path.display(), existing.display());
            }
            Some(existing.to_path_buf())
        })
        .collect();
    targets.sort();
    targets.dedup();

    let mut kept: Vec<PathBuf> = Vec::new();
    for target in targets {
        if !kept.iter().any(|k| target.starts_with(k)) {
            kept.push(target);
        }
    }
    kept
}

pub struct FsActor {
    /// Sync side of notify; bridged to async in `run`.
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Must stay alive for events to keep flowing.
    _watcher: RecommendedWatcher,
    build_tx: mpsc::Sender<BuildMsg>,
    debouncer: Debouncer,
}

impl FsActor {
    /// Start watching `paths` recursively. A path that does not exist yet is
    /// covered by watching its nearest existing ancestor.
    pub fn new(paths: &[PathBuf], build_tx: mpsc::Sender<BuildMsg>) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        for path in watch_targets(paths) {
            watcher.watch(&path, RecursiveMode::Recursive)?;
            debug!("watch"; "{}", path.display());
        }

        Ok(Self {
            notify_rx,
            _watcher: watcher,
            build_tx,
            debouncer: Debouncer::new(),
        })
    }

    pub async fn run(self) {
        let notify_rx = self.notify_rx;
        let build_tx = self.build_tx;
        let mut debouncer = self.debouncer;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                Some(event) = async_rx.recv() => debouncer.add_event(&event),
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    if flush(&mut debouncer, &build_tx).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Forward a ready batch. `Err(())` once the build actor is gone.
async fn flush(debouncer: &mut Debouncer, build_tx: &mpsc::Sender<BuildMsg>) -> Result<(), ()> {
    if crate::core::is_shutdown() {
        return Err(());
    }
    let Some(mut changes) = debouncer.take_if_ready() else {
        return Ok(());
    };

    reconcile(&mut changes);
    if changes.is_empty() {
        return Ok(());
    }

    let mut paths: Vec<PathBuf> = Vec::with_capacity(changes.len());
    for (path, kind) in changes {
        debug!("watch"; "{}: {}", kind.label(), path.display());
        paths.push(path);
    }
    paths.sort();

    build_tx.send(BuildMsg::Changed(paths)).await.map_err(|_| ())
}

/// Correct event kinds against what is on disk now and drop directories.
///
/// Watchers report stale kinds around atomic saves: `Removed` for a file an
/// editor just renamed into place, `Created` for a temp file already gone.
fn reconcile(changes: &mut FxHashMap<PathBuf, ChangeKind>) {
    changes.retain(|path, kind| {
        let exists = path.exists();
        match *kind {
            ChangeKind::Created if !exists => false,
            ChangeKind::Modified if !exists => {
                *kind = ChangeKind::Removed;
                true
            }
            ChangeKind::Removed if exists => {
                *kind = ChangeKind::Modified;
                !path.is_dir()
            }
            ChangeKind::Removed => true,
            ChangeKind::Created | ChangeKind::Modified => path.is_file(),
        }
    });
}

// =============================================================================
// Change types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

// =============================================================================
// Debouncer
// =============================================================================

/// Timing and per-path dedup. Knows nothing about stages.
struct Debouncer {
    changes: FxHashMap<PathBuf, ChangeKind>,
    last_event: Option<Instant>,
    last_build: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
            last_build: None,
        }
    }

    /// Record a notify event.
    ///
    /// - Removed then Created/Modified: restored, keep the new kind
    /// - Modified then Removed: deleted
    /// - Created then Removed: never existed, drop
    /// - otherwise the first kind wins
    fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            EventKind::Modify(modify) => {
                // mtime/chmod noise would retrigger builds forever
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return;
                }
                ChangeKind::Modified
            }
            _ => return,
        };

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }
            let path = normalize_path(path);

            if let Some(&existing) = self.changes.get(&path) {
                match (existing, kind) {
                    (ChangeKind::Removed, ChangeKind::Created | ChangeKind::Modified) => {
                        self.changes.insert(path, kind);
                    }
                    (ChangeKind::Modified, ChangeKind::Removed) => {
                        self.changes.insert(path, ChangeKind::Removed);
                    }
                    (ChangeKind::Created, ChangeKind::Removed) => {
                        self.changes.remove(&path);
                    }
                    _ => continue,
                }
                self.last_event = Some(Instant::now());
                continue;
            }

            self.changes.insert(path, kind);
            self.last_event = Some(Instant::now());
        }
    }

    /// Take the batch once debounce and cooldown have both elapsed.
    fn take_if_ready(&mut self) -> Option<FxHashMap<PathBuf, ChangeKind>> {
        if !self.is_ready() {
            return None;
        }

        let changes = std::mem::take(&mut self.changes);
        self.last_event = None;

        if changes.is_empty() {
            return None;
        }

        self.last_build = Some(Instant::now());
        Some(changes)
    }

    fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };

        if last_event.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
            return false;
        }

        if let Some(last_build) = self.last_build
            && last_build.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS)
        {
            return false;
        }

        !self.changes.is_empty()
    }

    /// Time until the batch could next be ready.
    fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };

        let debounce_remaining =
            Duration::from_millis(DEBOUNCE_MS).saturating_sub(last_event.elapsed());

        let cooldown_remaining = self
            .last_build
            .map(|t| Duration::from_millis(REBUILD_COOLDOWN_MS).saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}
