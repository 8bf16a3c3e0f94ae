//! Debounced, reference-counted filesystem change watcher.
//!
//! One OS watcher exists per active sandbox root, shared by every
//! subscriber of that root. Raw `notify` events are funneled into a
//! debouncer task that flushes a coalesced batch after
//! [`QUIESCENCE_WINDOW`] of quiet; each batch is delivered to every
//! subscriber in arrival order.
//!
//! The watcher ignores the same names as directory listings (hidden
//! entries, VCS/build metadata, lock files) at any depth of the changed
//! path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::is_ignored_name;
use crate::{AppError, Result};

/// Quiet period after which buffered events are flushed as one batch.
pub const QUIESCENCE_WINDOW: Duration = Duration::from_millis(150);

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FsChangeKind {
    /// File created.
    Add,
    /// Directory created.
    AddDir,
    /// File content changed.
    Change,
    /// File removed.
    Unlink,
    /// Directory removed.
    UnlinkDir,
}

/// One filesystem change, relative to the watched root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsChange {
    /// Change kind.
    pub kind: FsChangeKind,
    /// Path relative to the root, `/`-separated.
    #[serde(rename = "relPath")]
    pub rel_path: String,
}

/// Identifies one subscription for [`WatcherRegistry::unsubscribe`].
#[derive(Debug, Clone)]
pub struct WatchKey {
    /// Canonical root this subscription watches.
    pub root: PathBuf,
    id: u64,
}

/// A live subscription to change batches for one root.
#[derive(Debug)]
pub struct WatchSubscription {
    /// Key for unsubscribing; clonable independently of the receiver.
    pub key: WatchKey,
    /// Receives coalesced change batches.
    pub rx: mpsc::UnboundedReceiver<Vec<FsChange>>,
}

type Subscribers = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Vec<FsChange>>>>>;

struct RootWatch {
    // Kept alive by ownership; dropping it stops the OS watch.
    _watcher: RecommendedWatcher,
    debounce_task: JoinHandle<()>,
    subscribers: Subscribers,
    next_sub_id: u64,
}

/// Process-wide registry of per-root watchers, reference-counted by
/// subscriber count.
#[derive(Clone, Default)]
pub struct WatcherRegistry {
    inner: Arc<Mutex<HashMap<PathBuf, RootWatch>>>,
}

impl WatcherRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to change batches under `root`, creating the OS watcher on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the watcher cannot be created or the
    /// root cannot be watched.
    pub fn subscribe(&self, root: &Path) -> Result<WatchSubscription> {
        let root = root
            .canonicalize()
            .map_err(|err| AppError::Io(format!("watch root invalid: {err}")))?;

        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !map.contains_key(&root) {
            map.insert(root.clone(), Self::start_root_watch(&root)?);
        }

        let entry = map
            .get_mut(&root)
            .ok_or_else(|| AppError::Io("watch entry vanished".into()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = entry.next_sub_id;
        entry.next_sub_id += 1;
        entry
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, tx);

        debug!(root = %root.display(), sub_id = id, "fs watch subscribed");
        Ok(WatchSubscription {
            key: WatchKey { root, id },
            rx,
        })
    }

    /// Drop a subscription; the last unsubscribe tears the OS watcher down.
    pub fn unsubscribe(&self, key: &WatchKey) {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let remove_root = if let Some(entry) = map.get_mut(&key.root) {
            let mut subs = entry
                .subscribers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            subs.remove(&key.id);
            subs.is_empty()
        } else {
            false
        };

        if remove_root {
            if let Some(entry) = map.remove(&key.root) {
                entry.debounce_task.abort();
            }
            debug!(root = %key.root.display(), "fs watch torn down");
        }
    }

    fn start_root_watch(root: &Path) -> Result<RootWatch> {
        let subscribers: Subscribers = Arc::default();
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<FsChange>();
        let callback_root = root.to_path_buf();

        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    for change in map_event(&callback_root, &event) {
                        if raw_tx.send(change).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "fs watcher error");
                }
            },
        )
        .map_err(|err| AppError::Io(format!("failed to create fs watcher: {err}")))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|err| {
                AppError::Io(format!("failed to watch '{}': {err}", root.display()))
            })?;

        let debounce_task = tokio::spawn(run_debouncer(raw_rx, Arc::clone(&subscribers)));

        Ok(RootWatch {
            _watcher: watcher,
            debounce_task,
            subscribers,
            next_sub_id: 0,
        })
    }
}

/// Collect raw events and flush a batch after [`QUIESCENCE_WINDOW`] of quiet.
async fn run_debouncer(mut raw_rx: mpsc::UnboundedReceiver<FsChange>, subscribers: Subscribers) {
    let mut buffer: Vec<FsChange> = Vec::new();

    loop {
        if buffer.is_empty() {
            match raw_rx.recv().await {
                Some(change) => push_coalesced(&mut buffer, change),
                None => return,
            }
        } else {
            tokio::select! {
                event = raw_rx.recv() => {
                    match event {
                        Some(change) => push_coalesced(&mut buffer, change),
                        None => {
                            flush(&mut buffer, &subscribers);
                            return;
                        }
                    }
                }
                () = tokio::time::sleep(QUIESCENCE_WINDOW) => {
                    flush(&mut buffer, &subscribers);
                }
            }
        }
    }
}

/// Append, dropping exact duplicates already buffered.
fn push_coalesced(buffer: &mut Vec<FsChange>, change: FsChange) {
    if !buffer.contains(&change) {
        buffer.push(change);
    }
}

fn flush(buffer: &mut Vec<FsChange>, subscribers: &Subscribers) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    let subs = subscribers
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    for tx in subs.values() {
        let _ = tx.send(batch.clone());
    }
}

/// Map one raw `notify` event into sandbox change records, applying the
/// ignore rules to every component of the changed path.
#[must_use]
pub fn map_event(root: &Path, event: &Event) -> Vec<FsChange> {
    use notify::event::{CreateKind, RemoveKind};

    let base_kind = match event.kind {
        EventKind::Create(CreateKind::Folder) => FsChangeKind::AddDir,
        EventKind::Create(_) => FsChangeKind::Add,
        EventKind::Modify(_) => FsChangeKind::Change,
        EventKind::Remove(RemoveKind::Folder) => FsChangeKind::UnlinkDir,
        EventKind::Remove(_) => FsChangeKind::Unlink,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|path| {
            let rel = path.strip_prefix(root).ok()?;
            let ignored = rel.components().any(|c| {
                c.as_os_str()
                    .to_str()
                    .is_none_or(is_ignored_name)
            });
            if ignored || rel.as_os_str().is_empty() {
                return None;
            }
            let kind = if base_kind == FsChangeKind::Add && path.is_dir() {
                FsChangeKind::AddDir
            } else {
                base_kind
            };
            Some(FsChange {
                kind,
                rel_path: rel.to_string_lossy().replace('\\', "/"),
            })
        })
        .collect()
}
