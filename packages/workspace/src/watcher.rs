//! File watching with event coalescing.
//!
//! Wraps `notify` the same way the rest of the stack consumes it: a
//! receiver of simplified `(path, kind)` events. Bursts are coalesced
//! before processing — an Added followed by Removed cancels out, a
//! Removed followed by Added collapses into one Added. Watch start/stop
//! is serialized per watch key, so reconfiguration churn leaves at most
//! one active watch per key.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use std::sync::Mutex;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    CreateError(#[from] notify::Error),
}

pub type WatcherResult<T> = Result<T, WatcherError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Added,
    Changed,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: FileChangeKind,
}

/// Collapse a burst of raw changes into the net effect per path,
/// preserving first-arrival order of surviving paths.
pub fn coalesce_changes(changes: impl IntoIterator<Item = FileChange>) -> Vec<FileChange> {
    let mut order: Vec<PathBuf> = Vec::new();
    let mut net: HashMap<PathBuf, Option<FileChangeKind>> = HashMap::new();

    for change in changes {
        if !net.contains_key(&change.path) {
            order.push(change.path.clone());
        }
        let slot = net.entry(change.path).or_insert(None);
        *slot = match (*slot, change.kind) {
            // Added then Removed before processing: a no-op pair.
            (Some(FileChangeKind::Added), FileChangeKind::Removed) => None,
            // Removed then Added: a single Added.
            (Some(FileChangeKind::Removed), FileChangeKind::Added) => Some(FileChangeKind::Added),
            // A change to a freshly added file is still just Added.
            (Some(FileChangeKind::Added), FileChangeKind::Changed) => Some(FileChangeKind::Added),
            (_, kind) => Some(kind),
        };
    }

    order
        .into_iter()
        .filter_map(|path| {
            net.get(&path)
                .copied()
                .flatten()
                .map(|kind| FileChange { path, kind })
        })
        .collect()
}

fn simplify(event: Event) -> Vec<FileChange> {
    let kind = match event.kind {
        EventKind::Create(_) => Some(FileChangeKind::Added),
        EventKind::Modify(_) => Some(FileChangeKind::Changed),
        EventKind::Remove(_) => Some(FileChangeKind::Removed),
        _ => None,
    };
    match kind {
        Some(kind) => event
            .paths
            .into_iter()
            .map(|path| FileChange { path, kind })
            .collect(),
        None => Vec::new(),
    }
}

/// Watches one directory tree and yields simplified change events.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: Receiver<notify::Result<Event>>,
}

impl FileWatcher {
    pub fn new(path: PathBuf) -> WatcherResult<Self> {
        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        watcher.watch(&path, RecursiveMode::Recursive)?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    /// Block until the next change arrives.
    pub fn next_change(&self) -> Option<FileChange> {
        loop {
            match self.receiver.recv() {
                Ok(Ok(event)) => {
                    let mut changes = simplify(event);
                    if let Some(change) = changes.pop() {
                        return Some(change);
                    }
                }
                Ok(Err(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drain everything already queued and coalesce it.
    pub fn drain_coalesced(&self) -> Vec<FileChange> {
        let mut raw = Vec::new();
        while let Ok(Ok(event)) = self.receiver.try_recv() {
            raw.extend(simplify(event));
        }
        coalesce_changes(raw)
    }
}

/// At most one active watch per key. Re-watching a key tears the old
/// watch down first, so rapid reconfiguration (debug, release, debug)
/// never leaves two watches racing on the same key.
#[derive(Default)]
pub struct WatchRegistry {
    watches: Mutex<HashMap<String, FileWatcher>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&self, key: impl Into<String>, path: PathBuf) -> WatcherResult<()> {
        let key = key.into();
        let mut watches = self.watches.lock().expect("watch registry lock poisoned");
        // Drop the previous watcher before starting its replacement.
        watches.remove(&key);
        let watcher = FileWatcher::new(path)?;
        watches.insert(key, watcher);
        Ok(())
    }

    pub fn unwatch(&self, key: &str) {
        self.watches
            .lock()
            .expect("watch registry lock poisoned")
            .remove(key);
    }

    pub fn is_watching(&self, key: &str) -> bool {
        self.watches
            .lock()
            .expect("watch registry lock poisoned")
            .contains_key(key)
    }

    pub fn drain_coalesced(&self, key: &str) -> Vec<FileChange> {
        self.watches
            .lock()
            .expect("watch registry lock poisoned")
            .get(key)
            .map(|w| w.drain_coalesced())
            .unwrap_or_default()
    }
}
