//! Version correlation cache.
//!
//! Consumers that care about version numbers (incremental publishing,
//! diagnostics) hold onto a [`DocumentSnapshot`] and later need the
//! version last assigned to its path. Unrelated project mutations
//! produce new snapshot instances without a genuine version change, so
//! the cache correlates by snapshot identity: a bounded ring of
//! weakly-held `(snapshot, version)` pairs per path. `Weak` resolution
//! is refcount-driven, so entry invalidation is deterministic.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use crate::machine::{ChangeEvent, ChangeKind, ChangeListener};
use crate::snapshot::DocumentSnapshot;

/// Ring bound per document path. Oldest entries are dropped beyond it.
pub const MAX_DOCUMENT_TRACKING_COUNT: usize = 20;

struct TrackedVersion {
    snapshot: Weak<DocumentSnapshot>,
    version: i32,
}

/// Maps document snapshots to the version last assigned to their path.
///
/// Written only from within the state machine's serialization domain
/// (listener callback plus the project system's explicit tracking), read
/// from anywhere.
#[derive(Default)]
pub struct DocumentVersionCache {
    entries: Mutex<HashMap<PathBuf, VecDeque<TrackedVersion>>>,
}

impl DocumentVersionCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record that `snapshot`'s path is now at `version`.
    pub fn track_version(&self, snapshot: &Arc<DocumentSnapshot>, version: i32) {
        let mut entries = self.entries.lock().expect("version cache lock poisoned");
        let ring = entries
            .entry(snapshot.file_path().to_path_buf())
            .or_default();
        ring.push_back(TrackedVersion {
            snapshot: Arc::downgrade(snapshot),
            version,
        });
        while ring.len() > MAX_DOCUMENT_TRACKING_COUNT {
            ring.pop_front();
        }
    }

    /// Re-tag a replacement snapshot with the most recent version for
    /// its path. Used when state churn produces a new snapshot instance
    /// without an explicit version bump, so identity lookups stay valid.
    /// No-op for untracked paths.
    pub fn mark_as_latest(&self, snapshot: &Arc<DocumentSnapshot>) {
        let latest = {
            let entries = self.entries.lock().expect("version cache lock poisoned");
            entries
                .get(snapshot.file_path())
                .and_then(|ring| ring.back())
                .map(|entry| entry.version)
        };
        if let Some(version) = latest {
            self.track_version(snapshot, version);
        }
    }

    /// Version tagged for exactly this snapshot instance, if its entry
    /// is still alive.
    pub fn try_get_version(&self, snapshot: &Arc<DocumentSnapshot>) -> Option<i32> {
        let entries = self.entries.lock().expect("version cache lock poisoned");
        let ring = entries.get(snapshot.file_path())?;
        ring.iter()
            .rev()
            .find(|entry| {
                entry
                    .snapshot
                    .upgrade()
                    .is_some_and(|held| Arc::ptr_eq(&held, snapshot))
            })
            .map(|entry| entry.version)
    }

    /// Drop every entry for `path`.
    pub fn evict(&self, path: &Path) {
        self.entries
            .lock()
            .expect("version cache lock poisoned")
            .remove(path);
    }

    #[cfg(test)]
    fn len_for(&self, path: &Path) -> usize {
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .map_or(0, |ring| ring.len())
    }
}

impl ChangeListener for DocumentVersionCache {
    fn on_change(&self, event: &ChangeEvent) {
        match event.kind {
            // A closed document's identity lineage no longer matters for
            // live-editing version correlation.
            ChangeKind::DocumentClosed => {
                if let Some(path) = event.document_path.as_deref() {
                    self.evict(path);
                }
            }
            // Content-neutral replacement snapshots inherit the latest
            // version so identity lookups keep resolving. Removal while
            // open deliberately preserves entries.
            ChangeKind::DocumentAdded | ChangeKind::DocumentChanged | ChangeKind::DocumentOpened => {
                if let Some(document) = &event.document {
                    if event.newer.is_open(document.file_path()) {
                        self.mark_as_latest(document);
                    }
                }
            }
            // Removals mint fresh snapshots for surviving documents
            // without a genuine version change; re-tag them so identity
            // lookups against the current snapshot keep resolving.
            ChangeKind::ProjectRemoved | ChangeKind::DocumentRemoved => {
                for document in &event.rehomed {
                    self.mark_as_latest(document);
                }
            }
            _ => {}
        }
    }
}
