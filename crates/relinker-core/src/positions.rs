//! Per-playlist resume positions.
//!
//! Updates land in memory and are written out only by [`PositionStore::flush`],
//! which the controller calls at its lifecycle points (pause, track change,
//! playlist switch, shutdown). A failed flush leaves the store dirty so the
//! next one retries.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::persist::{self, StoreError};

/// Where playback of a playlist should resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackRecord {
    pub track_index: usize,
    pub offset_ms: u64,
}

impl PlaybackRecord {
    pub const ZERO: PlaybackRecord = PlaybackRecord {
        track_index: 0,
        offset_ms: 0,
    };
}

/// On-disk shape of one playlist's entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Entry {
    #[serde(default)]
    track_index: usize,
    #[serde(default)]
    offset_ms: u64,
    /// Playlist length the last time it was parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    track_count: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    finished: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn clamp_index(&self, index: usize) -> usize {
        match self.track_count {
            Some(0) => 0,
            Some(count) => index.min(count - 1),
            None => index,
        }
    }

    fn record(&self) -> PlaybackRecord {
        PlaybackRecord {
            track_index: self.clamp_index(self.track_index),
            offset_ms: self.offset_ms,
        }
    }
}

#[derive(Debug, Default)]
pub struct PositionStore {
    /// Backing file; `None` keeps everything in memory.
    path: Option<PathBuf>,
    entries: BTreeMap<String, Entry>,
    dirty: bool,
}

fn key(playlist: &Path) -> String {
    playlist.to_string_lossy().into_owned()
}

impl PositionStore {
    /// Open the store backed by `path`. A missing, unreadable or corrupt file
    /// yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<BTreeMap<String, Entry>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        "positions: {} is corrupt, starting with no history: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(
                    "positions: cannot read {}, starting with no history: {}",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }
        };
        debug!("positions: loaded {} playlist(s)", entries.len());
        Self {
            path: Some(path),
            entries,
            dirty: false,
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored position, or the zero record for a playlist never played.
    pub fn get(&self, playlist: &Path) -> PlaybackRecord {
        self.entries
            .get(&key(playlist))
            .map(Entry::record)
            .unwrap_or(PlaybackRecord::ZERO)
    }

    /// When the record was last changed.
    pub fn updated_at(&self, playlist: &Path) -> Option<DateTime<Utc>> {
        self.entries.get(&key(playlist)).and_then(|e| e.updated_at)
    }

    /// Record a position. The index is clamped to the last known playlist
    /// length and a negative offset is stored as 0.
    pub fn put(&mut self, playlist: &Path, track_index: usize, offset_ms: i64) {
        let entry = self.entries.entry(key(playlist)).or_default();
        let track_index = entry.clamp_index(track_index);
        let offset_ms = offset_ms.max(0) as u64;
        if entry.track_index == track_index
            && entry.offset_ms == offset_ms
            && entry.updated_at.is_some()
        {
            return;
        }
        entry.track_index = track_index;
        entry.offset_ms = offset_ms;
        entry.updated_at = Some(Utc::now());
        self.dirty = true;
    }

    /// Remember how many tracks the playlist has now, pulling a stored index
    /// back inside the range if the playlist shrank.
    pub fn set_track_count(&mut self, playlist: &Path, count: usize) {
        let entry = self.entries.entry(key(playlist)).or_default();
        if entry.track_count == Some(count) {
            return;
        }
        entry.track_count = Some(count);
        let clamped = entry.clamp_index(entry.track_index);
        if clamped != entry.track_index {
            debug!(
                "positions: {} shrank to {} track(s), index {} -> {}",
                playlist.display(),
                count,
                entry.track_index,
                clamped
            );
            entry.track_index = clamped;
            entry.offset_ms = 0;
        }
        self.dirty = true;
    }

    pub fn mark_finished(&mut self, playlist: &Path, track: &str) {
        let entry = self.entries.entry(key(playlist)).or_default();
        if entry.finished.insert(track.to_string()) {
            self.dirty = true;
        }
    }

    /// Tracks of `playlist` that were played to the end.
    pub fn finished(&self, playlist: &Path) -> BTreeSet<String> {
        self.entries
            .get(&key(playlist))
            .map(|e| e.finished.clone())
            .unwrap_or_default()
    }

    /// Forget everything about `playlist`. No-op if nothing is stored.
    pub fn remove(&mut self, playlist: &Path) {
        if self.entries.remove(&key(playlist)).is_some() {
            self.dirty = true;
        }
    }

    /// Write pending changes. On error the changes stay pending.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let Some(path) = self.path.as_deref() else {
            self.dirty = false;
            return Ok(());
        };

        let content =
            toml::to_string_pretty(&self.entries).map_err(|e| StoreError::encode(path, e))?;
        persist::write_atomic(path, content.as_bytes())?;
        debug!(
            "positions: flushed {} playlist(s) to {}",
            self.entries.len(),
            path.display()
        );
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn unknown_playlist_gets_zero_record() {
        let store = PositionStore::in_memory();
        assert_eq!(store.get(&p("/never/played.m3u")), PlaybackRecord::ZERO);
    }

    #[test]
    fn put_then_get_returns_the_record() {
        let mut store = PositionStore::in_memory();
        store.put(&p("/a.m3u"), 3, 12_500);
        assert_eq!(
            store.get(&p("/a.m3u")),
            PlaybackRecord {
                track_index: 3,
                offset_ms: 12_500
            }
        );
        store.put(&p("/a.m3u"), 1, 0);
        assert_eq!(store.get(&p("/a.m3u")).track_index, 1);
    }

    #[test]
    fn negative_offset_is_stored_as_zero() {
        let mut store = PositionStore::in_memory();
        store.put(&p("/a.m3u"), 0, -4_000);
        assert_eq!(store.get(&p("/a.m3u")).offset_ms, 0);
    }

    #[test]
    fn index_is_clamped_to_known_track_count() {
        let mut store = PositionStore::in_memory();
        store.set_track_count(&p("/a.m3u"), 4);
        store.put(&p("/a.m3u"), 9, 100);
        assert_eq!(store.get(&p("/a.m3u")).track_index, 3);

        store.set_track_count(&p("/empty.m3u"), 0);
        store.put(&p("/empty.m3u"), 2, 0);
        assert_eq!(store.get(&p("/empty.m3u")).track_index, 0);
    }

    #[test]
    fn shrinking_playlist_pulls_index_back() {
        let mut store = PositionStore::in_memory();
        store.set_track_count(&p("/a.m3u"), 5);
        store.put(&p("/a.m3u"), 4, 30_000);

        store.set_track_count(&p("/a.m3u"), 3);
        assert!(store.get(&p("/a.m3u")).track_index <= 2);
        store.put(&p("/a.m3u"), 4, 0);
        assert_eq!(store.get(&p("/a.m3u")).track_index, 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = PositionStore::in_memory();
        store.put(&p("/a.m3u"), 2, 10);
        store.remove(&p("/a.m3u"));
        assert_eq!(store.get(&p("/a.m3u")), PlaybackRecord::ZERO);
        store.remove(&p("/a.m3u"));
        store.remove(&p("/b.m3u"));
    }

    #[test]
    fn unchanged_put_does_not_dirty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut store = PositionStore::load(tmp.path().join("positions.toml"));
        store.put(&p("/a.m3u"), 1, 500);
        store.flush().unwrap();
        assert!(!store.is_dirty());
        store.put(&p("/a.m3u"), 1, 500);
        assert!(!store.is_dirty());
        store.put(&p("/a.m3u"), 1, 750);
        assert!(store.is_dirty());
    }

    #[test]
    fn survives_restart() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("positions.toml");

        let mut store = PositionStore::load(&file);
        store.put(&p("/music/A.m3u8"), 2, 45_000);
        store.mark_finished(&p("/music/A.m3u8"), "/music/01.flac");
        store.flush().unwrap();

        let reopened = PositionStore::load(&file);
        assert_eq!(
            reopened.get(&p("/music/A.m3u8")),
            PlaybackRecord {
                track_index: 2,
                offset_ms: 45_000
            }
        );
        assert!(reopened
            .finished(&p("/music/A.m3u8"))
            .contains("/music/01.flac"));
        assert!(reopened.updated_at(&p("/music/A.m3u8")).is_some());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("positions.toml");
        std::fs::write(&file, "this is = = not toml [[[").unwrap();

        let store = PositionStore::load(&file);
        assert!(store.is_empty());
        assert_eq!(store.get(&p("/a.m3u")), PlaybackRecord::ZERO);
    }

    #[test]
    fn failed_flush_keeps_changes_for_retry() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("state");
        std::fs::write(&blocker, b"a file where a directory should be").unwrap();
        let file = blocker.join("positions.toml");

        let mut store = PositionStore::load(&file);
        store.put(&p("/a.m3u"), 1, 2_000);
        assert!(store.flush().is_err());
        assert!(store.is_dirty());
        assert_eq!(store.get(&p("/a.m3u")).offset_ms, 2_000);

        std::fs::remove_file(&blocker).unwrap();
        store.flush().unwrap();
        assert!(!store.is_dirty());
        assert_eq!(PositionStore::load(&file).get(&p("/a.m3u")).offset_ms, 2_000);
    }

    #[test]
    fn flush_without_changes_does_not_create_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("positions.toml");
        let mut store = PositionStore::load(&file);
        store.flush().unwrap();
        assert!(!file.exists());
    }
}
