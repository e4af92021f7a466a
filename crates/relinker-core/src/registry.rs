//! The saved-playlists list shown at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::persist::{self, StoreError};
use crate::playlist;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub path: PathBuf,
    pub name: String,
}

impl RegistryEntry {
    /// Entry named after the playlist file.
    pub fn for_playlist(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = playlist::default_name(&path);
        Self { path, name }
    }
}

/// Ordered list of playlists the user has added, with display names.
#[derive(Debug, Default)]
pub struct Registry {
    path: Option<PathBuf>,
    entries: Vec<RegistryEntry>,
}

impl Registry {
    /// Load the registry at `path`. Missing or corrupt files give an empty list.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Vec<RegistryEntry>>(&content)
                .unwrap_or_else(|e| {
                    warn!("registry: {} is corrupt, ignoring: {}", path.display(), e);
                    Vec::new()
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("registry: cannot read {}: {}", path.display(), e);
                Vec::new()
            }
        };
        debug!("registry: loaded {} playlist(s)", entries.len());
        Self {
            path: Some(path),
            entries,
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    pub fn get(&self, path: &Path) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Append `entry` unless its path is already registered.
    pub fn add(&mut self, entry: RegistryEntry) -> bool {
        if self.contains(&entry.path) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Add several entries, skipping known paths. Returns how many were new.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = RegistryEntry>) -> usize {
        let mut added = 0;
        for entry in entries {
            if self.add(entry) {
                added += 1;
            }
        }
        added
    }

    /// Change the display name. Blank names are refused.
    pub fn rename(&mut self, path: &Path, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        match self.entries.iter_mut().find(|e| e.path == path) {
            Some(entry) => {
                entry.name = name.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, path: &Path) -> Option<RegistryEntry> {
        let pos = self.entries.iter().position(|e| e.path == path)?;
        Some(self.entries.remove(pos))
    }

    /// Drop entries whose playlist file has disappeared.
    pub fn prune_missing(&mut self) -> Vec<RegistryEntry> {
        let (kept, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.path.is_file());
        self.entries = kept;
        if !gone.is_empty() {
            info!("registry: dropped {} missing playlist(s)", gone.len());
        }
        gone
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| StoreError::encode(path, e))?;
        persist::write_atomic(path, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_dedupes_by_path() {
        let mut reg = Registry::in_memory();
        assert!(reg.add(RegistryEntry::for_playlist("/m/Chill.m3u8")));
        assert!(!reg.add(RegistryEntry {
            path: "/m/Chill.m3u8".into(),
            name: "other".into()
        }));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.entries()[0].name, "Chill");
    }

    #[test]
    fn extend_counts_only_new_entries() {
        let mut reg = Registry::in_memory();
        reg.add(RegistryEntry::for_playlist("/a.m3u"));
        let added = reg.extend(vec![
            RegistryEntry::for_playlist("/a.m3u"),
            RegistryEntry::for_playlist("/b.m3u"),
            RegistryEntry::for_playlist("/b.m3u"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn rename_trims_and_rejects_blank() {
        let mut reg = Registry::in_memory();
        reg.add(RegistryEntry::for_playlist("/a.m3u"));
        assert!(reg.rename(Path::new("/a.m3u"), "  Morning  "));
        assert_eq!(reg.get(Path::new("/a.m3u")).unwrap().name, "Morning");
        assert!(!reg.rename(Path::new("/a.m3u"), "   "));
        assert!(!reg.rename(Path::new("/zzz.m3u"), "x"));
    }

    #[test]
    fn remove_returns_entry_once() {
        let mut reg = Registry::in_memory();
        reg.add(RegistryEntry::for_playlist("/a.m3u"));
        assert!(reg.remove(Path::new("/a.m3u")).is_some());
        assert!(reg.remove(Path::new("/a.m3u")).is_none());
    }

    #[test]
    fn save_and_reload_keeps_order_and_names() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("playlists.json");
        let mut reg = Registry::load(&file);
        reg.add(RegistryEntry::for_playlist("/z.m3u"));
        reg.add(RegistryEntry::for_playlist("/a.m3u"));
        reg.rename(Path::new("/a.m3u"), "Alpha");
        reg.save().unwrap();

        let reloaded = Registry::load(&file);
        let names: Vec<&str> = reloaded.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["z", "Alpha"]);
    }

    #[test]
    fn corrupt_registry_loads_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("playlists.json");
        std::fs::write(&file, "{ not json").unwrap();
        assert!(Registry::load(&file).is_empty());
    }

    #[test]
    fn prune_missing_drops_deleted_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let present = tmp.path().join("here.m3u");
        std::fs::write(&present, "").unwrap();

        let mut reg = Registry::in_memory();
        reg.add(RegistryEntry::for_playlist(&present));
        reg.add(RegistryEntry::for_playlist(tmp.path().join("gone.m3u")));
        let gone = reg.prune_missing();
        assert_eq!(gone.len(), 1);
        assert_eq!(reg.len(), 1);
        assert!(reg.contains(&present));
    }
}
