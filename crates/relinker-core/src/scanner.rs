//! Library scanner: finds playlist files under a directory.
//!
//! The walk follows symlinks but remembers every real directory it entered,
//! so symlink cycles and aliased folders are walked once. Each real playlist
//! file is yielded once, by its canonical path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::playlist::{self, Playlist, PlaylistFormat};

/// A scan of one root directory. Iterating starts a fresh walk each time.
#[derive(Debug, Clone)]
pub struct LibraryScan {
    root: PathBuf,
    recursive: bool,
}

/// Recursive scan of `root`.
pub fn scan(root: impl Into<PathBuf>) -> LibraryScan {
    LibraryScan {
        root: root.into(),
        recursive: true,
    }
}

/// Scan of `root` itself, without descending into subdirectories.
pub fn scan_shallow(root: impl Into<PathBuf>) -> LibraryScan {
    LibraryScan {
        root: root.into(),
        recursive: false,
    }
}

impl LibraryScan {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Lazily walk the tree, yielding playlist paths.
    pub fn iter(&self) -> PlaylistPaths {
        let mut walker = WalkDir::new(&self.root).follow_links(true);
        if !self.recursive {
            walker = walker.max_depth(1);
        }
        PlaylistPaths {
            inner: walker.into_iter(),
            visited_dirs: HashSet::new(),
            seen_files: HashSet::new(),
        }
    }

    /// Walk and parse every playlist. Unreadable ones are skipped.
    pub fn load_all(&self) -> Vec<Playlist> {
        self.iter()
            .filter_map(|path| match playlist::load(&path) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("scan: skipping {}: {}", path.display(), e);
                    None
                }
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a LibraryScan {
    type Item = PathBuf;
    type IntoIter = PlaylistPaths;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct PlaylistPaths {
    inner: walkdir::IntoIter,
    visited_dirs: HashSet<PathBuf>,
    seen_files: HashSet<PathBuf>,
}

impl Iterator for PlaylistPaths {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    // permission denied, loops, vanished entries
                    warn!("scan: {}", e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                match std::fs::canonicalize(entry.path()) {
                    Ok(real) => {
                        if !self.visited_dirs.insert(real) {
                            debug!("scan: already walked {}", entry.path().display());
                            self.inner.skip_current_dir();
                        }
                    }
                    Err(e) => {
                        warn!("scan: {}: {}", entry.path().display(), e);
                        self.inner.skip_current_dir();
                    }
                }
                continue;
            }

            if !entry.file_type().is_file() || !PlaylistFormat::is_playlist(entry.path()) {
                continue;
            }

            let real = match std::fs::canonicalize(entry.path()) {
                Ok(real) => real,
                Err(e) => {
                    warn!("scan: {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            if self.seen_files.insert(real.clone()) {
                return Some(real);
            }
        }
    }
}
