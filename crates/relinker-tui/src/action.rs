//! Actions — the vocabulary between components and the App.

use std::path::PathBuf;

/// Identifies a focusable pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    PlaylistList,
    TrackList,
    NowPlaying,
    HelpOverlay,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Playback ──────────────────────────────────────────────────────────────
    TogglePause,
    Next,
    Prev,
    /// Seek relative to the current offset, in milliseconds.
    SeekRelative(i64),
    /// Seek to an absolute offset in the current track, in milliseconds.
    SeekTo(u64),
    /// Open a playlist at its resume point and start playing.
    OpenPlaylist(PathBuf),
    /// Open a playlist (if not already open) and play from track `usize`.
    PlayTrack(PathBuf, usize),

    // ── Playlists ─────────────────────────────────────────────────────────────
    /// The playlist pane's selection moved; the track pane follows it.
    SelectPlaylist(PathBuf),
    RenamePlaylist(PathBuf, String),
    DeletePlaylist(PathBuf),
    /// Scan a folder in the background and register what it holds.
    AddFolder(PathBuf),

    // ── Settings ──────────────────────────────────────────────────────────────
    CycleOutput,
    ToggleTheme,

    // ── Navigation ────────────────────────────────────────────────────────────
    FocusNext,
    FocusPrev,
    FocusPane(ComponentId),

    // ── UI ────────────────────────────────────────────────────────────────────
    ToggleHelp,
    CopyToClipboard(String),
    Quit,
}
