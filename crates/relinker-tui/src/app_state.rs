//! AppState — shared read-only data passed to all components during render/event.
//!
//! Components read this for registry and playback data, but never mutate it.
//! The App event-loop is the only thing that writes to AppState.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use relinker_core::config::ThemeMode;
use relinker_core::controller::PlayerState;
use relinker_core::engine::AudioOutput;
use relinker_core::playlist::Playlist;
use relinker_core::positions::PlaybackRecord;
use relinker_core::registry::RegistryEntry;

use crate::theme::Palette;
use crate::widgets::status_bar::InputMode;

/// One row of the track pane.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRow {
    pub title: String,
    /// Path or URL as stored in the position store.
    pub key: String,
    pub missing: bool,
    pub finished: bool,
    pub duration_secs: Option<u64>,
}

/// The playlist shown in the track pane, with its resume markers.
#[derive(Debug, Clone)]
pub struct TrackView {
    pub playlist: PathBuf,
    pub rows: Vec<TrackRow>,
    pub resume: PlaybackRecord,
}

impl TrackView {
    pub fn build(playlist: &Playlist, resume: PlaybackRecord, finished: &BTreeSet<String>) -> Self {
        let rows = playlist
            .tracks
            .iter()
            .map(|track| {
                let key = track.location.key();
                TrackRow {
                    title: track
                        .title
                        .clone()
                        .unwrap_or_else(|| track.location.file_name()),
                    missing: !track.location.exists(),
                    finished: finished.contains(&key),
                    duration_secs: track.duration_secs,
                    key,
                }
            })
            .collect();
        Self {
            playlist: playlist.path.clone(),
            rows,
            resume,
        }
    }

    /// Refresh resume and finished markers without touching the disk.
    /// Returns whether anything changed.
    pub fn update_markers(&mut self, resume: PlaybackRecord, finished: &BTreeSet<String>) -> bool {
        let mut changed = self.resume.track_index != resume.track_index;
        self.resume = resume;
        for row in &mut self.rows {
            let done = finished.contains(&row.key);
            changed |= row.finished != done;
            row.finished = done;
        }
        changed
    }
}

/// What the header shows about the active session.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub playlist: PathBuf,
    pub playlist_name: String,
    pub track_index: usize,
    pub track_count: usize,
    pub title: String,
    pub state: PlayerState,
    pub offset_ms: u64,
    pub duration_ms: Option<u64>,
}

impl NowPlaying {
    /// Fraction of the current track played, 0.0 when the length is unknown.
    pub fn progress(&self) -> f64 {
        match self.duration_ms {
            Some(d) if d > 0 => (self.offset_ms as f64 / d as f64).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

pub struct AppState {
    pub palette: Palette,
    pub theme: ThemeMode,
    pub playlists: Vec<RegistryEntry>,
    pub tracks: Option<TrackView>,
    pub now: Option<NowPlaying>,
    pub output: AudioOutput,
    /// False when mpv could not be started; lists still work.
    pub engine_available: bool,
    pub input_mode: InputMode,
    pub cover: Option<Arc<RgbImage>>,
    pub seek_step_ms: u64,
    pub fine_seek_step_ms: u64,
}

impl AppState {
    pub fn new(theme: ThemeMode) -> Self {
        Self {
            palette: Palette::for_mode(theme),
            theme,
            playlists: Vec::new(),
            tracks: None,
            now: None,
            output: AudioOutput::default(),
            engine_available: true,
            input_mode: InputMode::Normal,
            cover: None,
            seek_step_ms: 5_000,
            fine_seek_step_ms: 1_000,
        }
    }

    pub fn set_theme(&mut self, theme: ThemeMode) {
        self.theme = theme;
        self.palette = Palette::for_mode(theme);
    }

    pub fn is_open(&self, playlist: &Path) -> bool {
        self.now.as_ref().is_some_and(|n| n.playlist == playlist)
    }

    /// Index of the playing track when the track pane shows the open playlist.
    pub fn current_track_in_view(&self) -> Option<usize> {
        let view = self.tracks.as_ref()?;
        let now = self.now.as_ref()?;
        (now.playlist == view.playlist).then_some(now.track_index)
    }

    pub fn playlist_name(&self, path: &Path) -> Option<&str> {
        self.playlists
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.name.as_str())
    }
}
