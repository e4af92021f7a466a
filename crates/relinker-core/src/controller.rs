//! Player controller: the session cursor and the state machine on top of a
//! [`MediaEngine`].
//!
//! ```text
//! Stopped -> Loaded -> Playing <-> Paused -> (track end) -> Playing(next)
//! ```
//!
//! The controller owns the in-memory cursor (playlist, track index, offset)
//! and writes it through to the [`PositionStore`] cache on every poll. The
//! store is flushed to disk only at pause, track change, playlist switch and
//! shutdown. A failed flush is logged and kept for [`PlayerController::take_flush_error`];
//! playback carries on.

use std::time::Duration;

use anyhow::bail;
use tracing::{debug, info, warn};

use crate::engine::{AudioOutput, EngineEvent, MediaEngine};
use crate::playlist::{Playlist, Track, TrackRef};
use crate::positions::PositionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Loaded,
    Playing,
    Paused,
}

impl PlayerState {
    pub fn is_playing(self) -> bool {
        self == Self::Playing
    }
}

/// Where the session is inside the open playlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub track_index: usize,
    pub offset_ms: u64,
    /// Engine-reported length of the current track, once known.
    pub duration_ms: Option<u64>,
}

impl Cursor {
    fn at(track_index: usize, offset_ms: u64) -> Self {
        Self {
            track_index,
            offset_ms,
            duration_ms: None,
        }
    }
}

#[derive(Debug)]
struct Session {
    playlist: Playlist,
    cursor: Cursor,
    /// Seek to apply once the engine has loaded the current file.
    pending_seek: Option<u64>,
    file_loaded: bool,
    /// Index of the track handed to the engine for a gapless switch.
    queued: Option<usize>,
}

impl Session {
    fn new(playlist: Playlist, cursor: Cursor) -> Self {
        Self {
            playlist,
            cursor,
            pending_seek: None,
            file_loaded: false,
            queued: None,
        }
    }

    fn current(&self) -> Option<&Track> {
        self.playlist.track(self.cursor.track_index)
    }
}

const DEFAULT_PREFETCH_LEAD: Duration = Duration::from_secs(10);

pub struct PlayerController<E> {
    engine: E,
    store: PositionStore,
    session: Option<Session>,
    state: PlayerState,
    output: AudioOutput,
    prefetch_lead_ms: u64,
    flush_error: Option<String>,
}

impl<E: MediaEngine> PlayerController<E> {
    pub fn new(engine: E, store: PositionStore) -> Self {
        Self {
            engine,
            store,
            session: None,
            state: PlayerState::Stopped,
            output: AudioOutput::Default,
            prefetch_lead_ms: DEFAULT_PREFETCH_LEAD.as_millis() as u64,
            flush_error: None,
        }
    }

    /// How long before the end of a track the next one is queued.
    pub fn with_prefetch_lead(mut self, lead: Duration) -> Self {
        self.prefetch_lead_ms = lead.as_millis() as u64;
        self
    }

    /// Output mode the engine was started with.
    pub fn with_output(mut self, output: AudioOutput) -> Self {
        self.output = output;
        self
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.session.as_ref().map(|s| s.cursor)
    }

    pub fn playlist(&self) -> Option<&Playlist> {
        self.session.as_ref().map(|s| &s.playlist)
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.session.as_ref().and_then(Session::current)
    }

    pub fn output(&self) -> AudioOutput {
        self.output
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PositionStore {
        &mut self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// The last flush failure since the previous call, if any.
    pub fn take_flush_error(&mut self) -> Option<String> {
        self.flush_error.take()
    }

    /// Switch to `playlist`, resuming where it was left.
    ///
    /// The stored track is loaded paused; the stored offset is applied once
    /// the engine reports [`EngineEvent::FileLoaded`].
    pub async fn open(&mut self, playlist: Playlist) -> anyhow::Result<()> {
        self.close().await;

        self.store.set_track_count(&playlist.path, playlist.len());
        let record = self.store.get(&playlist.path);
        info!(
            "player: open {} ({} tracks) at #{} +{}ms",
            playlist.path.display(),
            playlist.len(),
            record.track_index,
            record.offset_ms
        );

        let mut session = Session::new(playlist, Cursor::at(record.track_index, record.offset_ms));
        let Some(track) = session.current().map(|t| t.location.clone()) else {
            self.session = Some(session);
            self.state = PlayerState::Stopped;
            self.flush();
            return Ok(());
        };
        session.pending_seek = (record.offset_ms > 0).then_some(record.offset_ms);
        self.session = Some(session);

        self.engine.load(&track, true).await?;
        self.state = PlayerState::Loaded;
        Ok(())
    }

    pub async fn play(&mut self) -> anyhow::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        match self.state {
            PlayerState::Playing => {}
            PlayerState::Loaded | PlayerState::Paused => {
                self.engine.play().await?;
                self.state = PlayerState::Playing;
            }
            PlayerState::Stopped => {
                let Some(track) = session.current().map(|t| t.location.clone()) else {
                    return Ok(());
                };
                let offset = session.cursor.offset_ms;
                session.pending_seek = (offset > 0).then_some(offset);
                session.file_loaded = false;
                session.queued = None;
                self.engine.load(&track, false).await?;
                self.state = PlayerState::Playing;
            }
        }
        Ok(())
    }

    /// Pause and flush the position.
    pub async fn pause(&mut self) -> anyhow::Result<()> {
        if self.state != PlayerState::Playing {
            return Ok(());
        }
        self.engine.pause().await?;
        self.state = PlayerState::Paused;
        self.sample_position().await;
        self.record();
        self.flush();
        Ok(())
    }

    pub async fn toggle(&mut self) -> anyhow::Result<()> {
        if self.state == PlayerState::Playing {
            self.pause().await
        } else {
            self.play().await
        }
    }

    /// Skip to the next track. No-op on the last one.
    pub async fn next(&mut self) -> anyhow::Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        let index = session.cursor.track_index;
        if index + 1 >= session.playlist.len() {
            return Ok(());
        }
        self.mark_current_finished();
        let keep_playing = self.state == PlayerState::Playing;
        self.change_track(index + 1, keep_playing).await
    }

    /// Go back one track; on the first track restart it instead.
    pub async fn prev(&mut self) -> anyhow::Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        let index = session.cursor.track_index;
        if index == 0 {
            return self.seek_to(0).await;
        }
        let keep_playing = self.state == PlayerState::Playing;
        self.change_track(index - 1, keep_playing).await
    }

    /// Play track `index` of the open playlist from its start.
    pub async fn jump_to(&mut self, index: usize) -> anyhow::Result<()> {
        let Some(session) = self.session.as_ref() else {
            bail!("no playlist is open");
        };
        if index >= session.playlist.len() {
            bail!(
                "track {} out of range ({} tracks)",
                index,
                session.playlist.len()
            );
        }
        self.change_track(index, true).await
    }

    /// Absolute seek. Negative offsets clamp to 0; seeking at or past the end
    /// of the track moves on to the next one.
    pub async fn seek_to(&mut self, offset_ms: i64) -> anyhow::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.playlist.is_empty() {
            return Ok(());
        }
        let target = offset_ms.max(0) as u64;
        if matches!(session.cursor.duration_ms, Some(d) if d > 0 && target >= d) {
            debug!("player: seek {}ms past end, advancing", target);
            return self.finish_current(false).await;
        }

        session.cursor.offset_ms = target;
        if !session.file_loaded || self.state == PlayerState::Stopped {
            session.pending_seek = Some(target);
        } else {
            self.engine.seek(target).await?;
        }
        let index = session.cursor.track_index;
        self.store
            .put(&session.playlist.path, index, target as i64);
        Ok(())
    }

    /// Seek relative to the cursor.
    pub async fn seek_by(&mut self, delta_ms: i64) -> anyhow::Result<()> {
        let Some(cursor) = self.cursor() else {
            return Ok(());
        };
        self.seek_to(cursor.offset_ms as i64 + delta_ms).await
    }

    /// Timer tick: sample the engine position into the cursor and the store
    /// cache, and queue the next track when the current one is close to its end.
    pub async fn poll(&mut self) -> anyhow::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if self.state == PlayerState::Stopped
            || !session.file_loaded
            || session.pending_seek.is_some()
        {
            return Ok(());
        }

        if let Some(position) = self.engine.position().await? {
            session.cursor.offset_ms = position;
        }
        if let Some(duration) = self.engine.duration().await? {
            session.cursor.duration_ms = Some(duration);
        }
        let cursor = session.cursor;
        self.store.put(
            &session.playlist.path,
            cursor.track_index,
            cursor.offset_ms as i64,
        );

        if self.state != PlayerState::Playing || session.queued.is_some() {
            return Ok(());
        }
        let Some(duration) = cursor.duration_ms else {
            return Ok(());
        };
        if duration.saturating_sub(cursor.offset_ms) > self.prefetch_lead_ms {
            return Ok(());
        }
        let next = cursor.track_index + 1;
        if let Some(track) = session.playlist.track(next) {
            debug!("player: pre-queue #{} {}", next, track.location);
            self.engine.enqueue(&track.location).await?;
            session.queued = Some(next);
        }
        Ok(())
    }

    pub async fn on_engine_event(&mut self, event: EngineEvent) -> anyhow::Result<()> {
        match event {
            EngineEvent::FileLoaded => {
                let Some(session) = self.session.as_mut() else {
                    return Ok(());
                };
                if session.file_loaded {
                    return Ok(());
                }
                // a file-loaded left over from an earlier load must not
                // take the restore seek meant for the current track
                let expected = session.current().map(|t| t.location.key());
                let holding = match self.engine.current_media().await {
                    Ok(media) => media,
                    Err(e) => {
                        debug!("player: current media unknown: {}", e);
                        None
                    }
                };
                if holding.is_none() || holding != expected {
                    debug!("player: ignoring file-loaded for {:?}", holding);
                    return Ok(());
                }
                session.file_loaded = true;
                if let Some(offset) = session.pending_seek.take() {
                    debug!("player: restore seek to {}ms", offset);
                    self.engine.seek(offset).await?;
                }
                Ok(())
            }
            EngineEvent::TrackEnded => {
                let Some(session) = self.session.as_ref() else {
                    return Ok(());
                };
                if self.state == PlayerState::Stopped {
                    return Ok(());
                }
                // a track that has not reported FileLoaded cannot have ended;
                // this is the end of a track that was already replaced
                if !session.file_loaded {
                    debug!("player: ignoring end of a replaced track");
                    return Ok(());
                }
                self.finish_current(true).await
            }
            EngineEvent::EngineLost => {
                warn!("player: engine lost");
                self.record();
                self.flush();
                self.state = PlayerState::Stopped;
                if let Some(session) = self.session.as_mut() {
                    session.file_loaded = false;
                    session.queued = None;
                }
                Ok(())
            }
        }
    }

    /// Switch audio output. Returns false when `output` is already active.
    pub async fn set_audio_output(&mut self, output: AudioOutput) -> anyhow::Result<bool> {
        if output == self.output {
            return Ok(false);
        }
        self.engine.set_audio_output(output).await?;
        info!("player: audio output {} -> {}", self.output, output);
        self.output = output;
        Ok(true)
    }

    /// Flush the open playlist and unload it.
    pub async fn close(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.sample_position().await;
        self.record();
        self.flush();
        if let Err(e) = self.engine.clear_queue().await {
            warn!("player: clear queue failed: {}", e);
        }
        if let Err(e) = self.engine.stop().await {
            warn!("player: stop failed: {}", e);
        }
        if let Some(session) = self.session.take() {
            debug!("player: closed {}", session.playlist.path.display());
        }
        self.state = PlayerState::Stopped;
    }

    /// Final flush, then stop the engine.
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.sample_position().await;
        self.record();
        self.flush();
        self.state = PlayerState::Stopped;
        self.engine.shutdown().await
    }

    /// Current track is done: move to the next one, or stop at the end.
    /// `engine_advanced` is set when the engine itself moved on to the
    /// queued track.
    async fn finish_current(&mut self, engine_advanced: bool) -> anyhow::Result<()> {
        self.mark_current_finished();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let next = session.cursor.track_index + 1;

        if engine_advanced && session.queued == Some(next) {
            session.cursor = Cursor::at(next, 0);
            session.queued = None;
            session.pending_seek = None;
            session.file_loaded = false;
            self.state = PlayerState::Playing;
            self.store.put(&session.playlist.path, next, 0);
            self.flush();
            return Ok(());
        }

        if next < session.playlist.len() {
            let keep_playing = self.state == PlayerState::Playing;
            return self.change_track(next, keep_playing).await;
        }

        info!("player: end of {}", session.playlist.path.display());
        let last = session.cursor.track_index;
        session.cursor = Cursor::at(last, 0);
        session.pending_seek = None;
        session.file_loaded = false;
        session.queued = None;
        self.store.put(&session.playlist.path, last, 0);
        self.state = PlayerState::Stopped;
        self.flush();
        if let Err(e) = self.engine.stop().await {
            warn!("player: stop failed: {}", e);
        }
        Ok(())
    }

    async fn change_track(&mut self, index: usize, play: bool) -> anyhow::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let Some(track) = session.playlist.track(index).map(|t| t.location.clone()) else {
            return Ok(());
        };
        session.cursor = Cursor::at(index, 0);
        session.pending_seek = None;
        session.file_loaded = false;
        session.queued = None;
        self.store.put(&session.playlist.path, index, 0);
        self.flush();

        debug!("player: track #{} {}", index, track);
        self.engine.clear_queue().await?;
        self.load_current(&track, play).await
    }

    async fn load_current(&mut self, track: &TrackRef, play: bool) -> anyhow::Result<()> {
        match self.engine.load(track, !play).await {
            Ok(()) => {
                self.state = if play {
                    PlayerState::Playing
                } else {
                    PlayerState::Loaded
                };
                Ok(())
            }
            Err(e) => {
                self.state = PlayerState::Stopped;
                Err(e)
            }
        }
    }

    fn mark_current_finished(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if let Some(track) = session.current() {
            self.store
                .mark_finished(&session.playlist.path, &track.location.key());
        }
    }

    /// Refresh the cursor offset from the engine when it is meaningful.
    async fn sample_position(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.file_loaded || session.pending_seek.is_some() {
            return;
        }
        match self.engine.position().await {
            Ok(Some(position)) => session.cursor.offset_ms = position,
            Ok(None) => {}
            Err(e) => debug!("player: position unavailable: {}", e),
        }
    }

    fn record(&mut self) {
        if let Some(session) = self.session.as_ref() {
            self.store.put(
                &session.playlist.path,
                session.cursor.track_index,
                session.cursor.offset_ms as i64,
            );
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.store.flush() {
            warn!("player: saving positions failed, will retry: {}", e);
            self.flush_error = Some(e.to_string());
        }
    }
}
