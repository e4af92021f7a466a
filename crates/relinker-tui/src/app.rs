//! App — component-based event loop around the player controller.
//!
//! Architecture:
//! - `App` owns all components and `AppState` (shared read-only data for components).
//! - A `tokio::mpsc` channel carries `AppMessage` events in from background tasks.
//! - Engine events arrive on their own channel; position polling is an interval arm.
//! - Components return `Vec<Action>`; App dispatches each Action to the controller.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    widgets::Block,
    Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use relinker_core::config::Config;
use relinker_core::controller::PlayerController;
use relinker_core::engine::{EngineEvent, MediaEngine};
use relinker_core::platform;
use relinker_core::playlist::{self, TrackRef};
use relinker_core::positions::PositionStore;
use relinker_core::registry::{Registry, RegistryEntry};
use relinker_core::scanner;
use relinker_core::tags::{self, CoverCache, LoftyTagReader};

use crate::{
    action::{Action, ComponentId},
    app_state::{AppState, NowPlaying as NowPlayingInfo, TrackView},
    component::Component,
    components::{
        help_overlay::HelpOverlay, now_playing::NowPlaying, playlist_list::PlaylistList,
        track_list::TrackList,
    },
    focus::FocusRing,
    mpv::{self, MpvEngine},
    widgets::{
        cover_art,
        status_bar::{self, InputMode},
        toast::{Severity, ToastManager},
    },
};

// ── Internal event bus ────────────────────────────────────────────────────────

enum AppMessage {
    Event(Event),
    /// Tags and cover art of a track, read off the UI task.
    TrackMeta {
        key: String,
        title: Option<String>,
        cover: Option<Arc<RgbImage>>,
    },
    /// A folder scan finished; `found` are canonical playlist paths.
    ScanFinished { root: PathBuf, found: Vec<PathBuf> },
}

/// An engine that died sooner than this after starting is not restarted.
const MIN_ENGINE_LIFETIME: Duration = Duration::from_secs(10);

/// Screen areas of each pane (updated each draw, used for mouse hit-testing).
#[derive(Default, Clone, Copy)]
struct PaneAreas {
    playlists: Rect,
    tracks: Rect,
    now_playing: Rect,
}

pub struct App {
    config: Config,
    /// Where settings changed from the UI are written back.
    config_path: PathBuf,
    state: AppState,
    player: Option<PlayerController<MpvEngine>>,
    /// Holds the position store while no engine is running.
    idle_store: Option<PositionStore>,
    registry: Registry,
    covers: CoverCache,
    /// Track whose tags and cover are shown or being read.
    meta_for: Option<String>,
    meta_title: Option<String>,
    engine_events: Option<mpsc::Sender<EngineEvent>>,
    engine_started: Option<Instant>,
    tx: Option<mpsc::Sender<AppMessage>>,

    playlist_list: PlaylistList,
    track_list: TrackList,
    now_playing: NowPlaying,
    help_overlay: HelpOverlay,
    focus: FocusRing,
    toast: ToastManager,
    pane_areas: PaneAreas,
    should_quit: bool,
}

impl App {
    pub fn new(config: Config, registry: Registry) -> Self {
        let mut state = AppState::new(config.ui.theme);
        state.output = config.engine.audio_output;
        state.seek_step_ms = config.playback.seek_step_secs.saturating_mul(1000);
        state.fine_seek_step_ms = config.playback.fine_seek_step_secs.saturating_mul(1000);
        state.playlists = registry.entries().to_vec();

        let idle_store = PositionStore::load(&config.paths.positions_file);
        let covers = CoverCache::new(&config.paths.art_cache_dir);

        let mut app = Self {
            config,
            config_path: Config::config_path(),
            state,
            player: None,
            idle_store: Some(idle_store),
            registry,
            covers,
            meta_for: None,
            meta_title: None,
            engine_events: None,
            engine_started: None,
            tx: None,
            playlist_list: PlaylistList::new(),
            track_list: TrackList::new(),
            now_playing: NowPlaying::new(),
            help_overlay: HelpOverlay::new(),
            focus: FocusRing::new(vec![
                ComponentId::PlaylistList,
                ComponentId::TrackList,
                ComponentId::NowPlaying,
            ]),
            toast: ToastManager::new(),
            pane_areas: PaneAreas::default(),
            should_quit: false,
        };
        app.refresh_playlists();
        app
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        debug!("run(): enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        debug!("run(): terminal created, size={:?}", terminal.size());

        let (tx, mut rx) = mpsc::channel::<AppMessage>(256);
        self.tx = Some(tx.clone());
        let (engine_tx, mut engine_rx) = mpsc::channel::<EngineEvent>(64);
        self.engine_events = Some(engine_tx);

        self.start_engine().await;

        // ── Background task: keyboard/mouse events ────────────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // ── Periodic timers ───────────────────────────────────────────────────
        let poll_ms = self.config.playback.poll_interval_ms.max(50);
        let mut poll = tokio::time::interval(Duration::from_millis(poll_ms));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // toast expiry + spinner animation
        let mut ui_tick = tokio::time::interval(Duration::from_millis(100));
        ui_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // ── Main loop ─────────────────────────────────────────────────────────
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    needs_redraw = self.handle_message(msg).await;
                }

                Some(ev) = engine_rx.recv() => {
                    self.on_engine_event(ev).await;
                    needs_redraw = true;
                }

                _ = poll.tick() => {
                    needs_redraw = self.poll_player().await;
                }

                _ = ui_tick.tick() => {
                    self.toast.tick();
                    let tick_actions: Vec<Action> = {
                        let s = &self.state;
                        let mut all = Vec::new();
                        all.extend(self.playlist_list.tick(s));
                        all.extend(self.track_list.tick(s));
                        all.extend(self.now_playing.tick(s));
                        all
                    };
                    for action in tick_actions {
                        self.dispatch(action).await;
                    }
                    needs_redraw = !self.toast.is_empty();
                }
            }
        }

        // ── Teardown ──────────────────────────────────────────────────────────
        self.shutdown().await;
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        Ok(())
    }

    // ── Engine lifecycle ──────────────────────────────────────────────────────

    async fn spawn_engine(&mut self) -> anyhow::Result<MpvEngine> {
        let binary = platform::find_mpv_binary(self.config.mpv_path()).ok_or_else(|| {
            anyhow::anyhow!(
                "mpv not found (set {} or engine.mpv_path)",
                platform::MPV_PATH_ENV
            )
        })?;
        let events = self
            .engine_events
            .clone()
            .ok_or_else(|| anyhow::anyhow!("engine event channel not set up"))?;
        info!("starting mpv from {}", binary.display());
        let engine = MpvEngine::start(&binary, self.state.output, events).await?;
        self.engine_started = Some(Instant::now());
        Ok(engine)
    }

    async fn start_engine(&mut self) {
        match self.spawn_engine().await {
            Ok(engine) => {
                let store = self
                    .idle_store
                    .take()
                    .unwrap_or_else(|| PositionStore::load(&self.config.paths.positions_file));
                let lead = Duration::from_secs(self.config.engine.prefetch_lead_secs);
                self.player = Some(
                    PlayerController::new(engine, store)
                        .with_prefetch_lead(lead)
                        .with_output(self.state.output),
                );
                self.state.engine_available = true;
            }
            Err(e) => {
                error!("media engine unavailable: {:#}", e);
                self.state.engine_available = false;
                self.toast.error(format!("{}; playback disabled", e));
            }
        }
    }

    /// Replace a dead mpv with a fresh one, unless it died right after starting.
    async fn restart_engine(&mut self) {
        let short_lived = self
            .engine_started
            .is_some_and(|t| t.elapsed() < MIN_ENGINE_LIFETIME);
        if short_lived {
            error!("mpv exited again shortly after start; not restarting");
            self.state.engine_available = false;
            self.toast.error("mpv keeps exiting; playback disabled");
            return;
        }
        match self.spawn_engine().await {
            Ok(engine) => {
                if let Some(player) = self.player.as_mut() {
                    let mut old = std::mem::replace(player.engine_mut(), engine);
                    if let Err(e) = old.shutdown().await {
                        debug!("old mpv shutdown: {:#}", e);
                    }
                }
                self.toast.warning("mpv restarted");
            }
            Err(e) => {
                error!("mpv restart failed: {:#}", e);
                self.state.engine_available = false;
                self.toast.error(format!("mpv restart failed: {}", e));
            }
        }
    }

    async fn on_engine_event(&mut self, event: EngineEvent) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        let result = player.on_engine_event(event).await;
        self.report("playback", result);
        if event == EngineEvent::EngineLost {
            warn!("mpv connection lost");
            self.restart_engine().await;
        }
        self.sync_player();
    }

    async fn poll_player(&mut self) -> bool {
        let Some(player) = self.player.as_mut() else {
            return false;
        };
        if !player.state().is_playing() {
            return false;
        }
        if let Err(e) = player.poll().await {
            debug!("poll: {:#}", e);
        }
        self.sync_player();
        true
    }

    async fn shutdown(&mut self) {
        info!("shutting down");
        if let Some(player) = self.player.as_mut() {
            if let Err(e) = player.shutdown().await {
                warn!("shutdown: {:#}", e);
            }
        } else if let Some(store) = self.idle_store.as_mut() {
            if let Err(e) = store.flush() {
                warn!("positions: {}", e);
            }
        }
    }

    // ── Message handling ──────────────────────────────────────────────────────

    async fn handle_message(&mut self, msg: AppMessage) -> bool {
        match msg {
            AppMessage::Event(Event::Key(key)) => {
                if key.kind == KeyEventKind::Release {
                    return false;
                }
                let actions = self.handle_key(key);
                for action in actions {
                    self.dispatch(action).await;
                }
                self.state.input_mode = self.focused_input_mode();
                true
            }
            AppMessage::Event(Event::Mouse(mouse)) => {
                let actions = self.handle_mouse(mouse);
                let redraw = !actions.is_empty()
                    || matches!(
                        mouse.kind,
                        MouseEventKind::Down(_) | MouseEventKind::ScrollUp | MouseEventKind::ScrollDown
                    );
                for action in actions {
                    self.dispatch(action).await;
                }
                redraw
            }
            AppMessage::Event(Event::Resize(_, _)) => true,
            AppMessage::Event(_) => false,
            AppMessage::TrackMeta { key, title, cover } => {
                if self.meta_for.as_deref() != Some(key.as_str()) {
                    return false;
                }
                self.meta_title = title;
                self.state.cover = cover;
                self.sync_player();
                true
            }
            AppMessage::ScanFinished { root, found } => {
                let added = self
                    .registry
                    .extend(found.iter().cloned().map(RegistryEntry::for_playlist));
                info!("scan of {}: {} found, {} new", root.display(), found.len(), added);
                if added > 0 {
                    self.save_registry();
                    self.toast.resolve_spinner(
                        Severity::Success,
                        format!("{} new playlist(s) from {}", added, root.display()),
                        Duration::from_secs(3),
                    );
                } else {
                    self.toast.resolve_spinner(
                        Severity::Info,
                        format!("no new playlists in {}", root.display()),
                        Duration::from_secs(3),
                    );
                }
                self.refresh_playlists();
                true
            }
        }
    }

    // ── Key handling ──────────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return vec![Action::Quit];
        }

        // Help overlay captures all keys when visible
        if self.help_overlay.visible {
            let actions = self.help_overlay.handle_key(key, &self.state);
            if actions.is_empty() {
                return vec![Action::ToggleHelp];
            }
            return actions;
        }

        // A pane with an open prompt or filter gets every key
        if self.focused_input_mode() != InputMode::Normal {
            return self.focused_handle_key(key);
        }

        let fine = key.modifiers.contains(KeyModifiers::SHIFT);
        let step = |fine: bool| {
            if fine {
                self.state.fine_seek_step_ms as i64
            } else {
                self.state.seek_step_ms as i64
            }
        };
        match key.code {
            KeyCode::Char('q') => return vec![Action::Quit],
            KeyCode::Char('?') => return vec![Action::ToggleHelp],
            KeyCode::Tab => return vec![Action::FocusNext],
            KeyCode::BackTab => return vec![Action::FocusPrev],
            KeyCode::Char(' ') => return vec![Action::TogglePause],
            KeyCode::Char('n') => return vec![Action::Next],
            KeyCode::Char('p') => return vec![Action::Prev],
            // Shift+, and Shift+. arrive as < and > on most layouts
            KeyCode::Char(',') => return vec![Action::SeekRelative(-step(fine))],
            KeyCode::Char('.') => return vec![Action::SeekRelative(step(fine))],
            KeyCode::Char('<') => return vec![Action::SeekRelative(-step(true))],
            KeyCode::Char('>') => return vec![Action::SeekRelative(step(true))],
            KeyCode::Char('t') => return vec![Action::ToggleTheme],
            KeyCode::Char('o') => return vec![Action::CycleOutput],
            KeyCode::Char('1') => return vec![Action::FocusPane(ComponentId::PlaylistList)],
            KeyCode::Char('2') => return vec![Action::FocusPane(ComponentId::TrackList)],
            KeyCode::Char('3') => return vec![Action::FocusPane(ComponentId::NowPlaying)],
            _ => {}
        }

        self.focused_handle_key(key)
    }

    fn focused_handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        let s = &self.state;
        match self.focus.current() {
            Some(ComponentId::PlaylistList) => self.playlist_list.handle_key(key, s),
            Some(ComponentId::TrackList) => self.track_list.handle_key(key, s),
            Some(ComponentId::NowPlaying) => self.now_playing.handle_key(key, s),
            Some(ComponentId::HelpOverlay) => self.help_overlay.handle_key(key, s),
            None => vec![],
        }
    }

    fn focused_input_mode(&self) -> InputMode {
        match self.focus.current() {
            Some(ComponentId::PlaylistList) => self.playlist_list.input_mode(),
            Some(ComponentId::TrackList) => self.track_list.input_mode(),
            Some(ComponentId::NowPlaying) => self.now_playing.input_mode(),
            _ => InputMode::Normal,
        }
    }

    // ── Mouse handling ────────────────────────────────────────────────────────

    fn handle_mouse(&mut self, event: MouseEvent) -> Vec<Action> {
        let is_click = matches!(
            event.kind,
            MouseEventKind::Down(_) | MouseEventKind::ScrollUp | MouseEventKind::ScrollDown
        );
        if !is_click || self.help_overlay.visible {
            return vec![];
        }
        // a prompt must be answered before the pointer goes elsewhere
        if self.focused_input_mode() != InputMode::Normal {
            return vec![];
        }

        let col = event.column;
        let row = event.row;

        fn hit(r: Rect, col: u16, row: u16) -> bool {
            r.width > 0
                && r.height > 0
                && col >= r.x
                && col < r.x + r.width
                && row >= r.y
                && row < r.y + r.height
        }

        let areas = self.pane_areas;
        let s = &self.state;

        // Dispatch to the pane under the pointer; focus follows clicks.
        macro_rules! click_pane {
            ($id:expr, $component:expr, $area:expr) => {{
                let mut actions = $component.handle_mouse(event, $area, s);
                if matches!(event.kind, MouseEventKind::Down(_)) && !self.focus.is_focused($id) {
                    actions.insert(0, Action::FocusPane($id));
                }
                return actions;
            }};
        }

        if hit(areas.now_playing, col, row) {
            click_pane!(ComponentId::NowPlaying, self.now_playing, areas.now_playing);
        }
        if hit(areas.playlists, col, row) {
            click_pane!(ComponentId::PlaylistList, self.playlist_list, areas.playlists);
        }
        if hit(areas.tracks, col, row) {
            click_pane!(ComponentId::TrackList, self.track_list, areas.tracks);
        }

        vec![]
    }

    // ── Action dispatcher ─────────────────────────────────────────────────────

    async fn dispatch(&mut self, action: Action) {
        // Broadcast to all components first
        let secondary: Vec<Action> = {
            let s = &self.state;
            let mut out = Vec::new();
            out.extend(self.playlist_list.on_action(&action, s));
            out.extend(self.track_list.on_action(&action, s));
            out.extend(self.now_playing.on_action(&action, s));
            out.extend(self.help_overlay.on_action(&action, s));
            out
        };

        self.apply_action(action).await;

        // depth-limited to one level
        for a in secondary {
            self.apply_action(a).await;
        }
    }

    async fn apply_action(&mut self, action: Action) {
        debug!("apply_action: {:?}", action);
        match action {
            // ── Playback ──────────────────────────────────────────────────────
            Action::TogglePause => {
                let has_session = self.player.as_ref().is_some_and(|p| p.playlist().is_some());
                if !has_session {
                    // nothing open yet: start the playlist on screen
                    if let Some(path) = self.state.tracks.as_ref().map(|v| v.playlist.clone()) {
                        self.open_playlist(&path, None).await;
                    }
                    return;
                }
                let result = match self.player_mut() {
                    Some(p) => p.toggle().await,
                    None => return,
                };
                self.report("play/pause", result);
            }
            Action::Next => {
                let result = match self.player_mut() {
                    Some(p) => p.next().await,
                    None => return,
                };
                self.report("next", result);
            }
            Action::Prev => {
                let result = match self.player_mut() {
                    Some(p) => p.prev().await,
                    None => return,
                };
                self.report("previous", result);
            }
            Action::SeekRelative(delta_ms) => {
                let result = match self.player_mut() {
                    Some(p) => p.seek_by(delta_ms).await,
                    None => return,
                };
                self.report("seek", result);
            }
            Action::SeekTo(offset_ms) => {
                let result = match self.player_mut() {
                    Some(p) => p.seek_to(i64::try_from(offset_ms).unwrap_or(i64::MAX)).await,
                    None => return,
                };
                self.report("seek", result);
            }
            Action::OpenPlaylist(path) => self.open_playlist(&path, None).await,
            Action::PlayTrack(path, index) => self.open_playlist(&path, Some(index)).await,

            // ── Playlists ─────────────────────────────────────────────────────
            Action::SelectPlaylist(path) => self.show_playlist(&path),
            Action::RenamePlaylist(path, name) => {
                if self.registry.rename(&path, &name) {
                    self.save_registry();
                    self.refresh_playlists();
                }
            }
            Action::DeletePlaylist(path) => {
                let is_open = self
                    .player
                    .as_ref()
                    .and_then(|p| p.playlist())
                    .is_some_and(|pl| pl.path == path);
                if is_open {
                    if let Some(player) = self.player.as_mut() {
                        player.close().await;
                    }
                }
                if let Some(store) = self.store_mut() {
                    store.remove(&path);
                    if let Err(e) = store.flush() {
                        warn!("positions: {}", e);
                    }
                }
                if let Some(entry) = self.registry.remove(&path) {
                    self.save_registry();
                    self.toast.info(format!("removed {}", entry.name));
                }
                self.refresh_playlists();
            }
            Action::AddFolder(dir) => self.scan_folder(dir),

            // ── Settings ──────────────────────────────────────────────────────
            Action::CycleOutput => {
                let next = mpv::next_supported_output(self.state.output);
                if next == self.state.output {
                    return;
                }
                let result = match self.player.as_mut() {
                    Some(p) => p.set_audio_output(next).await.map(|_| ()),
                    None => Ok(()),
                };
                match result {
                    Ok(()) => {
                        self.state.output = next;
                        self.config.engine.audio_output = next;
                        self.save_config();
                        self.toast.info(format!("audio output: {}", next));
                    }
                    Err(e) => {
                        warn!("audio output {}: {:#}", next, e);
                        self.toast.error(format!("audio output {}: {}", next, e));
                    }
                }
            }
            Action::ToggleTheme => {
                let theme = self.state.theme.toggled();
                self.state.set_theme(theme);
                self.config.ui.theme = theme;
                self.save_config();
            }

            // ── Navigation ────────────────────────────────────────────────────
            Action::FocusNext => {
                self.focus.next();
            }
            Action::FocusPrev => {
                self.focus.prev();
            }
            Action::FocusPane(id) => self.focus.set(id),

            // ── UI ────────────────────────────────────────────────────────────
            Action::ToggleHelp => {}
            Action::CopyToClipboard(text) => {
                match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text.clone())) {
                    Ok(()) => {
                        let display = if text.chars().count() > 40 {
                            format!("…{}", tail(&text, 40))
                        } else {
                            text.clone()
                        };
                        self.toast.success(format!("copied: {}", display));
                    }
                    Err(e) => {
                        warn!("clipboard error: {}", e);
                        self.toast.error(format!("clipboard error: {}", e));
                    }
                }
            }
            Action::Quit => self.should_quit = true,
        }
        self.sync_player();
    }

    // ── Playlist helpers ──────────────────────────────────────────────────────

    fn player_mut(&mut self) -> Option<&mut PlayerController<MpvEngine>> {
        if self.player.is_none() {
            self.toast.warning("playback disabled: mpv is not available");
        }
        self.player.as_mut()
    }

    fn store(&self) -> Option<&PositionStore> {
        self.player
            .as_ref()
            .map(|p| p.store())
            .or(self.idle_store.as_ref())
    }

    fn store_mut(&mut self) -> Option<&mut PositionStore> {
        match self.player.as_mut() {
            Some(p) => Some(p.store_mut()),
            None => self.idle_store.as_mut(),
        }
    }

    /// Open `path` (unless it is already the open playlist) and play, either
    /// from its resume point or from track `index`.
    async fn open_playlist(&mut self, path: &Path, index: Option<usize>) {
        if self.player_mut().is_none() {
            return;
        }
        let already_open = self
            .player
            .as_ref()
            .and_then(|p| p.playlist())
            .is_some_and(|pl| pl.path == path);

        if !already_open {
            let parsed = match playlist::load(path) {
                Ok(pl) => pl,
                Err(e) => {
                    warn!("open {}: {}", path.display(), e);
                    self.toast.error(format!("cannot open playlist: {}", e));
                    return;
                }
            };
            if parsed.is_empty() {
                self.toast.warning("playlist has no tracks");
            }
            let result = match self.player.as_mut() {
                Some(p) => p.open(parsed).await,
                None => return,
            };
            if let Err(e) = result {
                self.report("open", Err(e));
                return;
            }
        }

        let result = match self.player.as_mut() {
            Some(p) => {
                let at = p.cursor().map(|c| c.track_index);
                match index {
                    Some(i) if at != Some(i) => p.jump_to(i).await,
                    _ => p.play().await,
                }
            }
            None => return,
        };
        self.report("play", result);
        self.playlist_list.select_path(path);
        self.show_playlist(path);
    }

    /// Parse `path` into the track pane.
    fn show_playlist(&mut self, path: &Path) {
        let open = self
            .player
            .as_ref()
            .and_then(|p| p.playlist())
            .filter(|pl| pl.path == path)
            .cloned();
        let parsed = match open {
            Some(pl) => Ok(pl),
            None => playlist::load(path),
        };
        self.state.tracks = match parsed {
            Ok(pl) => {
                // the file may have shrunk since its resume point was saved
                if let Some(store) = self.store_mut() {
                    store.set_track_count(&pl.path, pl.len());
                }
                let (resume, finished) = match self.store() {
                    Some(store) => (store.get(&pl.path), store.finished(&pl.path)),
                    None => Default::default(),
                };
                Some(TrackView::build(&pl, resume, &finished))
            }
            Err(e) => {
                warn!("show {}: {}", path.display(), e);
                self.toast.warning(format!("cannot read playlist: {}", e));
                None
            }
        };
        self.track_list.sync(&self.state);
    }

    /// Re-read the registry into the playlist pane and follow its selection.
    fn refresh_playlists(&mut self) {
        self.state.playlists = self.registry.entries().to_vec();
        self.playlist_list.sync(&self.state);
        match self.playlist_list.selected_path() {
            Some(path) => {
                let shown = self.state.tracks.as_ref().map(|v| v.playlist.as_path());
                if shown != Some(path.as_path()) {
                    self.show_playlist(&path);
                }
            }
            None => {
                self.state.tracks = None;
                self.track_list.sync(&self.state);
            }
        }
    }

    fn scan_folder(&mut self, root: PathBuf) {
        if !root.is_dir() {
            self.toast.error(format!("not a directory: {}", root.display()));
            return;
        }
        let Some(tx) = self.tx.clone() else {
            return;
        };
        self.toast.spinner(format!("scanning {}", root.display()));
        tokio::task::spawn_blocking(move || {
            let found: Vec<PathBuf> = scanner::scan(&root).iter().collect();
            let _ = tx.blocking_send(AppMessage::ScanFinished { root, found });
        });
    }

    fn save_registry(&mut self) {
        if let Err(e) = self.registry.save() {
            warn!("registry: {}", e);
            self.toast.error(format!("could not save playlists: {}", e));
        }
    }

    fn save_config(&mut self) {
        if let Err(e) = self.config.save_to(&self.config_path) {
            warn!("config: {:#}", e);
            self.toast.warning(format!("could not save config: {}", e));
        }
    }

    fn report(&mut self, what: &str, result: anyhow::Result<()>) {
        if let Err(e) = result {
            warn!("{}: {:#}", what, e);
            self.toast.error(format!("{}: {}", what, e));
        }
    }

    // ── Player → AppState ─────────────────────────────────────────────────────

    /// Copy controller state into `AppState` and start reading tags for a
    /// new current track.
    fn sync_player(&mut self) {
        let Some(player) = self.player.as_mut() else {
            self.state.now = None;
            return;
        };
        if let Some(err) = player.take_flush_error() {
            self.toast.warning(format!("could not save position: {}", err));
        }
        let player = &*player;

        let current = player.current_track().map(|t| t.location.clone());
        self.state.now = match (player.playlist(), player.cursor(), player.current_track()) {
            (Some(pl), Some(cursor), Some(track)) => {
                let key = track.location.key();
                let title = match (&self.meta_for, &self.meta_title) {
                    (Some(k), Some(t)) if *k == key => t.clone(),
                    _ => track
                        .title
                        .clone()
                        .unwrap_or_else(|| track.location.file_name()),
                };
                Some(NowPlayingInfo {
                    playlist: pl.path.clone(),
                    playlist_name: self
                        .registry
                        .get(&pl.path)
                        .map(|e| e.name.clone())
                        .unwrap_or_else(|| pl.default_name()),
                    track_index: cursor.track_index,
                    track_count: pl.len(),
                    title,
                    state: player.state(),
                    offset_ms: cursor.offset_ms,
                    duration_ms: cursor
                        .duration_ms
                        .or(track.duration_secs.map(|s| s * 1000)),
                })
            }
            _ => None,
        };

        if let Some(view) = self.state.tracks.as_mut() {
            let store = player.store();
            let changed =
                view.update_markers(store.get(&view.playlist), &store.finished(&view.playlist));
            if changed {
                self.track_list.sync(&self.state);
            }
        }

        self.request_track_meta(current);
    }

    fn request_track_meta(&mut self, track: Option<TrackRef>) {
        let key = track.as_ref().map(|t| t.key());
        if key == self.meta_for {
            return;
        }
        self.meta_for = key.clone();
        self.meta_title = None;
        self.state.cover = None;

        let (Some(key), Some(TrackRef::Path(path)), Some(tx)) = (key, track, self.tx.clone())
        else {
            return;
        };
        let covers = self.covers.clone();
        tokio::task::spawn_blocking(move || {
            let (info, art) = covers.fetch_with_info(&LoftyTagReader, &path);
            let fallback = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let title = info
                .as_ref()
                .filter(|i| i.title.is_some())
                .map(|i| tags::display_title(Some(i), &fallback));
            let cover = art
                .and_then(|art| cover_art::load_thumbnail(&art))
                .map(Arc::new);
            let _ = tx.blocking_send(AppMessage::TrackMeta { key, title, cover });
        });
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        let area = frame.area();
        frame.render_widget(Block::default().style(self.state.palette.style_base()), area);

        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(7),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(outer[1]);

        self.pane_areas = PaneAreas {
            now_playing: outer[0],
            playlists: body[0],
            tracks: body[1],
        };

        let s = &self.state;
        self.now_playing.draw(
            frame,
            outer[0],
            self.focus.is_focused(ComponentId::NowPlaying),
            s,
        );
        self.playlist_list.draw(
            frame,
            body[0],
            self.focus.is_focused(ComponentId::PlaylistList),
            s,
        );
        self.track_list.draw(
            frame,
            body[1],
            self.focus.is_focused(ComponentId::TrackList),
            s,
        );

        status_bar::draw_keys_bar(
            frame,
            outer[2],
            s.input_mode,
            s.output,
            s.engine_available,
            &s.palette,
        );

        if self.help_overlay.visible {
            self.help_overlay.draw(frame, area, false, s);
        }

        self.toast.draw(frame, area, &s.palette);
    }
}

/// Last `n` characters of `text`.
fn tail(text: &str, n: usize) -> String {
    let skip = text.chars().count().saturating_sub(n);
    text.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relinker_core::config::ThemeMode;

    fn app(tmp: &tempfile::TempDir) -> App {
        let mut config = Config::default();
        config.paths.positions_file = tmp.path().join("positions.toml");
        config.paths.registry_file = tmp.path().join("playlists.json");
        config.paths.art_cache_dir = tmp.path().join("art");
        let mut registry = Registry::in_memory();
        registry.add(RegistryEntry {
            path: tmp.path().join("mix.m3u8"),
            name: "mix".to_string(),
        });
        let mut app = App::new(config, registry);
        app.config_path = tmp.path().join("config.toml");
        app
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn global_keys_map_to_actions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut app = app(&tmp);
        assert_eq!(app.handle_key(key(KeyCode::Char(' '))), vec![Action::TogglePause]);
        assert_eq!(app.handle_key(key(KeyCode::Char('n'))), vec![Action::Next]);
        assert_eq!(
            app.handle_key(key(KeyCode::Char(','))),
            vec![Action::SeekRelative(-5_000)]
        );
        assert_eq!(
            app.handle_key(KeyEvent::new(KeyCode::Char('.'), KeyModifiers::SHIFT)),
            vec![Action::SeekRelative(1_000)]
        );
        assert_eq!(
            app.handle_key(key(KeyCode::Char('>'))),
            vec![Action::SeekRelative(1_000)]
        );
        assert_eq!(app.handle_key(key(KeyCode::Char('t'))), vec![Action::ToggleTheme]);
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), vec![Action::Quit]);
    }

    #[test]
    fn open_prompt_swallows_global_keys() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut app = app(&tmp);
        assert!(app.handle_key(key(KeyCode::Char('/'))).is_empty());
        assert_eq!(app.focused_input_mode(), InputMode::Filter);
        assert!(app.handle_key(key(KeyCode::Char('q'))).is_empty());
        assert!(app.handle_key(key(KeyCode::Char(' '))).is_empty());
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.focused_input_mode(), InputMode::Normal);
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), vec![Action::Quit]);
    }

    #[tokio::test]
    async fn help_overlay_captures_keys_until_closed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut app = app(&tmp);
        app.dispatch(Action::ToggleHelp).await;
        assert!(app.help_overlay.visible);
        assert_eq!(app.handle_key(key(KeyCode::Char('n'))), vec![Action::ToggleHelp]);
        app.dispatch(Action::ToggleHelp).await;
        assert!(!app.help_overlay.visible);
    }

    #[tokio::test]
    async fn playback_without_engine_warns_instead_of_failing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut app = app(&tmp);
        app.dispatch(Action::Next).await;
        app.dispatch(Action::OpenPlaylist(tmp.path().join("mix.m3u8"))).await;
        assert!(app.state.now.is_none());
        assert!(!app.toast.is_empty());
    }

    #[tokio::test]
    async fn showing_a_shrunk_playlist_clamps_its_resume_point() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut app = app(&tmp);
        let list = tmp.path().join("short.m3u8");
        std::fs::write(&list, "#EXTM3U\n/music/a.flac\n/music/b.flac\n").unwrap();
        let list = std::fs::canonicalize(&list).unwrap();
        app.idle_store.as_mut().unwrap().put(&list, 4, 30_000);

        app.dispatch(Action::SelectPlaylist(list.clone())).await;

        let view = app.state.tracks.as_ref().unwrap();
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.resume.track_index, 1);
        assert_eq!(view.resume.offset_ms, 0);
        assert_eq!(app.store().unwrap().get(&list).track_index, 1);
    }

    #[tokio::test]
    async fn rename_and_delete_update_the_list() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut app = app(&tmp);
        let path = tmp.path().join("mix.m3u8");
        app.dispatch(Action::RenamePlaylist(path.clone(), "Mixtape".to_string()))
            .await;
        assert_eq!(app.state.playlist_name(&path), Some("Mixtape"));
        app.dispatch(Action::DeletePlaylist(path.clone())).await;
        assert!(app.state.playlists.is_empty());
        assert!(app.state.tracks.is_none());
    }

    #[tokio::test]
    async fn theme_toggle_switches_palette() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut app = app(&tmp);
        assert_eq!(app.state.theme, ThemeMode::Dark);
        app.dispatch(Action::ToggleTheme).await;
        assert_eq!(app.state.theme, ThemeMode::Light);
        assert_eq!(app.state.palette, crate::theme::Palette::LIGHT);
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
    }
}
