//! PlaylistList component — left pane listing the saved playlists.

use std::path::{Path, PathBuf};

use ratatui::crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph},
    Frame,
};
use relinker_core::controller::PlayerState;
use relinker_core::registry::RegistryEntry;

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    widgets::{
        filter_input::{FilterAction, FilterInput},
        pane_chrome::{pane_chrome, Badge},
        scrollable_list::ScrollableList,
        status_bar::InputMode,
    },
};

pub struct PlaylistList {
    pub list: ScrollableList<RegistryEntry>,
    filter_input: FilterInput,
    rename_input: FilterInput,
    add_input: FilterInput,
    /// Playlist awaiting a `y` before it is dropped from the registry.
    confirm_delete: Option<PathBuf>,
    list_state: ListState,
    /// Last selection reported with `SelectPlaylist`.
    reported: Option<PathBuf>,
}

impl PlaylistList {
    pub fn new() -> Self {
        Self {
            list: ScrollableList::new(|entry: &RegistryEntry, q: &str| {
                let name = entry.name.to_lowercase();
                let path = entry.path.to_string_lossy().to_lowercase();
                q.to_lowercase()
                    .split_whitespace()
                    .all(|term| name.contains(term) || path.contains(term))
            }),
            filter_input: FilterInput::new("name or path…"),
            rename_input: FilterInput::prompt("rename:", "new name"),
            add_input: FilterInput::prompt("add folder:", "directory to scan"),
            confirm_delete: None,
            list_state: ListState::default(),
            reported: None,
        }
    }

    /// Re-read the registry entries from `state`, keeping the selection on
    /// the same playlist when it still exists. The caller shows whatever
    /// ends up selected.
    pub fn sync(&mut self, state: &AppState) {
        let keep = self.selected_path();
        self.list.set_items(state.playlists.clone());
        if let Some(path) = keep {
            self.select_path(&path);
        }
        self.reported = self.selected_path();
    }

    pub fn selected_path(&self) -> Option<PathBuf> {
        self.list.selected_item().map(|e| e.path.clone())
    }

    /// Put the selection on `path`, e.g. the playlist opened from the CLI.
    pub fn select_path(&mut self, path: &Path) {
        if let Some(idx) = self.list.items.iter().position(|e| e.path == path) {
            self.list.set_selected_by_original(idx);
        }
    }

    /// `SelectPlaylist` when the highlighted playlist differs from the last
    /// one reported.
    fn selection_changed(&mut self) -> Vec<Action> {
        let current = self.selected_path();
        if current == self.reported {
            return vec![];
        }
        self.reported = current.clone();
        current.map(Action::SelectPlaylist).into_iter().collect()
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) -> Vec<Action> {
        if self.rename_input.is_active() {
            if let FilterAction::Confirmed(name) = self.rename_input.handle_key(key) {
                let name = name.trim();
                if !name.is_empty() {
                    if let Some(path) = self.selected_path() {
                        return vec![Action::RenamePlaylist(path, name.to_string())];
                    }
                }
            }
            return vec![];
        }
        if let FilterAction::Confirmed(dir) = self.add_input.handle_key(key) {
            let dir = dir.trim();
            if !dir.is_empty() {
                return vec![Action::AddFolder(expand_home(dir))];
            }
        }
        vec![]
    }
}

impl Default for PlaylistList {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(input: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (input.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(input),
    }
}

impl Component for PlaylistList {
    fn id(&self) -> ComponentId {
        ComponentId::PlaylistList
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }

        if let Some(path) = self.confirm_delete.take() {
            if key.code == KeyCode::Char('y') {
                return vec![Action::DeletePlaylist(path)];
            }
            return vec![];
        }

        if self.rename_input.is_active() || self.add_input.is_active() {
            return self.handle_prompt_key(key);
        }

        if self.filter_input.is_active() {
            match key.code {
                KeyCode::Up => self.list.select_up(1),
                KeyCode::Down => self.list.select_down(1),
                _ => match self.filter_input.handle_key(key) {
                    FilterAction::Changed(q) => self.list.set_filter(&q),
                    FilterAction::Confirmed(_) => {}
                    FilterAction::Cancelled => self.list.set_filter(""),
                },
            }
            return self.selection_changed();
        }

        let step = if key.modifiers.contains(KeyModifiers::SHIFT) {
            5
        } else {
            1
        };
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.list.select_up(step),
            KeyCode::Down | KeyCode::Char('j') => self.list.select_down(step),
            KeyCode::PageUp => self.list.select_up(10),
            KeyCode::PageDown => self.list.select_down(10),
            KeyCode::Home | KeyCode::Char('g') => self.list.select_first(),
            KeyCode::End | KeyCode::Char('G') => self.list.select_last(),

            KeyCode::Enter => {
                if let Some(path) = self.selected_path() {
                    return vec![Action::OpenPlaylist(path)];
                }
            }
            KeyCode::Char('/') => {
                self.filter_input.activate();
            }
            KeyCode::Char('r') => {
                if let Some(entry) = self.list.selected_item() {
                    self.rename_input.set_value(&entry.name);
                    self.rename_input.activate();
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                self.confirm_delete = self.selected_path();
            }
            KeyCode::Char('a') => {
                self.add_input.clear();
                self.add_input.activate();
            }
            KeyCode::Char('y') => {
                if let Some(path) = self.selected_path() {
                    return vec![Action::CopyToClipboard(path.to_string_lossy().into_owned())];
                }
            }
            _ => {}
        }

        self.selection_changed()
    }

    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, _state: &AppState) -> Vec<Action> {
        let rel_row = event.row.saturating_sub(area.y + 1) as usize;
        match event.kind {
            MouseEventKind::ScrollUp => self.list.select_up(1),
            MouseEventKind::ScrollDown => self.list.select_down(1),
            MouseEventKind::Down(MouseButton::Left) => {
                // a click on the highlighted row opens it
                if !self.list.handle_click(rel_row)
                    && self.list.scroll_offset + rel_row == self.list.selected
                {
                    if let Some(path) = self.selected_path() {
                        return vec![Action::OpenPlaylist(path)];
                    }
                }
            }
            _ => {}
        }
        self.selection_changed()
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        // clicking another pane drops a pending delete
        if let Action::FocusPane(id) = action {
            if *id != ComponentId::PlaylistList {
                self.confirm_delete = None;
            }
        }
        vec![]
    }

    fn input_mode(&self) -> InputMode {
        if self.confirm_delete.is_some() {
            InputMode::Confirm
        } else if self.rename_input.is_active() || self.add_input.is_active() {
            InputMode::Input
        } else if self.filter_input.is_active() {
            InputMode::Filter
        } else {
            InputMode::Normal
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let p = &state.palette;
        let count = if self.list.filter.is_empty() {
            format!("{}", self.list.total_len())
        } else {
            format!("{}/{}", self.list.len(), self.list.total_len())
        };
        let block = pane_chrome(
            "playlists",
            Some('1'),
            focused,
            Some(Badge {
                text: &count,
                color: p.secondary,
            }),
            p,
        );
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let bar_open = self.input_mode() != InputMode::Normal;
        let list_area = Rect {
            height: inner.height.saturating_sub(u16::from(bar_open)),
            ..inner
        };

        if state.playlists.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  no playlists, press a to add a folder", p.style_muted())),
                list_area,
            );
        } else if self.list.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  no playlists match filter", p.style_muted())),
                list_area,
            );
        } else {
            let content_h = list_area.height as usize;
            self.list.ensure_visible(content_h);
            let sel_in_view = self.list.selected_in_view(content_h);

            let items: Vec<ListItem> = self
                .list
                .visible_items(content_h)
                .iter()
                .enumerate()
                .map(|(view_row, (_, entry))| {
                    let is_selected = view_row == sel_in_view;
                    let open_state = state
                        .now
                        .as_ref()
                        .filter(|n| n.playlist == entry.path)
                        .map(|n| n.state);
                    let (icon, icon_color) = match open_state {
                        Some(PlayerState::Playing) => ("▶", p.playing),
                        Some(PlayerState::Paused) => ("⏸", p.paused),
                        Some(_) => ("■", p.secondary),
                        None => (" ", p.muted),
                    };
                    let name_style = if open_state.is_some() || is_selected {
                        Style::default().fg(p.primary).add_modifier(Modifier::BOLD)
                    } else {
                        Style::default().fg(p.secondary)
                    };
                    let item_bg = if is_selected {
                        Style::default().bg(p.selection_bg)
                    } else {
                        Style::default()
                    };
                    ListItem::new(Line::from(vec![
                        Span::styled(icon, Style::default().fg(icon_color)),
                        Span::raw(" "),
                        Span::styled(entry.name.clone(), name_style),
                    ]))
                    .style(item_bg)
                })
                .collect();

            self.list_state.select(Some(sel_in_view));
            frame.render_stateful_widget(List::new(items), list_area, &mut self.list_state);
        }

        if bar_open && inner.height > 0 {
            let bar = Rect {
                y: inner.y + inner.height - 1,
                height: 1,
                ..inner
            };
            if let Some(path) = &self.confirm_delete {
                let name = state.playlist_name(path).unwrap_or("playlist");
                frame.render_widget(
                    Paragraph::new(Span::styled(
                        format!("delete \"{}\"? y/n", name),
                        Style::default().fg(p.mode_confirm).bg(p.filter_bg),
                    )),
                    bar,
                );
            } else if self.rename_input.is_active() {
                self.rename_input.draw(frame, bar, p);
            } else if self.add_input.is_active() {
                self.add_input.draw(frame, bar, p);
            } else {
                self.filter_input.draw(frame, bar, p);
            }
        }
    }
}
