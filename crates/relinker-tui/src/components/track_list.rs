//! TrackList component — tracks of the selected playlist with resume,
//! finished and missing markers.

use std::path::PathBuf;

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

use crate::{
    action::{Action, ComponentId},
    app_state::{AppState, TrackRow},
    component::Component,
    widgets::{
        filter_input::{FilterAction, FilterInput},
        pane_chrome::{pane_chrome, Badge},
        progress_bar::fmt_time,
        scrollable_list::ScrollableList,
        status_bar::InputMode,
    },
};

pub struct TrackList {
    pub list: ScrollableList<TrackRow>,
    filter_input: FilterInput,
    list_state: ListState,
    /// Playlist whose rows are loaded.
    playlist: Option<PathBuf>,
}

impl TrackList {
    pub fn new() -> Self {
        Self {
            list: ScrollableList::new(|row: &TrackRow, q: &str| {
                let text = format!("{} {}", row.title, row.key).to_lowercase();
                q.to_lowercase()
                    .split_whitespace()
                    .all(|term| text.contains(term))
            }),
            filter_input: FilterInput::new("title or path…"),
            list_state: ListState::default(),
            playlist: None,
        }
    }

    /// Pull rows from `state.tracks`. A different playlist starts with the
    /// playing (or resume) track selected; the same playlist keeps the
    /// selection and only refreshes markers.
    pub fn sync(&mut self, state: &AppState) {
        let Some(view) = &state.tracks else {
            self.playlist = None;
            self.list.set_items(Vec::new());
            return;
        };
        let same = self.playlist.as_ref() == Some(&view.playlist);
        let keep = self.list.selected_original_index();
        self.list.set_items(view.rows.clone());
        if same {
            if let Some(idx) = keep {
                self.list.set_selected_by_original(idx);
            }
            return;
        }
        self.playlist = Some(view.playlist.clone());
        self.filter_input.clear();
        self.filter_input.deactivate();
        self.list.set_filter("");
        self.list.select_first();
        let start = state
            .current_track_in_view()
            .unwrap_or(view.resume.track_index);
        self.list.set_selected_by_original(start);
    }

    fn play_selected(&self) -> Vec<Action> {
        match (&self.playlist, self.list.selected_original_index()) {
            (Some(path), Some(idx)) => vec![Action::PlayTrack(path.clone(), idx)],
            _ => vec![],
        }
    }
}

impl Default for TrackList {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for TrackList {
    fn id(&self) -> ComponentId {
        ComponentId::TrackList
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
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
            return vec![];
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
            KeyCode::Enter => return self.play_selected(),
            KeyCode::Char('/') => self.filter_input.activate(),
            KeyCode::Char('J') => {
                let target = state
                    .current_track_in_view()
                    .or_else(|| state.tracks.as_ref().map(|v| v.resume.track_index));
                if let Some(idx) = target {
                    self.list.set_selected_by_original(idx);
                }
            }
            KeyCode::Char('y') => {
                if let Some(row) = self.list.selected_item() {
                    return vec![Action::CopyToClipboard(row.key.clone())];
                }
            }
            _ => {}
        }
        vec![]
    }

    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, _state: &AppState) -> Vec<Action> {
        let rel_row = event.row.saturating_sub(area.y + 1) as usize;
        match event.kind {
            MouseEventKind::ScrollUp => self.list.select_up(1),
            MouseEventKind::ScrollDown => self.list.select_down(1),
            MouseEventKind::Down(MouseButton::Left) => {
                if !self.list.handle_click(rel_row)
                    && self.list.scroll_offset + rel_row == self.list.selected
                {
                    return self.play_selected();
                }
            }
            _ => {}
        }
        vec![]
    }

    fn on_action(&mut self, _action: &Action, _state: &AppState) -> Vec<Action> {
        vec![]
    }

    fn input_mode(&self) -> InputMode {
        if self.filter_input.is_active() {
            InputMode::Filter
        } else {
            InputMode::Normal
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let p = &state.palette;
        let title = state
            .tracks
            .as_ref()
            .and_then(|v| state.playlist_name(&v.playlist))
            .unwrap_or("tracks");
        let count = format!("{} tracks", self.list.total_len());
        let block = pane_chrome(
            title,
            Some('2'),
            focused,
            Some(Badge {
                text: &count,
                color: p.secondary,
            }),
            p,
        );
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let filter_open = self.filter_input.is_active();
        let list_area = Rect {
            height: inner.height.saturating_sub(u16::from(filter_open)),
            ..inner
        };

        let Some(view) = &state.tracks else {
            frame.render_widget(
                Paragraph::new(Span::styled("  select a playlist", p.style_muted())),
                list_area,
            );
            return;
        };

        if self.list.is_empty() {
            let msg = if self.list.total_len() == 0 {
                "  playlist is empty"
            } else {
                "  no tracks match filter"
            };
            frame.render_widget(Paragraph::new(Span::styled(msg, p.style_muted())), list_area);
        } else {
            let current = state.current_track_in_view();
            let playing_state = state.now.as_ref().map(|n| n.state);
            let content_h = list_area.height as usize;
            self.list.ensure_visible(content_h);
            let sel_in_view = self.list.selected_in_view(content_h);
            let num_w = self.list.total_len().to_string().len();

            let items: Vec<ListItem> = self
                .list
                .visible_items(content_h)
                .iter()
                .enumerate()
                .map(|(view_row, (idx, row))| {
                    let is_selected = view_row == sel_in_view;
                    let is_current = current == Some(*idx);
                    let (marker, marker_color) = if is_current {
                        match playing_state {
                            Some(PlayerState::Playing) => ("▶", p.playing),
                            Some(PlayerState::Paused) => ("⏸", p.paused),
                            _ => ("■", p.secondary),
                        }
                    } else if current.is_none() && *idx == view.resume.track_index {
                        ("›", p.resume_marker)
                    } else {
                        (" ", p.muted)
                    };

                    let mut title_style = if row.missing {
                        p.style_error()
                    } else if row.finished && !is_current {
                        p.style_finished()
                    } else if is_current {
                        p.style_playing()
                    } else if is_selected {
                        p.style_default()
                    } else {
                        p.style_secondary()
                    };
                    if is_current || is_selected {
                        title_style = title_style.add_modifier(Modifier::BOLD);
                    }

                    let mut spans = vec![
                        Span::styled(marker, Style::default().fg(marker_color)),
                        Span::styled(format!(" {:>w$} ", idx + 1, w = num_w), p.style_muted()),
                        Span::styled(row.title.clone(), title_style),
                    ];
                    if row.missing {
                        spans.push(Span::styled("  missing", p.style_error()));
                    }
                    if let Some(secs) = row.duration_secs {
                        spans.push(Span::styled(
                            format!("  {}", fmt_time(secs * 1000)),
                            p.style_muted(),
                        ));
                    }
                    let item_bg = if is_selected {
                        Style::default().bg(p.selection_bg)
                    } else {
                        Style::default()
                    };
                    ListItem::new(Line::from(spans)).style(item_bg)
                })
                .collect();

            self.list_state.select(Some(sel_in_view));
            frame.render_stateful_widget(List::new(items), list_area, &mut self.list_state);
        }

        if filter_open && inner.height > 0 {
            let bar = Rect {
                y: inner.y + inner.height - 1,
                height: 1,
                ..inner
            };
            self.filter_input.draw(frame, bar, p);
        }
    }
}
