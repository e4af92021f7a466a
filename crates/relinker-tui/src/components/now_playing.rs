//! NowPlaying component — header with title, state, timeline, output and cover.

use ratatui::crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use relinker_core::controller::PlayerState;

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    widgets::{
        cover_art::{self, draw_cover},
        pane_chrome::{pane_chrome, Badge},
        progress_bar::{draw_progress, fraction_at},
    },
};

#[derive(Default)]
pub struct NowPlaying {
    /// Where the timeline was last drawn, for mouse hit-testing.
    timeline_area: Rect,
}

impl NowPlaying {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_timeline(&self, event: &MouseEvent) -> bool {
        let r = self.timeline_area;
        r.width > 0
            && event.row == r.y
            && event.column >= r.x
            && event.column < r.x + r.width
    }
}

impl Component for NowPlaying {
    fn id(&self) -> ComponentId {
        ComponentId::NowPlaying
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        let step = state.seek_step_ms as i64;
        match key.code {
            KeyCode::Left | KeyCode::Char('h') => vec![Action::SeekRelative(-step)],
            KeyCode::Right | KeyCode::Char('l') => vec![Action::SeekRelative(step)],
            KeyCode::Home | KeyCode::Char('0') => vec![Action::SeekTo(0)],
            KeyCode::Enter => vec![Action::TogglePause],
            _ => vec![],
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent, _area: Rect, state: &AppState) -> Vec<Action> {
        if !self.on_timeline(&event) {
            return vec![];
        }
        let Some(now) = &state.now else {
            return vec![];
        };
        let step = state.seek_step_ms as i64;
        match event.kind {
            MouseEventKind::ScrollUp => vec![Action::SeekRelative(step)],
            MouseEventKind::ScrollDown => vec![Action::SeekRelative(-step)],
            MouseEventKind::Down(MouseButton::Left) => {
                let Some(duration) = now.duration_ms else {
                    return vec![];
                };
                match fraction_at(
                    self.timeline_area,
                    event.column,
                    Some(now.offset_ms),
                    now.duration_ms,
                ) {
                    Some(f) => vec![Action::SeekTo((f * duration as f64) as u64)],
                    None => vec![],
                }
            }
            _ => vec![],
        }
    }

    fn on_action(&mut self, _action: &Action, _state: &AppState) -> Vec<Action> {
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let p = &state.palette;
        let output = state.output.to_string();
        let (badge_text, badge_color) = if state.engine_available {
            (output.as_str(), p.secondary)
        } else {
            ("no mpv", p.error)
        };
        let block = pane_chrome(
            "now playing",
            Some('3'),
            focused,
            Some(Badge {
                text: badge_text,
                color: badge_color,
            }),
            p,
        );
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.timeline_area = Rect::default();

        let text_area = match &state.cover {
            Some(img) if inner.width > 40 => {
                let cover_w = inner.height.saturating_mul(2);
                let cols = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Length(cover_w), Constraint::Length(1), Constraint::Min(0)])
                    .split(inner);
                draw_cover(frame, cover_art::fit(cols[0]), img);
                cols[2]
            }
            _ => inner,
        };

        let Some(now) = &state.now else {
            frame.render_widget(
                Paragraph::new(Span::styled("nothing playing, Enter on a playlist to start", p.style_muted())),
                text_area,
            );
            return;
        };

        let (icon, icon_color, label) = match now.state {
            PlayerState::Playing => ("▶", p.playing, "playing"),
            PlayerState::Paused => ("⏸", p.paused, "paused"),
            PlayerState::Loaded => ("■", p.secondary, "ready"),
            PlayerState::Stopped => ("■", p.muted, "stopped"),
        };

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(text_area);

        let title = Line::from(vec![
            Span::styled(format!("{} ", icon), Style::default().fg(icon_color)),
            Span::styled(
                now.title.clone(),
                Style::default().fg(p.primary).add_modifier(Modifier::BOLD),
            ),
        ]);
        frame.render_widget(Paragraph::new(title), rows[0]);

        let detail = Line::from(vec![
            Span::styled(now.playlist_name.clone(), p.style_accent()),
            Span::styled(
                format!("  track {}/{}  ", now.track_index + 1, now.track_count),
                p.style_secondary(),
            ),
            Span::styled(label, Style::default().fg(icon_color)),
        ]);
        frame.render_widget(Paragraph::new(detail), rows[1]);

        self.timeline_area = rows[3];
        draw_progress(
            frame,
            rows[3],
            now.progress(),
            Some(now.offset_ms),
            now.duration_ms,
            p,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::NowPlaying as Now;
    use ratatui::crossterm::event::KeyModifiers;
    use relinker_core::config::ThemeMode;
    use std::path::PathBuf;

    fn state() -> AppState {
        let mut s = AppState::new(ThemeMode::Dark);
        s.now = Some(Now {
            playlist: PathBuf::from("/p.m3u"),
            playlist_name: "p".to_string(),
            track_index: 0,
            track_count: 2,
            title: "t".to_string(),
            state: PlayerState::Playing,
            offset_ms: 30_000,
            duration_ms: Some(120_000),
        });
        s
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    fn pane() -> NowPlaying {
        NowPlaying {
            // "0:30 " + 20 cells + " 2:00"
            timeline_area: Rect::new(10, 5, 30, 1),
        }
    }

    #[test]
    fn click_on_timeline_seeks_proportionally() {
        let s = state();
        let mut n = pane();
        let area = Rect::new(0, 0, 80, 7);
        assert_eq!(
            n.handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 25, 5), area, &s),
            vec![Action::SeekTo(60_000)]
        );
        assert!(n
            .handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 25, 4), area, &s)
            .is_empty());
    }

    #[test]
    fn wheel_on_timeline_steps() {
        let s = state();
        let mut n = pane();
        let area = Rect::new(0, 0, 80, 7);
        assert_eq!(
            n.handle_mouse(mouse(MouseEventKind::ScrollUp, 12, 5), area, &s),
            vec![Action::SeekRelative(5_000)]
        );
        assert_eq!(
            n.handle_mouse(mouse(MouseEventKind::ScrollDown, 12, 5), area, &s),
            vec![Action::SeekRelative(-5_000)]
        );
    }

    #[test]
    fn click_without_duration_is_ignored() {
        let mut s = state();
        if let Some(now) = s.now.as_mut() {
            now.duration_ms = None;
        }
        let mut n = pane();
        let area = Rect::new(0, 0, 80, 7);
        assert!(n
            .handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 20, 5), area, &s)
            .is_empty());
    }
}
