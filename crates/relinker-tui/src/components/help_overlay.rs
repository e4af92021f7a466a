//! HelpOverlay component — centered popup with keyboard shortcut reference.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, MouseEvent};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::Palette,
};

#[derive(Default)]
pub struct HelpOverlay {
    pub visible: bool,
}

impl HelpOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }
}

impl Component for HelpOverlay {
    fn id(&self) -> ComponentId {
        ComponentId::HelpOverlay
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release || !self.visible {
            return vec![];
        }
        match key.code {
            KeyCode::Char('?') | KeyCode::Char('q') | KeyCode::Esc => vec![Action::ToggleHelp],
            // consume everything else while open
            _ => vec![],
        }
    }

    fn handle_mouse(&mut self, _event: MouseEvent, _area: Rect, _state: &AppState) -> Vec<Action> {
        vec![]
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        if *action == Action::ToggleHelp {
            self.toggle();
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, state: &AppState) {
        if !self.visible {
            return;
        }
        let p = &state.palette;
        let popup = centered_rect(64, 34, area);
        let section = |title: &'static str| {
            Line::from(Span::styled(
                title,
                Style::default().fg(p.muted).add_modifier(Modifier::BOLD),
            ))
        };

        let help_lines: Vec<Line> = vec![
            Line::from(Span::styled(
                " keyboard shortcuts",
                Style::default().fg(p.primary).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            section(" playback"),
            help_row("space", "play / pause", p),
            help_row("n / p", "next / previous track", p),
            help_row(", / .", "seek back / forward (Shift = fine step)", p),
            help_row("wheel / click", "seek on the timeline", p),
            help_row("o", "cycle audio output", p),
            Line::from(""),
            section(" playlists pane"),
            help_row("enter", "open at the resume point and play", p),
            help_row("r", "rename", p),
            help_row("d", "remove from the list (confirm with y)", p),
            help_row("a", "scan a folder for playlists", p),
            Line::from(""),
            section(" tracks pane"),
            help_row("enter", "play from this track", p),
            help_row("J", "jump to the playing / resume track", p),
            help_row("y", "copy track path", p),
            Line::from(""),
            section(" navigation & ui"),
            help_row("↑ / ↓  or  j / k", "move selection", p),
            help_row("home / end", "first / last", p),
            help_row("tab / shift-tab", "focus next / previous pane", p),
            help_row("1 / 2 / 3", "focus pane", p),
            help_row("/", "filter (Esc clears, then closes)", p),
            help_row("t", "toggle light / dark theme", p),
            help_row("?", "toggle this help", p),
            help_row("q / Ctrl+C", "quit (saves position)", p),
            Line::from(""),
            Line::from(Span::styled(" press ? or esc to close", p.style_muted())),
        ];

        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(help_lines)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(p.panel_border_focused))
                        .style(Style::default().bg(p.bg)),
                )
                .wrap(Wrap { trim: false }),
            popup,
        );
    }
}

fn help_row<'a>(key: &'a str, desc: &'a str, p: &Palette) -> Line<'a> {
    Line::from(vec![
        Span::raw(" "),
        Span::styled(
            format!("{:<18}", key),
            Style::default().fg(p.primary).add_modifier(Modifier::BOLD),
        ),
        Span::styled(desc, Style::default().fg(p.secondary)),
    ])
}

fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1])[1]
}
