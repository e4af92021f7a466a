//! FilterInput — wraps tui-input for use as a filter bar or a one-line prompt.

use ratatui::crossterm::event::{Event, KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use crate::theme::Palette;

pub enum FilterAction {
    Changed(String),
    Confirmed(String),
    Cancelled,
}

pub struct FilterInput {
    input: Input,
    active: bool,
    prefix: String,
    placeholder: String,
    /// Prompts close on the first Esc; filters clear first.
    close_on_esc: bool,
}

impl FilterInput {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            input: Input::default(),
            active: false,
            prefix: "/".to_string(),
            placeholder: placeholder.into(),
            close_on_esc: false,
        }
    }

    /// A labelled prompt, e.g. `rename: `.
    pub fn prompt(prefix: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            close_on_esc: true,
            ..Self::new(placeholder)
        }
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn clear(&mut self) {
        self.input = Input::default();
    }

    pub fn set_value(&mut self, value: &str) {
        self.input = Input::new(value.to_string());
    }

    pub fn text(&self) -> &str {
        self.input.value()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.input.value().is_empty()
    }

    /// Handle a key event. Returns what happened.
    ///
    /// Esc on a filter with text clears the text and keeps it open; a second
    /// Esc closes it. Prompts close on the first Esc.
    pub fn handle_key(&mut self, key: KeyEvent) -> FilterAction {
        match key.code {
            KeyCode::Esc => {
                if !self.close_on_esc && !self.input.value().is_empty() {
                    self.input = Input::default();
                    FilterAction::Changed(String::new())
                } else {
                    self.deactivate();
                    FilterAction::Cancelled
                }
            }
            KeyCode::Enter => {
                self.deactivate();
                FilterAction::Confirmed(self.input.value().to_string())
            }
            _ => {
                self.input.handle_event(&Event::Key(key));
                FilterAction::Changed(self.input.value().to_string())
            }
        }
    }

    /// Render the input bar into `area`.
    pub fn draw(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
        let lead = self.prefix.chars().count() + 1;
        let scroll = self
            .input
            .visual_scroll((area.width as usize).saturating_sub(lead + 2));
        let value = self.input.value();
        let display = if value.is_empty() {
            Span::styled(
                format!("{} {}", self.prefix, self.placeholder),
                Style::default().fg(palette.muted),
            )
        } else {
            let visible: String = value.chars().skip(scroll).collect();
            Span::styled(
                format!("{} {}", self.prefix, visible),
                Style::default().fg(palette.filter_fg),
            )
        };

        let paragraph =
            Paragraph::new(Line::from(vec![display])).style(Style::default().bg(palette.filter_bg));
        frame.render_widget(paragraph, area);

        if self.active && area.width > 0 {
            let cursor_x = area.x + (lead + self.input.visual_cursor() - scroll) as u16;
            frame.set_cursor_position((cursor_x.min(area.x + area.width - 1), area.y));
        }
    }
}

impl Default for FilterInput {
    fn default() -> Self {
        Self::new("filter...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_str(input: &mut FilterInput, s: &str) {
        for c in s.chars() {
            input.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn filter_esc_clears_then_closes() {
        let mut f = FilterInput::default();
        f.activate();
        type_str(&mut f, "ab");
        assert_eq!(f.text(), "ab");
        assert!(matches!(f.handle_key(key(KeyCode::Esc)), FilterAction::Changed(q) if q.is_empty()));
        assert!(f.is_active());
        assert!(matches!(f.handle_key(key(KeyCode::Esc)), FilterAction::Cancelled));
        assert!(!f.is_active());
    }

    #[test]
    fn prompt_confirms_with_value() {
        let mut p = FilterInput::prompt("rename:", "new name");
        p.set_value("Road");
        p.activate();
        type_str(&mut p, " Trip");
        match p.handle_key(key(KeyCode::Enter)) {
            FilterAction::Confirmed(v) => assert_eq!(v, "Road Trip"),
            _ => panic!("expected confirm"),
        }
        assert!(!p.is_active());
    }

    #[test]
    fn prompt_closes_on_first_esc() {
        let mut p = FilterInput::prompt("add:", "folder");
        p.activate();
        type_str(&mut p, "/music");
        assert!(matches!(p.handle_key(key(KeyCode::Esc)), FilterAction::Cancelled));
    }
}
