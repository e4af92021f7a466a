//! Status bar — bottom line with input mode, output and keybindings.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use relinker_core::engine::AudioOutput;

use crate::theme::Palette;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Filter,
    /// A text prompt (rename, add folder) is open.
    Input,
    /// Waiting for a y/n answer.
    Confirm,
}

impl InputMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Filter => "FILTER",
            Self::Input => "INPUT",
            Self::Confirm => "CONFIRM",
        }
    }

    pub fn color(self, palette: &Palette) -> Color {
        match self {
            Self::Normal => palette.mode_normal,
            Self::Filter | Self::Input => palette.mode_input,
            Self::Confirm => palette.mode_confirm,
        }
    }

    fn keys(self) -> &'static str {
        match self {
            Self::Normal => {
                " ↑↓/jk select  Enter play  Space pause  n/p track  ,/. seek (Shift=fine)  o output  t theme  Tab panes  / filter  ? help  q quit"
            }
            Self::Filter => " type to filter  Up/Down move  Enter keep  Esc clear+close  Tab next pane",
            Self::Input => " type  Enter confirm  Esc cancel",
            Self::Confirm => " y confirm  any other key cancels",
        }
    }
}

/// Draw the keybindings footer bar (one row).
pub fn draw_keys_bar(
    frame: &mut Frame,
    area: Rect,
    mode: InputMode,
    output: AudioOutput,
    engine_available: bool,
    palette: &Palette,
) {
    let bulb = if engine_available {
        Span::styled("●", Style::default().fg(palette.playing))
    } else {
        Span::styled("○", Style::default().fg(palette.error))
    };

    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", mode.label()),
            Style::default()
                .fg(mode.color(palette))
                .add_modifier(Modifier::BOLD),
        ),
        bulb,
        Span::styled(format!(" {} ", output), Style::default().fg(palette.secondary)),
        Span::styled(mode.keys(), Style::default().fg(palette.muted)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
