//! Color palettes and style helpers for the dark and light themes.

use ratatui::style::{Color, Modifier, Style};
use relinker_core::config::ThemeMode;

/// Every color the UI draws with. Components read the active palette from
/// `AppState` so a theme switch repaints everything on the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub bg: Color,
    pub accent: Color,
    pub playing: Color,
    pub paused: Color,
    pub error: Color,
    pub muted: Color,
    pub secondary: Color,
    pub primary: Color,
    pub selection_bg: Color,
    pub panel_border: Color,
    pub panel_border_focused: Color,
    pub number_hint: Color,
    pub filter_bg: Color,
    pub filter_fg: Color,
    pub finished: Color,
    pub resume_marker: Color,
    pub toast_info: Color,
    pub toast_success: Color,
    pub toast_warning: Color,
    pub toast_error: Color,
    pub mode_normal: Color,
    pub mode_input: Color,
    pub mode_confirm: Color,
}

impl Palette {
    pub const DARK: Palette = Palette {
        bg: Color::Rgb(18, 18, 18),
        accent: Color::Rgb(255, 95, 95),
        playing: Color::Rgb(80, 200, 120),
        paused: Color::Rgb(255, 184, 80),
        error: Color::Rgb(255, 80, 80),
        muted: Color::Rgb(72, 72, 88),
        secondary: Color::Rgb(115, 115, 138),
        primary: Color::Rgb(210, 210, 225),
        selection_bg: Color::Rgb(28, 28, 40),
        panel_border: Color::Rgb(40, 40, 52),
        panel_border_focused: Color::Rgb(120, 100, 200),
        number_hint: Color::Rgb(90, 90, 115),
        filter_bg: Color::Rgb(20, 20, 32),
        filter_fg: Color::Rgb(255, 200, 80),
        finished: Color::Rgb(85, 85, 100),
        resume_marker: Color::Rgb(80, 140, 200),
        toast_info: Color::Rgb(80, 160, 220),
        toast_success: Color::Rgb(80, 200, 120),
        toast_warning: Color::Rgb(255, 184, 80),
        toast_error: Color::Rgb(255, 95, 95),
        mode_normal: Color::Rgb(115, 115, 138),
        mode_input: Color::Rgb(255, 200, 80),
        mode_confirm: Color::Rgb(255, 95, 95),
    };

    pub const LIGHT: Palette = Palette {
        bg: Color::Rgb(246, 244, 240),
        accent: Color::Rgb(200, 50, 60),
        playing: Color::Rgb(30, 140, 70),
        paused: Color::Rgb(190, 120, 20),
        error: Color::Rgb(200, 40, 40),
        muted: Color::Rgb(150, 150, 160),
        secondary: Color::Rgb(100, 100, 115),
        primary: Color::Rgb(30, 30, 40),
        selection_bg: Color::Rgb(225, 222, 238),
        panel_border: Color::Rgb(200, 198, 192),
        panel_border_focused: Color::Rgb(110, 80, 200),
        number_hint: Color::Rgb(140, 140, 160),
        filter_bg: Color::Rgb(236, 232, 220),
        filter_fg: Color::Rgb(160, 100, 0),
        finished: Color::Rgb(170, 170, 178),
        resume_marker: Color::Rgb(40, 100, 180),
        toast_info: Color::Rgb(40, 110, 180),
        toast_success: Color::Rgb(30, 140, 70),
        toast_warning: Color::Rgb(190, 120, 20),
        toast_error: Color::Rgb(200, 50, 60),
        mode_normal: Color::Rgb(100, 100, 115),
        mode_input: Color::Rgb(160, 100, 0),
        mode_confirm: Color::Rgb(200, 50, 60),
    };

    pub fn for_mode(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Dark => Self::DARK,
            ThemeMode::Light => Self::LIGHT,
        }
    }

    // ── Predefined styles ─────────────────────────────────────────────────────

    pub fn style_base(&self) -> Style {
        Style::default().fg(self.primary).bg(self.bg)
    }

    pub fn style_default(&self) -> Style {
        Style::default().fg(self.primary)
    }

    pub fn style_secondary(&self) -> Style {
        Style::default().fg(self.secondary)
    }

    pub fn style_accent(&self) -> Style {
        Style::default().fg(self.accent)
    }

    pub fn style_playing(&self) -> Style {
        Style::default().fg(self.playing)
    }

    pub fn style_selected(&self) -> Style {
        Style::default().bg(self.selection_bg).fg(self.primary)
    }

    pub fn style_selected_focused(&self) -> Style {
        Style::default()
            .bg(self.selection_bg)
            .fg(self.primary)
            .add_modifier(Modifier::BOLD)
    }

    pub fn style_focused_border(&self) -> Style {
        Style::default().fg(self.panel_border_focused)
    }

    pub fn style_unfocused_border(&self) -> Style {
        Style::default().fg(self.panel_border)
    }

    pub fn style_filter(&self) -> Style {
        Style::default().fg(self.filter_fg).bg(self.filter_bg)
    }

    pub fn style_muted(&self) -> Style {
        Style::default().fg(self.muted)
    }

    pub fn style_finished(&self) -> Style {
        Style::default()
            .fg(self.finished)
            .add_modifier(Modifier::DIM)
    }

    pub fn style_error(&self) -> Style {
        Style::default().fg(self.error)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::DARK
    }
}
