//! Smooth Unicode progress bar widget, doubling as the seekable timeline.

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::theme::Palette;

const BLOCKS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];

/// Column span of the bar itself once the time labels are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    bar_x: u16,
    bar_w: u16,
}

fn labels(time_pos_ms: Option<u64>, duration_ms: Option<u64>) -> (String, String) {
    (
        time_pos_ms.map(fmt_time).unwrap_or_default(),
        duration_ms.map(fmt_time).unwrap_or_default(),
    )
}

fn geometry(area: Rect, left: &str, right: &str) -> Geometry {
    let side = |s: &str| if s.is_empty() { 0 } else { s.chars().count() as u16 + 1 };
    let left_w = side(left);
    let right_w = side(right);
    Geometry {
        bar_x: area.x + left_w,
        bar_w: area.width.saturating_sub(left_w + right_w).max(4),
    }
}

/// Render a smooth progress bar in `area`.
/// `progress` is 0.0..=1.0; the labels show the position and length.
pub fn draw_progress(
    frame: &mut Frame,
    area: Rect,
    progress: f64,
    time_pos_ms: Option<u64>,
    duration_ms: Option<u64>,
    palette: &Palette,
) {
    if area.width < 4 || area.height == 0 {
        return;
    }

    let (left_label, right_label) = labels(time_pos_ms, duration_ms);
    let bar_w = geometry(area, &left_label, &right_label).bar_w as usize;

    // 8 eighths per cell
    let eighths = (progress.clamp(0.0, 1.0) * bar_w as f64 * 8.0) as usize;
    let full_blocks = eighths / 8;
    let partial = eighths % 8;

    let mut bar = String::with_capacity(bar_w + 4);
    for _ in 0..full_blocks.min(bar_w) {
        bar.push('█');
    }
    if full_blocks < bar_w {
        bar.push(BLOCKS[partial]);
        for _ in (full_blocks + 1)..bar_w {
            bar.push('·');
        }
    }

    let mut spans = Vec::new();
    if !left_label.is_empty() {
        spans.push(Span::styled(
            format!("{} ", left_label),
            Style::default().fg(palette.secondary),
        ));
    }
    spans.push(Span::styled(bar, Style::default().fg(palette.playing)));
    if !right_label.is_empty() {
        spans.push(Span::styled(
            format!(" {}", right_label),
            Style::default().fg(palette.muted),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Fraction of the track under `column`, or `None` when the column is
/// outside the bar. Takes the same labels as the last `draw_progress` call.
pub fn fraction_at(
    area: Rect,
    column: u16,
    time_pos_ms: Option<u64>,
    duration_ms: Option<u64>,
) -> Option<f64> {
    let (left, right) = labels(time_pos_ms, duration_ms);
    let g = geometry(area, &left, &right);
    if column < g.bar_x || column >= g.bar_x + g.bar_w {
        return None;
    }
    Some(f64::from(column - g.bar_x) / f64::from(g.bar_w))
}

pub fn fmt_time(ms: u64) -> String {
    let s = ms / 1000;
    let h = s / 3600;
    let m = (s % 3600) / 60;
    let s = s % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
