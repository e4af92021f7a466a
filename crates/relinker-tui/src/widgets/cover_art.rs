//! Cover art thumbnails drawn with half-block cells: each terminal cell
//! shows two pixels, the upper one as foreground of `▀` and the lower one
//! as background.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Longest edge kept in memory for a decoded cover.
const THUMB_EDGE: u32 = 96;

/// Decode an image file and shrink it to a small thumbnail.
pub fn load_thumbnail(path: &Path) -> Option<RgbImage> {
    let img = image::open(path).ok()?;
    Some(img.thumbnail(THUMB_EDGE, THUMB_EDGE).to_rgb8())
}

/// Largest cell box with roughly square pixels that fits `area`.
pub fn fit(area: Rect) -> Rect {
    // cells are about twice as tall as wide, and hold two pixel rows
    let side = area.width.min(area.height.saturating_mul(2));
    Rect {
        x: area.x,
        y: area.y,
        width: side,
        height: side.div_ceil(2).min(area.height),
    }
}

/// Half-block lines for `img` scaled to `width` x `height` cells.
pub fn half_block_lines(img: &RgbImage, width: u16, height: u16) -> Vec<Line<'static>> {
    if width == 0 || height == 0 || img.width() == 0 || img.height() == 0 {
        return Vec::new();
    }
    let scaled = imageops::resize(img, u32::from(width), u32::from(height) * 2, FilterType::Triangle);
    (0..u32::from(height))
        .map(|row| {
            let spans: Vec<Span<'static>> = (0..u32::from(width))
                .map(|col| {
                    let top = scaled.get_pixel(col, row * 2);
                    let bottom = scaled.get_pixel(col, row * 2 + 1);
                    Span::styled("▀", Style::default().fg(rgb(top)).bg(rgb(bottom)))
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

pub fn draw_cover(frame: &mut Frame, area: Rect, img: &RgbImage) {
    let target = fit(area);
    let lines = half_block_lines(img, target.width, target.height);
    frame.render_widget(Paragraph::new(lines), target);
}

fn rgb(px: &Rgb<u8>) -> Color {
    Color::Rgb(px[0], px[1], px[2])
}
