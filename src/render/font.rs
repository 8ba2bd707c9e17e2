//! Bitmap text for card rasterization.
//!
//! Uses the Spleen bitmap fonts: 6x12 for small text and 12x24 for everything
//! else, scaled nearest-neighbour to the requested size. Glyph cells are
//! `size/2` wide and `size` tall, with lines spaced at 1.2x the font size.

use image::Rgba;
use spleen_font::{FONT_6X12, FONT_12X24, PSF2Font};

use super::paint::{Canvas, Rect};
use crate::template::TextAlign;

/// Tab stops every this many columns.
const TAB_WIDTH: usize = 8;
const LINE_HEIGHT: f32 = 1.2;
/// Cells at or below this height sample the small font.
const SMALL_FONT_MAX: f32 = 14.0;

/// Styling for one text run, already scaled to device pixels.
#[derive(Debug, Clone, Copy)]
pub struct TextStyle {
    pub size: f32,
    pub bold: bool,
    pub color: Rgba<u8>,
    pub align: TextAlign,
}

impl TextStyle {
    fn cell(&self) -> (f32, f32) {
        (self.size / 2.0, self.size)
    }
}

/// A glyph as a row-major on/off bitmap.
struct Glyph {
    width: usize,
    height: usize,
    bits: Vec<bool>,
}

#[derive(Debug, Clone, Copy)]
enum GlyphSource {
    Small,
    Large,
}

impl GlyphSource {
    fn for_size(size: f32) -> Self {
        if size <= SMALL_FONT_MAX {
            GlyphSource::Small
        } else {
            GlyphSource::Large
        }
    }

    fn dimensions(self) -> (usize, usize) {
        match self {
            GlyphSource::Small => (6, 12),
            GlyphSource::Large => (12, 24),
        }
    }

    fn glyph(self, ch: char) -> Glyph {
        let (width, height) = self.dimensions();
        let mut bits = vec![false; width * height];
        let font = match self {
            GlyphSource::Small => PSF2Font::new(FONT_6X12),
            GlyphSource::Large => PSF2Font::new(FONT_12X24),
        };
        let utf8 = ch.to_string();
        let mut found = false;
        if let Ok(mut font) = font {
            if let Some(rows) = font.glyph_for_utf8(utf8.as_bytes()) {
                found = true;
                for (row_y, row) in rows.enumerate() {
                    for (col_x, on) in row.enumerate() {
                        if row_y < height && col_x < width {
                            bits[row_y * width + col_x] = on;
                        }
                    }
                }
            }
        }
        if !found {
            draw_box(&mut bits, width, height);
        }
        Glyph { width, height, bits }
    }
}

/// Outline box for characters the font lacks.
fn draw_box(bits: &mut [bool], w: usize, h: usize) {
    let (top, bottom) = (h / 4, h - h / 6);
    for y in top..bottom {
        for x in 1..w - 1 {
            if y == top || y == bottom - 1 || x == 1 || x == w - 2 {
                bits[y * w + x] = true;
            }
        }
    }
}

/// Map typographic punctuation the bitmap fonts may lack onto ASCII.
fn simplify(ch: char) -> &'static str {
    match ch {
        '\u{201C}' | '\u{201D}' | '\u{201E}' => "\"",
        '\u{2018}' | '\u{2019}' | '\u{201A}' => "'",
        '\u{2013}' | '\u{2014}' | '\u{2212}' => "-",
        '\u{2026}' => "...",
        '\u{00A0}' => " ",
        _ => "",
    }
}

/// Expand tabs to the next tab stop and normalise punctuation.
fn prepare_line(line: &str) -> Vec<char> {
    let mut out = Vec::with_capacity(line.len());
    for ch in line.chars() {
        match ch {
            '\t' => {
                let pad = TAB_WIDTH - out.len() % TAB_WIDTH;
                out.extend(std::iter::repeat_n(' ', pad));
            }
            '\r' => {}
            c => {
                let simple = simplify(c);
                if simple.is_empty() {
                    out.push(c);
                } else {
                    out.extend(simple.chars());
                }
            }
        }
    }
    out
}

/// Break text into display lines no wider than `max_cols`. Hard line breaks
/// are kept; words longer than a line are split.
pub fn wrap(text: &str, max_cols: usize) -> Vec<Vec<char>> {
    let max_cols = max_cols.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let chars = prepare_line(paragraph);
        if chars.len() <= max_cols {
            lines.push(chars);
            continue;
        }
        let mut line: Vec<char> = Vec::new();
        for word in chars.split_inclusive(|c| *c == ' ') {
            if line.len() + word.iter().filter(|c| **c != ' ').count() > max_cols && !line.is_empty() {
                trim_end(&mut line);
                lines.push(std::mem::take(&mut line));
            }
            let mut rest = word;
            while line.len() + rest.len() > max_cols && rest.iter().any(|c| *c != ' ') && line.is_empty() {
                let (head, tail) = rest.split_at(max_cols.min(rest.len()));
                lines.push(head.to_vec());
                rest = tail;
            }
            line.extend_from_slice(rest);
        }
        trim_end(&mut line);
        lines.push(line);
    }
    lines
}

fn trim_end(line: &mut Vec<char>) {
    while line.last() == Some(&' ') {
        line.pop();
    }
}

/// Draw `text` inside `rect`. Text starts at the top of the box and may
/// overflow it vertically, as on the web card.
pub fn draw_text(canvas: &mut Canvas, rect: Rect, text: &str, style: TextStyle) {
    let source = GlyphSource::for_size(style.size);
    let (cell_w, cell_h) = style.cell();
    if cell_w <= 0.0 {
        return;
    }
    let max_cols = (rect.w / cell_w).floor() as usize;
    let line_height = style.size * LINE_HEIGHT;
    let top_pad = (line_height - cell_h) / 2.0;
    let bold_offset = (cell_w / 6.0).round().max(1.0) as i64;

    for (i, line) in wrap(text, max_cols).iter().enumerate() {
        let line_w = line.len() as f32 * cell_w;
        let x0 = match style.align {
            TextAlign::Left => rect.x,
            TextAlign::Center => rect.x + (rect.w - line_w) / 2.0,
            TextAlign::Right => rect.x + rect.w - line_w,
        };
        let y0 = rect.y + i as f32 * line_height + top_pad;
        for (col, ch) in line.iter().enumerate() {
            if *ch == ' ' {
                continue;
            }
            let glyph = source.glyph(*ch);
            let gx = x0 + col as f32 * cell_w;
            blit_glyph(canvas, &glyph, gx, y0, cell_w, cell_h, style.color, 0);
            if style.bold {
                blit_glyph(canvas, &glyph, gx, y0, cell_w, cell_h, style.color, bold_offset);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn blit_glyph(
    canvas: &mut Canvas,
    glyph: &Glyph,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    color: Rgba<u8>,
    dx: i64,
) {
    let (pw, ph) = (w.round().max(1.0) as i64, h.round().max(1.0) as i64);
    let (left, top) = (x.round() as i64, y.round() as i64);
    // Visible rows and columns only.
    let rows = (-top).max(0)..(canvas.height() as i64 - top).min(ph);
    let cols = (-(left + dx)).max(0)..(canvas.width() as i64 - left - dx).min(pw);
    for py in rows {
        let sy = (py as usize * glyph.height) / ph as usize;
        for px in cols.clone() {
            let sx = (px as usize * glyph.width) / pw as usize;
            if glyph.bits[sy * glyph.width + sx] {
                canvas.blend(left + px + dx, top + py, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::paint::{BLACK, WHITE};
    use pretty_assertions::assert_eq;

    fn lines(text: &str, cols: usize) -> Vec<String> {
        wrap(text, cols).into_iter().map(|l| l.into_iter().collect()).collect()
    }

    #[test]
    fn test_tabs_expand_to_stops() {
        assert_eq!(lines("Dept\t\t: CSE", 80), vec!["Dept            : CSE"]);
        assert_eq!(lines("Name\t: A", 80), vec!["Name    : A"]);
    }

    #[test]
    fn test_hard_breaks_kept() {
        assert_eq!(lines("Chennai\nTamil Nadu", 80), vec!["Chennai", "Tamil Nadu"]);
    }

    #[test]
    fn test_word_wrap() {
        assert_eq!(lines("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(lines("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_typographic_quotes_simplified() {
        assert_eq!(lines("\u{201C}Hi\u{201D} \u{2013} ok", 80), vec!["\"Hi\" - ok"]);
    }

    #[test]
    fn test_draw_text_marks_pixels() {
        let mut c = Canvas::new(100, 40);
        let style = TextStyle {
            size: 24.0,
            bold: false,
            color: BLACK,
            align: TextAlign::Left,
        };
        draw_text(&mut c, Rect::new(0.0, 0.0, 100.0, 30.0), "HI", style);
        let img = c.into_image();
        assert!(img.pixels().any(|p| *p == BLACK));
        // Right part of the box stays empty for left-aligned text.
        assert!((60..100).all(|x| (0..40).all(|y| *img.get_pixel(x, y) == WHITE)));
    }
}
