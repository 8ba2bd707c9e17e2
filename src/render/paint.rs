//! Pixel painting primitives for card rasterization.
//!
//! Everything here works in device pixels on an RGBA buffer with
//! source-over alpha blending. Geometry is clipped against the canvas, so
//! off-card elements are simply cut off.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::template::ObjectFit;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

const PLACEHOLDER_BG: Rgba<u8> = Rgba([229, 231, 235, 255]);
const PLACEHOLDER_FG: Rgba<u8> = Rgba([156, 163, 175, 255]);
const BROKEN_BG: Rgba<u8> = Rgba([243, 244, 246, 255]);

/// Axis-aligned rectangle in device pixels. May extend past the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Shrink by `by` on every side.
    pub fn inset(&self, by: f32) -> Self {
        Self {
            x: self.x + by,
            y: self.y + by,
            w: (self.w - 2.0 * by).max(0.0),
            h: (self.h - 2.0 * by).max(0.0),
        }
    }

    /// Whether the pixel centre `(px, py)` lies in this rect with corners
    /// rounded by `radius`.
    pub fn contains(&self, px: f32, py: f32, radius: f32) -> bool {
        if px < self.x || py < self.y || px >= self.x + self.w || py >= self.y + self.h {
            return false;
        }
        let r = radius.min(self.w / 2.0).min(self.h / 2.0);
        if r <= 0.0 {
            return true;
        }
        let cx = px.clamp(self.x + r, self.x + self.w - r);
        let cy = py.clamp(self.y + r, self.y + self.h - r);
        let (dx, dy) = (px - cx, py - cy);
        dx * dx + dy * dy <= r * r
    }
}

/// Parse a CSS colour: `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb()`, `rgba()` or a
/// handful of names.
pub fn parse_color(s: &str) -> Option<Rgba<u8>> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = s.to_ascii_lowercase();
    if let Some(args) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let parts: Vec<&str> = args.split(',').map(str::trim).collect();
        if parts.len() != 3 && parts.len() != 4 {
            return None;
        }
        let channel = |p: &str| p.parse::<f32>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8);
        let alpha = match parts.get(3) {
            Some(a) => (a.parse::<f32>().ok()?.clamp(0.0, 1.0) * 255.0).round() as u8,
            None => 255,
        };
        return Some(Rgba([
            channel(parts[0])?,
            channel(parts[1])?,
            channel(parts[2])?,
            alpha,
        ]));
    }
    match lower.as_str() {
        "white" => Some(WHITE),
        "black" => Some(BLACK),
        "transparent" => Some(Rgba([0, 0, 0, 0])),
        "red" => Some(Rgba([255, 0, 0, 255])),
        "green" => Some(Rgba([0, 128, 0, 255])),
        "blue" => Some(Rgba([0, 0, 255, 255])),
        "gray" | "grey" => Some(Rgba([128, 128, 128, 255])),
        _ => None,
    }
}

fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [0u8; 4];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            out[3] = 255;
            Some(Rgba(out))
        }
        6 | 8 => {
            let a = if hex.len() == 8 { byte(hex.get(6..8)?)? } else { 255 };
            Some(Rgba([
                byte(hex.get(0..2)?)?,
                byte(hex.get(2..4)?)?,
                byte(hex.get(4..6)?)?,
                a,
            ]))
        }
        _ => None,
    }
}

/// An RGBA drawing surface.
pub struct Canvas {
    img: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            img: RgbaImage::from_pixel(width.max(1), height.max(1), WHITE),
        }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn into_image(self) -> RgbaImage {
        self.img
    }

    /// Source-over blend one pixel. Out-of-bounds writes are dropped.
    pub fn blend(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x < 0 || y < 0 || x >= self.img.width() as i64 || y >= self.img.height() as i64 {
            return;
        }
        let dst = self.img.get_pixel_mut(x as u32, y as u32);
        *dst = over(*dst, color);
    }

    /// Pixel range covered by `rect`, clipped to the canvas.
    fn span(&self, rect: &Rect) -> (i64, i64, i64, i64) {
        let x0 = rect.x.floor().max(0.0) as i64;
        let y0 = rect.y.floor().max(0.0) as i64;
        let x1 = ((rect.x + rect.w).ceil() as i64).min(self.img.width() as i64);
        let y1 = ((rect.y + rect.h).ceil() as i64).min(self.img.height() as i64);
        (x0, y0, x1, y1)
    }

    pub fn fill(&mut self, rect: Rect, radius: f32, color: Rgba<u8>) {
        let (x0, y0, x1, y1) = self.span(&rect);
        for y in y0..y1 {
            for x in x0..x1 {
                if rect.contains(x as f32 + 0.5, y as f32 + 0.5, radius) {
                    self.blend(x, y, color);
                }
            }
        }
    }

    /// Border drawn inside `rect`, following the rounded corners.
    pub fn stroke(&mut self, rect: Rect, radius: f32, width: f32, color: Rgba<u8>) {
        if width <= 0.0 {
            return;
        }
        let inner = rect.inset(width);
        let inner_radius = (radius - width).max(0.0);
        let (x0, y0, x1, y1) = self.span(&rect);
        for y in y0..y1 {
            for x in x0..x1 {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                if rect.contains(px, py, radius) && !inner.contains(px, py, inner_radius) {
                    self.blend(x, y, color);
                }
            }
        }
    }

    /// Fill the whole canvas with a two-stop linear gradient. `angle` follows
    /// CSS: 0deg points up, 90deg points right.
    pub fn gradient(&mut self, from: Rgba<u8>, to: Rgba<u8>, angle: f32) {
        let (w, h) = (self.img.width() as f32, self.img.height() as f32);
        let theta = angle.to_radians();
        let (dx, dy) = (theta.sin(), -theta.cos());
        let len = (w * dx).abs() + (h * dy).abs();
        for (x, y, px) in self.img.enumerate_pixels_mut() {
            let (rx, ry) = (x as f32 + 0.5 - w / 2.0, y as f32 + 0.5 - h / 2.0);
            let t = if len > 0.0 {
                ((rx * dx + ry * dy) / len + 0.5).clamp(0.0, 1.0)
            } else {
                0.0
            };
            *px = over(WHITE, lerp(from, to, t));
        }
    }

    /// Draw `source` into `rect` using CSS `object-fit` semantics, clipped to
    /// the rounded rect.
    ///
    /// Only the part of the placed image that lands on both the element and
    /// the canvas is resampled, so element size does not bound memory use.
    pub fn image(&mut self, rect: Rect, radius: f32, source: &RgbaImage, fit: ObjectFit) {
        if rect.w < 1.0 || rect.h < 1.0 || source.width() == 0 || source.height() == 0 {
            return;
        }
        let (sw, sh) = (source.width() as f32, source.height() as f32);
        let placed = match fit {
            ObjectFit::Fill => rect,
            ObjectFit::Cover => centered(rect, (rect.w / sw).max(rect.h / sh), sw, sh),
            ObjectFit::Contain => centered(rect, (rect.w / sw).min(rect.h / sh), sw, sh),
        };
        if placed.w <= 0.0 || placed.h <= 0.0 {
            return;
        }

        let (ex0, ey0, ex1, ey1) = self.span(&rect);
        let (px0, py0, px1, py1) = self.span(&placed);
        let (x0, y0) = (ex0.max(px0), ey0.max(py0));
        let (x1, y1) = (ex1.min(px1), ey1.min(py1));
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        // Source window behind the visible device pixels.
        let (kx, ky) = (sw / placed.w, sh / placed.h);
        let src_x0 = (((x0 as f32 - placed.x) * kx).floor().max(0.0) as u32).min(source.width() - 1);
        let src_y0 = (((y0 as f32 - placed.y) * ky).floor().max(0.0) as u32).min(source.height() - 1);
        let src_x1 = (((x1 as f32 - placed.x) * kx).ceil().max(0.0) as u32)
            .clamp(src_x0 + 1, source.width());
        let src_y1 = (((y1 as f32 - placed.y) * ky).ceil().max(0.0) as u32)
            .clamp(src_y0 + 1, source.height());
        let window =
            imageops::crop_imm(source, src_x0, src_y0, src_x1 - src_x0, src_y1 - src_y0).to_image();
        let scaled = imageops::resize(
            &window,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
            FilterType::Triangle,
        );

        for (x, y, px) in scaled.enumerate_pixels() {
            let (cx, cy) = (x0 + x as i64, y0 + y as i64);
            if rect.contains(cx as f32 + 0.5, cy as f32 + 0.5, radius) {
                self.blend(cx, cy, *px);
            }
        }
    }

    /// Grey box with a user silhouette, for records without the image.
    pub fn silhouette(&mut self, rect: Rect, radius: f32) {
        self.fill(rect, radius, PLACEHOLDER_BG);
        let size = rect.w.min(rect.h);
        let cx = rect.x + rect.w / 2.0;
        let head = (cx, rect.y + rect.h * 0.38, size * 0.18);
        let body = (cx, rect.y + rect.h * 0.38 + size * 0.58, size * 0.34);
        let (x0, y0, x1, y1) = self.span(&rect);
        for y in y0..y1 {
            for x in x0..x1 {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                if !rect.contains(px, py, radius) {
                    continue;
                }
                let in_circle = |(ccx, ccy, r): (f32, f32, f32)| {
                    (px - ccx).powi(2) + (py - ccy).powi(2) <= r * r
                };
                if in_circle(head) || in_circle(body) {
                    self.blend(x, y, PLACEHOLDER_FG);
                }
            }
        }
    }

    /// Marker for an image that failed to load.
    pub fn broken(&mut self, rect: Rect, radius: f32) {
        self.fill(rect, radius, BROKEN_BG);
    }
}

/// `sw`x`sh` scaled by `scale` and centred in `rect`.
fn centered(rect: Rect, scale: f32, sw: f32, sh: f32) -> Rect {
    let (w, h) = (sw * scale, sh * scale);
    Rect::new(rect.x + (rect.w - w) / 2.0, rect.y + (rect.h - h) / 2.0, w, h)
}

fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src.0[3] as f32 / 255.0;
    if sa >= 1.0 {
        return src;
    }
    if sa <= 0.0 {
        return dst;
    }
    let da = dst.0[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let channel = |i: usize| {
        let c = (src.0[i] as f32 * sa + dst.0[i] as f32 * da * (1.0 - sa)) / out_a;
        c.round().clamp(0.0, 255.0) as u8
    };
    Rgba([channel(0), channel(1), channel(2), (out_a * 255.0).round() as u8])
}

fn lerp(a: Rgba<u8>, b: Rgba<u8>, t: f32) -> Rgba<u8> {
    let mix = |i: usize| (a.0[i] as f32 + (b.0[i] as f32 - a.0[i] as f32) * t).round() as u8;
    Rgba([mix(0), mix(1), mix(2), mix(3)])
}
