//! History replay onto a drawing surface.
//!
//! Replay is an ordered fold over immutable events: clear the surface, then
//! draw every segment in timestamp order. Erasers are ordinary draws in the
//! background color, so order is the only thing that makes the composited
//! result correct. Replaying the same history twice yields the same pixels.

use crate::model::{StrokeEvent, StrokeSegment};

/// Anything that can draw a line/dot segment with a color and width.
pub trait SegmentRenderer {
    /// Wipe the surface back to the background.
    fn clear(&mut self);

    /// Draw one segment. Zero-length segments must still leave a visible dot.
    fn draw_segment(&mut self, segment: &StrokeSegment);
}

/// Clear `renderer` and draw `history` in order. Returns the number of
/// segments drawn.
pub fn replay<'a, R, I>(renderer: &mut R, history: I) -> usize
where
    R: SegmentRenderer + ?Sized,
    I: IntoIterator<Item = &'a StrokeEvent>,
{
    renderer.clear();
    let mut drawn = 0;
    for event in history {
        renderer.draw_segment(&event.segment());
        drawn += 1;
    }
    log::debug!("Replayed {drawn} stroke events");
    drawn
}

const BACKGROUND: [u8; 3] = [0xFF, 0xFF, 0xFF];
const FALLBACK_INK: [u8; 3] = [0x00, 0x00, 0x00];

/// In-memory RGB raster with round line caps.
///
/// A pixel is painted when its center lies within `size / 2` of the segment.
/// Dots always paint at least the pixel that contains them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 3]>,
}

impl Raster {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![BACKGROUND; width as usize * height as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(self.index(x, y)).copied()
    }

    /// Number of pixels that differ from the background.
    pub fn painted(&self) -> usize {
        self.pixels.iter().filter(|p| **p != BACKGROUND).count()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn paint(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let idx = self.index(x, y);
        if let Some(px) = self.pixels.get_mut(idx) {
            *px = rgb;
        }
    }
}

impl SegmentRenderer for Raster {
    fn clear(&mut self) {
        self.pixels.fill(BACKGROUND);
    }

    fn draw_segment(&mut self, segment: &StrokeSegment) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let rgb = segment.color.to_rgb().unwrap_or(FALLBACK_INK);
        let radius = (segment.size / 2.0).max(0.5);

        let min_x = segment.x0.min(segment.x1) - radius;
        let max_x = segment.x0.max(segment.x1) + radius;
        let min_y = segment.y0.min(segment.y1) - radius;
        let max_y = segment.y0.max(segment.y1) + radius;

        let clamp_x = |v: f64| v.floor().clamp(0.0, (self.width - 1) as f64) as u32;
        let clamp_y = |v: f64| v.floor().clamp(0.0, (self.height - 1) as f64) as u32;
        if max_x < 0.0 || max_y < 0.0 || min_x >= self.width as f64 || min_y >= self.height as f64 {
            return;
        }
        let (x_start, x_end) = (clamp_x(min_x), clamp_x(max_x));
        let (y_start, y_end) = (clamp_y(min_y), clamp_y(max_y));

        for y in y_start..=y_end {
            for x in x_start..=x_end {
                let cx = x as f64 + 0.5;
                let cy = y as f64 + 0.5;
                let inside_pixel = segment.is_dot()
                    && segment.x0.floor() as i64 == x as i64
                    && segment.y0.floor() as i64 == y as i64;
                if inside_pixel || distance_to_segment(cx, cy, segment) <= radius {
                    self.paint(x, y, rgb);
                }
            }
        }
    }
}

/// Euclidean distance from `(px, py)` to the segment, treating a
/// zero-length segment as a point.
fn distance_to_segment(px: f64, py: f64, s: &StrokeSegment) -> f64 {
    let dx = s.x1 - s.x0;
    let dy = s.y1 - s.y0;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return ((px - s.x0).powi(2) + (py - s.y0).powi(2)).sqrt();
    }
    let t = (((px - s.x0) * dx + (py - s.y0) * dy) / len_sq).clamp(0.0, 1.0);
    let nx = s.x0 + t * dx;
    let ny = s.y0 + t * dy;
    ((px - nx).powi(2) + (py - ny).powi(2)).sqrt()
}
