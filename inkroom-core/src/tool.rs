//! Drawing tools.
//!
//! The stroke width is decided here, once, when a segment is created. Nothing
//! downstream (server, storage, replay) ever infers a width from the color.

use crate::model::{Color, StrokeSegment};

/// Pen width.
pub const PEN_SIZE: f64 = 5.0;

pub const DEFAULT_ERASER_SIZE: f64 = 15.0;
pub const MIN_ERASER_SIZE: f64 = 5.0;
pub const MAX_ERASER_SIZE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Tool {
    #[default]
    Pen,
    Eraser { size: f64 },
}

impl Tool {
    /// Eraser with its size clamped to the supported range.
    pub fn eraser(size: f64) -> Self {
        let size = if size.is_finite() {
            size.clamp(MIN_ERASER_SIZE, MAX_ERASER_SIZE)
        } else {
            DEFAULT_ERASER_SIZE
        };
        Tool::Eraser { size }
    }

    pub fn color(&self) -> Color {
        match self {
            Tool::Pen => Color::pen(),
            Tool::Eraser { .. } => Color::eraser(),
        }
    }

    pub fn size(&self) -> f64 {
        match self {
            Tool::Pen => PEN_SIZE,
            Tool::Eraser { size } => *size,
        }
    }

    pub fn segment(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> StrokeSegment {
        StrokeSegment::new(x0, y0, x1, y1, self.color(), self.size())
    }

    /// Dot for a tap without movement.
    pub fn dot(&self, x: f64, y: f64) -> StrokeSegment {
        StrokeSegment::dot(x, y, self.color(), self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StrokeKind;

    #[test]
    fn test_pen_has_explicit_width() {
        let seg = Tool::Pen.segment(0.0, 0.0, 1.0, 1.0);
        assert_eq!(seg.size, PEN_SIZE);
        assert_eq!(seg.kind(), StrokeKind::Draw);
    }

    #[test]
    fn test_eraser_clamps_size() {
        assert_eq!(Tool::eraser(1.0).size(), MIN_ERASER_SIZE);
        assert_eq!(Tool::eraser(500.0).size(), MAX_ERASER_SIZE);
        assert_eq!(Tool::eraser(f64::NAN).size(), DEFAULT_ERASER_SIZE);
        assert_eq!(Tool::eraser(20.0).size(), 20.0);
    }

    #[test]
    fn test_eraser_dot() {
        let dot = Tool::eraser(25.0).dot(4.0, 4.0);
        assert!(dot.is_dot());
        assert_eq!(dot.kind(), StrokeKind::Erase);
        assert_eq!(dot.size, 25.0);
    }
}
