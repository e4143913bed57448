//! Stroke data model.
//!
//! A [`StrokeSegment`] is what a client draws and sends; a [`StrokeEvent`] is
//! the same segment after the server has stamped it with its room and a
//! creation timestamp. Events are immutable once persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canvas background color. Strokes in this color are eraser strokes.
pub const ERASE_COLOR: &str = "#FFFFFF";

/// Ink color used by the pen tool.
pub const PEN_COLOR: &str = "#000000";

/// Upper bound on room id length (keys are length-prefixed with a u16).
pub const MAX_ROOM_ID_LEN: usize = 256;

/// Validation errors for drawing data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("room id must not be empty")]
    EmptyRoomId,

    #[error("room id is {0} bytes, limit is 256")]
    RoomIdTooLong(usize),

    #[error("coordinate '{0}' is not a finite number")]
    NonFiniteCoordinate(&'static str),

    #[error("stroke size must be a positive finite number, got {0}")]
    InvalidSize(f64),

    #[error("stroke color must not be empty")]
    EmptyColor,
}

/// Opaque, non-empty room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Result<Self, ModelError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ModelError::EmptyRoomId);
        }
        if id.len() > MAX_ROOM_ID_LEN {
            return Err(ModelError::RoomIdTooLong(id.len()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Color token as sent by clients (CSS hex notation in practice).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn pen() -> Self {
        Self(PEN_COLOR.to_string())
    }

    pub fn eraser() -> Self {
        Self(ERASE_COLOR.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved erase color.
    pub fn is_eraser(&self) -> bool {
        self.0.eq_ignore_ascii_case(ERASE_COLOR)
    }

    /// Parse `#RRGGBB` or `#RGB` into RGB bytes.
    pub fn to_rgb(&self) -> Option<[u8; 3]> {
        let hex = self.0.strip_prefix('#')?;
        match hex.len() {
            6 => {
                let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
                let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
                let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
                Some([r, g, b])
            }
            3 => {
                let mut rgb = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    rgb[i] = v * 17;
                }
                Some(rgb)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pen or eraser, derived from the color token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeKind {
    Draw,
    Erase,
}

/// One drawn line segment (or dot) as it travels on the wire.
///
/// Every field is required: a payload missing `size` fails to deserialize
/// rather than picking up a width inferred from its color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeSegment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub color: Color,
    pub size: f64,
}

impl StrokeSegment {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64, color: Color, size: f64) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            color,
            size,
        }
    }

    /// A zero-length segment, rendered as a dot.
    pub fn dot(x: f64, y: f64, color: Color, size: f64) -> Self {
        Self::new(x, y, x, y, color, size)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        for (name, value) in [
            ("x0", self.x0),
            ("y0", self.y0),
            ("x1", self.x1),
            ("y1", self.y1),
        ] {
            if !value.is_finite() {
                return Err(ModelError::NonFiniteCoordinate(name));
            }
        }
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(ModelError::InvalidSize(self.size));
        }
        if self.color.as_str().trim().is_empty() {
            return Err(ModelError::EmptyColor);
        }
        Ok(())
    }

    pub fn is_dot(&self) -> bool {
        self.x0 == self.x1 && self.y0 == self.y1
    }

    pub fn kind(&self) -> StrokeKind {
        if self.color.is_eraser() {
            StrokeKind::Erase
        } else {
            StrokeKind::Draw
        }
    }
}

/// A stroke segment stamped by the server with its room and creation time.
///
/// `timestamp` is milliseconds since the Unix epoch, strictly increasing in
/// insertion order across the whole store, so sorting by it reproduces the
/// order strokes were accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeEvent {
    pub room_id: RoomId,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub color: Color,
    pub size: f64,
    pub timestamp: u64,
}

impl StrokeEvent {
    pub fn new(room_id: RoomId, segment: StrokeSegment, timestamp: u64) -> Self {
        let StrokeSegment {
            x0,
            y0,
            x1,
            y1,
            color,
            size,
        } = segment;
        Self {
            room_id,
            x0,
            y0,
            x1,
            y1,
            color,
            size,
            timestamp,
        }
    }

    /// The geometry and style of this event, without room or timestamp.
    pub fn segment(&self) -> StrokeSegment {
        StrokeSegment::new(
            self.x0,
            self.y0,
            self.x1,
            self.y1,
            self.color.clone(),
            self.size,
        )
    }

    pub fn is_dot(&self) -> bool {
        self.x0 == self.x1 && self.y0 == self.y1
    }
}
