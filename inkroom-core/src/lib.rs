//! # inkroom-core: Shared drawing model for Inkroom
//!
//! Types shared by the sync server and its clients:
//!
//! - [`model`]: Stroke segments, persisted stroke events, colors, room ids
//! - [`tool`]: Pen/eraser tools; the single place a stroke width is chosen
//! - [`replay`]: Deterministic history replay onto a segment renderer
//!
//! ```text
//!  Tool ──segment()──▸ StrokeSegment ──server stamps──▸ StrokeEvent
//!                                                          │
//!                           SegmentRenderer ◂──replay()────┘
//! ```

pub mod model;
pub mod replay;
pub mod tool;

pub use model::{
    Color, ModelError, RoomId, StrokeEvent, StrokeKind, StrokeSegment, ERASE_COLOR,
    PEN_COLOR,
};
pub use replay::{replay, Raster, SegmentRenderer};
pub use tool::{Tool, DEFAULT_ERASER_SIZE, MAX_ERASER_SIZE, MIN_ERASER_SIZE, PEN_SIZE};
