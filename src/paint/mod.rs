//! Paint module - dab compositing, undo tracking and the pixel-loop kernel

pub mod airbrush;
pub mod blend;
pub mod compositor;
pub mod loops;
pub mod modes;
pub mod undo;

pub use airbrush::{interval_for_rate, RepeatTimer};
pub use blend::{BlendMode, Rgba};
pub use compositor::{Compositor, PaintBuffer, PlacedMask};
pub use loops::{PixelLoopConfig, PixelLoops, PIXELS_PER_THREAD};
pub use modes::{Compositing, FillContext, PaintMode, Smudge, SourceFill};
pub use undo::{MemoryUndoLog, UndoEntry, UndoLog, UndoTracker};

use serde::{Deserialize, Serialize};

/// Accumulation semantics of the dabs of one stroke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PaintApplicationMode {
    /// Coverage accumulates by maximum; overlapping dabs never darken twice
    #[default]
    Continuous,
    /// Every dab composites onto the current surface
    Incremental,
}
