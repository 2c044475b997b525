//! Shared primitives of the paint core: errors and geometry.
//!
//! Nothing in here knows about brushes or surfaces beyond their names.

pub mod errors;
pub mod geometry;

pub use errors::{try_alloc, PaintError};
pub use geometry::{Rect, Vector2};
