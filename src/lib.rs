//! Sutu paint core - turns pointer samples into brush dabs on a tiled surface
//!
//! A [`BrushCore`] owns one tool's stroke state. Samples go in through
//! `start` / `motion` / `finish`; the stroke interpolator spaces dabs along
//! the path, the mask cache prepares each dab's transformed mask, and the
//! compositor blends it onto the [`Surface`] while the undo tracker keeps
//! the pre-stroke tiles.

pub mod brush;
pub mod core;
pub mod input;
pub mod paint;
pub mod surface;

pub use brush::{Brush, BrushCore, PaintOptions, SharedBrush, StrokeSummary};
pub use crate::core::{PaintError, Rect};
pub use input::Coords;
pub use paint::{MemoryUndoLog, PaintApplicationMode, PaintMode, UndoLog};
pub use surface::{PixelFormat, Surface};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a `fmt` subscriber filtered by `RUST_LOG`, defaulting to
/// `sutu_paintcore=info`. Does nothing if a global subscriber is already set.
pub fn init_logging() {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sutu_paintcore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Paint core logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
