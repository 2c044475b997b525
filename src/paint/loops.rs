//! Parallel pixel loops
//!
//! Work over a rectangular region is cut into horizontal bands whose
//! estimated cost is roughly `pixels_per_thread`. Bands are handed to rayon
//! and joined before returning; a region that fits in a single band runs
//! inline on the calling thread.
//!
//! Output exclusivity is enforced by the borrow checker: the row-based entry
//! points hand every band its own `&mut` slice of the output buffer.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::core::{PaintError, Rect};

/// Target amount of work per sub-range, in unit-cost pixels
pub const PIXELS_PER_THREAD: usize = 64 * 64;

/// Parallel kernel configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PixelLoopConfig {
    /// Unit-cost pixels per sub-range
    pub pixels_per_thread: usize,
    /// Worker threads; 0 uses the global rayon pool
    pub threads: usize,
}

impl Default for PixelLoopConfig {
    fn default() -> Self {
        Self {
            pixels_per_thread: PIXELS_PER_THREAD,
            threads: 0,
        }
    }
}

/// Work-partitioning primitive shared by mask generation and dab blending
pub struct PixelLoops {
    config: PixelLoopConfig,
    pool: Option<ThreadPool>,
}

impl std::fmt::Debug for PixelLoops {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelLoops")
            .field("config", &self.config)
            .field("dedicated_pool", &self.pool.is_some())
            .finish()
    }
}

impl Default for PixelLoops {
    fn default() -> Self {
        Self {
            config: PixelLoopConfig::default(),
            pool: None,
        }
    }
}

impl PixelLoops {
    pub fn new(config: PixelLoopConfig) -> Result<Self, PaintError> {
        let pool = if config.threads > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .thread_name(|i| format!("paint-loop-{}", i))
                .build()
                .map_err(|e| PaintError::InvalidInput(format!("thread pool: {}", e)))?;
            tracing::debug!("Pixel loops using dedicated pool of {} threads", config.threads);
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            config: PixelLoopConfig {
                pixels_per_thread: config.pixels_per_thread.max(1),
                ..config
            },
            pool,
        })
    }

    pub fn config(&self) -> PixelLoopConfig {
        self.config
    }

    /// Rows per band for a `width`-wide region at relative per-pixel `cost`
    pub fn rows_per_band(&self, width: usize, cost: f64) -> usize {
        let budget = self.config.pixels_per_thread as f64 / cost.max(f64::EPSILON);
        ((budget / width.max(1) as f64).ceil() as usize).max(1)
    }

    /// Split `area` into disjoint sub-ranges covering it exactly.
    ///
    /// Bands are horizontal; a single row wider than the budget is cut
    /// into column spans instead.
    pub fn partition(&self, area: Rect, cost: f64) -> Vec<Rect> {
        if area.is_empty() {
            return Vec::new();
        }
        let rows = self.rows_per_band(area.width as usize, cost);

        if area.height == 1 {
            let budget = (self.config.pixels_per_thread as f64 / cost.max(f64::EPSILON))
                .ceil()
                .max(1.0) as i32;
            return (area.x..area.right())
                .step_by(budget as usize)
                .map(|x| Rect::new(x, area.y, budget.min(area.right() - x), 1))
                .collect();
        }

        (area.y..area.bottom())
            .step_by(rows)
            .map(|y| Rect::new(area.x, y, area.width, (rows as i32).min(area.bottom() - y)))
            .collect()
    }

    /// Invoke `func` on every sub-range of `area`, concurrently when there
    /// is more than one, and collect the results in range order.
    /// `func` must not write state shared between ranges.
    pub fn distribute_area<R, F>(&self, area: Rect, cost: f64, func: F) -> Vec<R>
    where
        R: Send,
        F: Fn(Rect) -> R + Sync + Send,
    {
        let ranges = self.partition(area, cost);
        match ranges.len() {
            0 => Vec::new(),
            1 => vec![func(ranges[0])],
            _ => self.run(|| ranges.into_par_iter().map(|r| func(r)).collect()),
        }
    }

    /// Process a row-major buffer of rows `width` pixels wide with
    /// `channels` elements per pixel. Bands are sized in pixels.
    ///
    /// `func(first_row, band)` receives consecutive whole rows.
    pub fn process_rows<T, F>(
        &self,
        data: &mut [T],
        width: usize,
        channels: usize,
        cost: f64,
        func: F,
    ) where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        let stride = width * channels;
        if data.is_empty() || stride == 0 {
            return;
        }
        let height = data.len() / stride;
        let rows = self.rows_per_band(width, cost);

        if rows >= height {
            func(0, data);
            return;
        }

        self.run(|| {
            data.par_chunks_mut(rows * stride)
                .enumerate()
                .for_each(|(i, band)| func(i * rows, band))
        });
    }

    fn run<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}
