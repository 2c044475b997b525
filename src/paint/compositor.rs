//! Dab compositor
//!
//! Every dab is painted through a scratch paint buffer covering the dab's
//! bounds plus a one-pixel border, clipped to the surface. A paint mode
//! fills the buffer with source color; `paste` or `replace` then applies
//! it through the dab mask:
//!
//! - CONTINUOUS: the mask is folded into a per-stroke coverage canvas with
//!   `c += (opacity - c) * mask * opacity` (only where `opacity > c`), and the
//!   buffer is composited over the *pre-stroke* pixels with alpha scaled by
//!   `c`. Overlapping dabs therefore never stack.
//! - INCREMENTAL: buffer alpha is scaled by `mask * opacity` and composited
//!   over the current pixels, so overlapping dabs accumulate.
//!
//! Writes are preceded by an undo touch of the same rectangle.

use std::collections::HashMap;

use crate::brush::cache::DabMask;
use crate::brush::mask::Pixmap;
use crate::core::{try_alloc, PaintError, Rect};
use crate::paint::blend::{self, BlendMode, Rgba};
use crate::paint::loops::PixelLoops;
use crate::paint::undo::{UndoEntry, UndoTracker};
use crate::paint::PaintApplicationMode;
use crate::surface::{Surface, TILE_SIZE};

/// Relative per-pixel cost of a blend pass
const BLEND_COST: f64 = 2.0;

/// Scratch RGBA buffer placed on the surface
#[derive(Debug, Clone)]
pub struct PaintBuffer {
    x: i32,
    y: i32,
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl PaintBuffer {
    fn new(x: i32, y: i32, width: usize, height: usize) -> Result<Self, PaintError> {
        Ok(Self {
            x,
            y,
            width,
            height,
            data: try_alloc(width * height * 4, 0.0f32)?,
        })
    }

    /// Surface rectangle covered by the buffer
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width as i32, self.height as i32)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Straight-alpha RGBA, row-major
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Pixel at buffer-local `(x, y)`
    pub fn pixel(&self, x: usize, y: usize) -> Rgba {
        let i = (y * self.width + x) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn fill(&mut self, color: Rgba) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    /// Fill from a color brush pixmap centered on `(cx, cy)`, tiled by its size
    pub fn fill_from_pixmap(&mut self, pixmap: &Pixmap, cx: f64, cy: f64) {
        let (pw, ph) = (pixmap.width() as i32, pixmap.height() as i32);
        if pw == 0 || ph == 0 {
            return;
        }
        let ulx = cx.floor() as i32 - (pw >> 1);
        let uly = cy.floor() as i32 - (ph >> 1);
        let width = self.width;

        for (row, line) in self.data.chunks_exact_mut(width * 4).enumerate() {
            let py = (self.y + row as i32 - uly).rem_euclid(ph) as isize;
            for (col, px) in line.chunks_exact_mut(4).enumerate() {
                let pxx = (self.x + col as i32 - ulx).rem_euclid(pw) as isize;
                for c in 0..3 {
                    px[c] = pixmap.get(pxx, py, c) as f32 / 255.0;
                }
                px[3] = 1.0;
            }
        }
    }
}

/// Per-stroke coverage accumulator in sparse tiles
#[derive(Debug, Default)]
struct CoverageCanvas {
    tiles: HashMap<(i32, i32), Vec<f32>>,
}

impl CoverageCanvas {
    fn clear(&mut self) {
        self.tiles.clear();
    }

    fn tile_keys(rect: Rect) -> impl Iterator<Item = (i32, i32)> {
        let tx0 = rect.x.div_euclid(TILE_SIZE);
        let ty0 = rect.y.div_euclid(TILE_SIZE);
        let tx1 = (rect.right() - 1).div_euclid(TILE_SIZE);
        let ty1 = (rect.bottom() - 1).div_euclid(TILE_SIZE);
        (ty0..=ty1).flat_map(move |ty| (tx0..=tx1).map(move |tx| (tx, ty)))
    }

    fn read(&self, rect: Rect) -> Result<Vec<f32>, PaintError> {
        let mut out = try_alloc(rect.area(), 0.0f32)?;
        for (tx, ty) in Self::tile_keys(rect) {
            let Some(tile) = self.tiles.get(&(tx, ty)) else {
                continue;
            };
            let tile_rect = Rect::new(tx * TILE_SIZE, ty * TILE_SIZE, TILE_SIZE, TILE_SIZE);
            let Some(span) = tile_rect.intersect(&rect) else {
                continue;
            };
            for y in span.y..span.bottom() {
                let src = ((y - tile_rect.y) * TILE_SIZE + span.x - tile_rect.x) as usize;
                let dst = ((y - rect.y) * rect.width + span.x - rect.x) as usize;
                let len = span.width as usize;
                out[dst..dst + len].copy_from_slice(&tile[src..src + len]);
            }
        }
        Ok(out)
    }

    fn write(&mut self, rect: Rect, data: &[f32]) -> Result<(), PaintError> {
        for (tx, ty) in Self::tile_keys(rect) {
            let tile_rect = Rect::new(tx * TILE_SIZE, ty * TILE_SIZE, TILE_SIZE, TILE_SIZE);
            let Some(span) = tile_rect.intersect(&rect) else {
                continue;
            };
            let tile = match self.tiles.entry((tx, ty)) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(try_alloc((TILE_SIZE * TILE_SIZE) as usize, 0.0f32)?)
                }
            };
            for y in span.y..span.bottom() {
                let dst = ((y - tile_rect.y) * TILE_SIZE + span.x - tile_rect.x) as usize;
                let src = ((y - rect.y) * rect.width + span.x - rect.x) as usize;
                let len = span.width as usize;
                tile[dst..dst + len].copy_from_slice(&data[src..src + len]);
            }
        }
        Ok(())
    }
}

/// Mask placed on the surface: mask pixel `(0, 0)` lands on `(x, y)`
#[derive(Debug, Clone, Copy)]
pub struct PlacedMask<'a> {
    pub mask: DabMask<'a>,
    pub x: i32,
    pub y: i32,
}

impl<'a> PlacedMask<'a> {
    /// Center `mask` on the dab position the way the paint buffer is placed
    pub fn centered(mask: DabMask<'a>, cx: f64, cy: f64) -> Self {
        Self {
            mask,
            x: cx.floor() as i32 - (mask.width() as i32 >> 1),
            y: cy.floor() as i32 - (mask.height() as i32 >> 1),
        }
    }

    #[inline]
    fn value(&self, sx: i32, sy: i32) -> f32 {
        self.mask.value((sx - self.x) as isize, (sy - self.y) as isize)
    }
}

/// Scratch buffer, coverage canvas and undo snapshot of one paint core
#[derive(Debug, Default)]
pub struct Compositor {
    buffer: Option<PaintBuffer>,
    canvas: CoverageCanvas,
    undo: UndoTracker,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop stroke state; called at stroke start
    pub fn begin_stroke(&mut self) {
        self.canvas.clear();
        self.undo.reset();
    }

    pub fn undo(&self) -> &UndoTracker {
        &self.undo
    }

    /// Accumulated bounding box of every pixel written this stroke
    pub fn dirty_region(&self) -> Option<Rect> {
        self.undo.extent()
    }

    /// Restore the pre-stroke surface and drop stroke state
    pub fn cancel(&mut self, surface: &mut Surface) {
        self.undo.restore(surface);
        self.canvas.clear();
        self.buffer = None;
    }

    /// Package the stroke for the undo log and drop stroke state
    pub fn commit(&mut self, surface: &Surface, name: &str) -> Option<UndoEntry> {
        self.canvas.clear();
        self.undo.commit(surface, name)
    }

    pub fn paint_buffer(&self) -> Option<&PaintBuffer> {
        self.buffer.as_ref()
    }

    pub fn paint_buffer_mut(&mut self) -> Option<&mut PaintBuffer> {
        self.buffer.as_mut()
    }

    /// Paint buffer to fill, alongside the pre-stroke pixels it may read
    pub fn fill_target(&mut self) -> Option<(&mut PaintBuffer, &UndoTracker)> {
        let Self { buffer, undo, .. } = self;
        buffer.as_mut().map(|b| (b, &*undo))
    }

    /// Position the paint buffer for a `dab_width` x `dab_height` dab at
    /// `(cx, cy)`. Returns `None` when the dab misses the surface.
    ///
    /// The buffer is reallocated only when its size changes.
    pub fn get_paint_buffer(
        &mut self,
        surface: &Surface,
        cx: f64,
        cy: f64,
        dab_width: usize,
        dab_height: usize,
    ) -> Result<Option<&mut PaintBuffer>, PaintError> {
        let (dw, dh) = (dab_width as i32, dab_height as i32);
        let x = cx.floor() as i32 - dw / 2;
        let y = cy.floor() as i32 - dh / 2;

        let x1 = (x - 1).clamp(0, surface.width());
        let y1 = (y - 1).clamp(0, surface.height());
        let x2 = (x + dw + 1).clamp(0, surface.width());
        let y2 = (y + dh + 1).clamp(0, surface.height());
        if x2 <= x1 || y2 <= y1 {
            return Ok(None);
        }
        let (width, height) = ((x2 - x1) as usize, (y2 - y1) as usize);

        let reuse = matches!(&self.buffer, Some(b) if b.width == width && b.height == height);
        if !reuse {
            tracing::trace!("Paint buffer reallocated at {}x{}", width, height);
            self.buffer = Some(PaintBuffer::new(x1, y1, width, height)?);
        }
        Ok(self.buffer.as_mut().map(|b| {
            b.x = x1;
            b.y = y1;
            b
        }))
    }

    /// Fold `mask * opacity` into the coverage canvas over `rect`; returns
    /// the updated coverage of `rect`
    fn combine_mask_to_canvas(
        &mut self,
        rect: Rect,
        mask: &PlacedMask<'_>,
        opacity: f32,
        loops: &PixelLoops,
    ) -> Result<Vec<f32>, PaintError> {
        let canvas = &self.canvas;
        let ranges = loops.distribute_area(rect, 1.0, |range| {
            let mut coverage = canvas.read(range)?;
            for (row, line) in coverage.chunks_mut(range.width as usize).enumerate() {
                let sy = range.y + row as i32;
                for (col, c) in line.iter_mut().enumerate() {
                    if opacity > *c {
                        let m = mask.value(range.x + col as i32, sy);
                        *c += (opacity - *c) * m * opacity;
                    }
                }
            }
            Ok::<_, PaintError>((range, coverage))
        });
        for range in ranges {
            let (range, coverage) = range?;
            self.canvas.write(range, &coverage)?;
        }
        self.canvas.read(rect)
    }

    /// Composite the paint buffer through `mask` onto `surface`
    #[allow(clippy::too_many_arguments)]
    pub fn paste(
        &mut self,
        surface: &mut Surface,
        mask: &PlacedMask<'_>,
        paint_opacity: f32,
        image_opacity: f32,
        blend_mode: BlendMode,
        mode: PaintApplicationMode,
        loops: &PixelLoops,
    ) -> Result<(), PaintError> {
        surface.format().ensure_paintable()?;
        let Some(rect) = self.buffer.as_ref().map(PaintBuffer::rect) else {
            return Ok(());
        };
        let width = rect.width as usize;
        let stride = width * 4;

        self.undo.touch(surface, rect);

        let (base, coverage) = match mode {
            PaintApplicationMode::Continuous => {
                let coverage = self.combine_mask_to_canvas(rect, mask, paint_opacity, loops)?;
                (self.undo.original_rgba(surface, rect)?, Some(coverage))
            }
            PaintApplicationMode::Incremental => (surface.read_rgba(rect)?, None),
        };

        let Some(buffer) = self.buffer.as_mut() else {
            return Ok(());
        };
        loops.process_rows(buffer.data_mut(), width, 4, BLEND_COST, |y0, band| {
            for (i, row) in band.chunks_mut(stride).enumerate() {
                let by = y0 + i;
                let sy = rect.y + by as i32;
                for (col, px) in row.chunks_exact_mut(4).enumerate() {
                    let idx = by * width + col;
                    let alpha = match &coverage {
                        Some(c) => c[idx],
                        None => mask.value(rect.x + col as i32, sy) * paint_opacity,
                    };
                    let src = [px[0], px[1], px[2], px[3] * alpha];
                    let dst = [
                        base[idx * 4],
                        base[idx * 4 + 1],
                        base[idx * 4 + 2],
                        base[idx * 4 + 3],
                    ];
                    px.copy_from_slice(&blend::composite(dst, src, image_opacity, blend_mode));
                }
            }
        });

        surface.write_rgba(rect, buffer.data())
    }

    /// Replace surface pixels with the paint buffer, weighted by `mask`.
    ///
    /// Transparent paint makes the surface transparent. Surfaces without
    /// alpha fall back to a normal paste.
    pub fn replace(
        &mut self,
        surface: &mut Surface,
        mask: &PlacedMask<'_>,
        paint_opacity: f32,
        image_opacity: f32,
        mode: PaintApplicationMode,
        loops: &PixelLoops,
    ) -> Result<(), PaintError> {
        if !surface.format().has_alpha() {
            return self.paste(
                surface,
                mask,
                paint_opacity,
                image_opacity,
                BlendMode::Normal,
                mode,
                loops,
            );
        }
        surface.format().ensure_paintable()?;
        let Some(rect) = self.buffer.as_ref().map(PaintBuffer::rect) else {
            return Ok(());
        };
        let width = rect.width as usize;
        let stride = width * 4;

        self.undo.touch(surface, rect);

        let coverage = match mode {
            PaintApplicationMode::Continuous => {
                Some(self.combine_mask_to_canvas(rect, mask, paint_opacity, loops)?)
            }
            PaintApplicationMode::Incremental => None,
        };
        let base = surface.read_rgba(rect)?;

        let Some(buffer) = self.buffer.as_mut() else {
            return Ok(());
        };
        loops.process_rows(buffer.data_mut(), width, 4, BLEND_COST, |y0, band| {
            for (i, row) in band.chunks_mut(stride).enumerate() {
                let by = y0 + i;
                let sy = rect.y + by as i32;
                for (col, px) in row.chunks_exact_mut(4).enumerate() {
                    let idx = by * width + col;
                    let amount = match &coverage {
                        Some(c) => c[idx],
                        None => mask.value(rect.x + col as i32, sy) * paint_opacity,
                    };
                    let dst = [
                        base[idx * 4],
                        base[idx * 4 + 1],
                        base[idx * 4 + 2],
                        base[idx * 4 + 3],
                    ];
                    let src = [px[0], px[1], px[2], px[3]];
                    px.copy_from_slice(&blend::replace(dst, src, amount * image_opacity));
                }
            }
        });

        surface.write_rgba(rect, buffer.data())
    }
}
