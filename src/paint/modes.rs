//! Paint modes
//!
//! A mode supplies the source content of each dab: it fills the paint
//! buffer and says how the buffer goes onto the surface. Masking and
//! compositing stay in the shared compositor.

use std::fmt;

use crate::brush::cache::BrushApplication;
use crate::brush::mask::{Pixmap, TempBuf};
use crate::brush::options::PaintOptions;
use crate::core::{try_alloc, PaintError, Rect};
use crate::input::Coords;
use crate::paint::blend::{self, BlendMode};
use crate::paint::compositor::PaintBuffer;
use crate::paint::undo::UndoTracker;
use crate::paint::PaintApplicationMode;
use crate::surface::Surface;

/// How a filled paint buffer is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositing {
    /// Composite over the destination with a blend mode
    Paste(BlendMode),
    /// Interpolate the destination toward the buffer, alpha included
    Replace,
}

/// What a mode sees while filling one dab
pub struct FillContext<'a> {
    pub surface: &'a Surface,
    /// Pre-stroke pixels of everything touched so far
    pub undo: &'a UndoTracker,
    pub coords: &'a Coords,
    pub options: &'a PaintOptions,
    /// Transformed pixmap of a color brush
    pub pixmap: Option<&'a Pixmap>,
    /// Rate dynamics output at this dab
    pub rate: f64,
    /// Brush force after dynamics
    pub force: f64,
}

/// Caller-supplied source content, e.g. an external color engine
pub trait SourceFill: Send {
    fn start(&mut self, _surface: &Surface, _options: &PaintOptions) -> Result<(), PaintError> {
        Ok(())
    }

    /// Fill `buffer` for the dab at `ctx.coords`
    fn fill(
        &mut self,
        buffer: &mut PaintBuffer,
        ctx: &FillContext<'_>,
    ) -> Result<Compositing, PaintError>;

    /// Called after the dab landed on `region`
    fn post_paint(&mut self, _region: Rect) {}

    fn finish(&mut self) {}
}

/// Smudge accumulator, sized to the paint buffer
#[derive(Debug, Clone, Default)]
pub struct Smudge {
    accum: Option<(usize, usize, Vec<f32>)>,
}

/// Source strategy of a paint core
#[derive(Default)]
pub enum PaintMode {
    #[default]
    Paintbrush,
    /// Paintbrush with binarized masks and pixel-centered lines
    Pencil,
    Eraser,
    /// Repeats the last dab on a timer while the pointer rests
    Airbrush,
    Smudge(Smudge),
    /// Copies pre-stroke pixels from a fixed offset
    Clone,
    /// Tiles an RGB or RGBA pattern anchored at the surface origin
    Pattern(Pixmap),
    External(Box<dyn SourceFill>),
}

impl fmt::Debug for PaintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaintMode::Paintbrush => f.write_str("Paintbrush"),
            PaintMode::Pencil => f.write_str("Pencil"),
            PaintMode::Eraser => f.write_str("Eraser"),
            PaintMode::Airbrush => f.write_str("Airbrush"),
            PaintMode::Smudge(s) => f.debug_tuple("Smudge").field(s).finish(),
            PaintMode::Clone => f.write_str("Clone"),
            PaintMode::Pattern(p) => write!(f, "Pattern({}x{})", p.width(), p.height()),
            PaintMode::External(_) => f.write_str("External"),
        }
    }
}

impl PaintMode {
    pub fn smudge() -> Self {
        PaintMode::Smudge(Smudge::default())
    }

    /// Pattern mode from RGB or RGBA data
    pub fn pattern(pattern: Pixmap) -> Result<Self, PaintError> {
        if !matches!(pattern.channels(), 3 | 4) || pattern.width() == 0 || pattern.height() == 0 {
            return Err(PaintError::InvalidInput(format!(
                "Pattern must be a non-empty RGB or RGBA buffer, got {}x{}x{}",
                pattern.width(),
                pattern.height(),
                pattern.channels()
            )));
        }
        Ok(PaintMode::Pattern(pattern))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PaintMode::Paintbrush => "Paintbrush",
            PaintMode::Pencil => "Pencil",
            PaintMode::Eraser => "Eraser",
            PaintMode::Airbrush => "Airbrush",
            PaintMode::Smudge(_) => "Smudge",
            PaintMode::Clone => "Clone",
            PaintMode::Pattern(_) => "Pattern",
            PaintMode::External(_) => "External",
        }
    }

    pub fn is_airbrush(&self) -> bool {
        matches!(self, PaintMode::Airbrush)
    }

    pub fn brush_application(&self, options: &PaintOptions) -> BrushApplication {
        match self {
            PaintMode::Pencil => BrushApplication::Hard,
            PaintMode::Airbrush => BrushApplication::Pressure,
            _ => options.brush_application,
        }
    }

    pub fn application_mode(&self, options: &PaintOptions) -> PaintApplicationMode {
        match self {
            PaintMode::Airbrush | PaintMode::Smudge(_) => PaintApplicationMode::Incremental,
            _ => options.application_mode,
        }
    }

    /// Whether line segments snap to pixel centers
    pub fn rounds_lines(&self, options: &PaintOptions) -> bool {
        self.brush_application(options) == BrushApplication::Hard
    }

    pub fn start(&mut self, surface: &Surface, options: &PaintOptions) -> Result<(), PaintError> {
        match self {
            PaintMode::Smudge(smudge) => {
                smudge.accum = None;
                Ok(())
            }
            PaintMode::External(ext) => ext.start(surface, options),
            _ => Ok(()),
        }
    }

    /// Whether the dab covering `region` has anything to paint
    pub fn pre_paint(&self, surface: &Surface, region: Rect, options: &PaintOptions) -> bool {
        match self {
            PaintMode::Clone => {
                let [ox, oy] = options.clone_offset;
                Rect::new(region.x + ox, region.y + oy, region.width, region.height)
                    .intersect(&surface.bounds())
                    .is_some()
            }
            _ => true,
        }
    }

    /// Fill `buffer` with this dab's source content
    pub fn paint(
        &mut self,
        buffer: &mut PaintBuffer,
        ctx: &FillContext<'_>,
    ) -> Result<Compositing, PaintError> {
        let options = ctx.options;
        match self {
            PaintMode::Paintbrush | PaintMode::Pencil | PaintMode::Airbrush => {
                fill_color(buffer, ctx);
                Ok(Compositing::Paste(options.blend_mode))
            }
            PaintMode::Eraser => {
                buffer.fill(options.background);
                if !ctx.surface.format().has_alpha() {
                    Ok(Compositing::Paste(BlendMode::Normal))
                } else if options.anti_erase {
                    Ok(Compositing::Paste(BlendMode::AntiErase))
                } else {
                    Ok(Compositing::Paste(BlendMode::Erase))
                }
            }
            PaintMode::Smudge(smudge) => {
                smudge.paint(buffer, ctx)?;
                Ok(Compositing::Replace)
            }
            PaintMode::Clone => {
                let [ox, oy] = options.clone_offset;
                let rect = buffer.rect();
                let source = Rect::new(rect.x + ox, rect.y + oy, rect.width, rect.height);
                let pixels = read_clipped(ctx.surface, ctx.undo, source)?;
                buffer.data_mut().copy_from_slice(&pixels);
                Ok(Compositing::Paste(options.blend_mode))
            }
            PaintMode::Pattern(pattern) => {
                fill_pattern(buffer, pattern);
                Ok(Compositing::Paste(options.blend_mode))
            }
            PaintMode::External(ext) => ext.fill(buffer, ctx),
        }
    }

    pub fn post_paint(&mut self, region: Rect) {
        if let PaintMode::External(ext) = self {
            ext.post_paint(region);
        }
    }

    pub fn finish(&mut self) {
        match self {
            PaintMode::Smudge(smudge) => smudge.accum = None,
            PaintMode::External(ext) => ext.finish(),
            _ => {}
        }
    }
}

impl Smudge {
    /// Mix the accumulator with the pixels under the dab:
    /// `accum = rate * accum + (1 - rate) * canvas`, then paint the accumulator
    fn paint(&mut self, buffer: &mut PaintBuffer, ctx: &FillContext<'_>) -> Result<(), PaintError> {
        let canvas = ctx.surface.read_rgba(buffer.rect())?;
        let (w, h) = (buffer.width(), buffer.height());

        let accum = match &mut self.accum {
            Some((aw, ah, data)) if *aw == w && *ah == h => data,
            slot => {
                // First dab, or the dab changed size: start from what is there.
                let fresh = slot.insert((w, h, canvas));
                buffer.data_mut().copy_from_slice(&fresh.2);
                return Ok(());
            }
        };

        let rate = (ctx.options.smudge_rate * ctx.rate).clamp(0.0, 1.0) as f32;
        for ((acc, cur), out) in accum
            .chunks_exact_mut(4)
            .zip(canvas.chunks_exact(4))
            .zip(buffer.data_mut().chunks_exact_mut(4))
        {
            let mixed = blend::replace(
                [cur[0], cur[1], cur[2], cur[3]],
                [acc[0], acc[1], acc[2], acc[3]],
                rate,
            );
            acc.copy_from_slice(&mixed);
            out.copy_from_slice(&mixed);
        }
        Ok(())
    }
}

fn fill_color(buffer: &mut PaintBuffer, ctx: &FillContext<'_>) {
    match ctx.pixmap {
        Some(pixmap) => buffer.fill_from_pixmap(pixmap, ctx.coords.x, ctx.coords.y),
        None => buffer.fill(ctx.options.color),
    }
}

fn fill_pattern(buffer: &mut PaintBuffer, pattern: &TempBuf<u8>) {
    let rect = buffer.rect();
    let (pw, ph) = (pattern.width() as i32, pattern.height() as i32);
    let has_alpha = pattern.channels() == 4;
    let width = buffer.width();

    for (row, line) in buffer.data_mut().chunks_exact_mut(width * 4).enumerate() {
        let py = (rect.y + row as i32).rem_euclid(ph) as isize;
        for (col, px) in line.chunks_exact_mut(4).enumerate() {
            let pxx = (rect.x + col as i32).rem_euclid(pw) as isize;
            for c in 0..3 {
                px[c] = pattern.get(pxx, py, c) as f32 / 255.0;
            }
            px[3] = if has_alpha {
                pattern.get(pxx, py, 3) as f32 / 255.0
            } else {
                1.0
            };
        }
    }
}

/// Pre-stroke RGBA of `rect`, transparent outside the surface
fn read_clipped(surface: &Surface, undo: &UndoTracker, rect: Rect) -> Result<Vec<f32>, PaintError> {
    let mut out = try_alloc(rect.area() * 4, 0.0f32)?;
    let Some(inside) = rect.intersect(&surface.bounds()) else {
        return Ok(out);
    };
    let pixels = undo.original_rgba(surface, inside)?;
    let row_len = inside.width as usize * 4;
    for (i, src) in pixels.chunks_exact(row_len).enumerate() {
        let y = (inside.y - rect.y) as usize + i;
        let start = (y * rect.width as usize + (inside.x - rect.x) as usize) * 4;
        out[start..start + row_len].copy_from_slice(src);
    }
    Ok(out)
}
