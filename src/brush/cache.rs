//! Mask transform cache
//!
//! Four layers sit between a brush resource and the dab compositor:
//!
//! 1. **Transform**: the brush mask (and pixmap) scaled, rotated and
//!    softened for the current dab parameters. Keyed by brush id, brush
//!    generation and the full parameter tuple.
//! 2. **Subsample**: the transformed mask convolved with a phase kernel so
//!    it lands on the dab's subpixel position. One entry per phase pair.
//! 3. **Solid**: the transformed mask binarized, one entry per offset parity.
//! 4. **Pressure**: a subsampled mask remapped through a pressure curve.
//!
//! Layers 2 and 3 compare the identity of the mask they were built from on
//! every access and drop all entries when it differs, so a hit can never be
//! served from a stale source. Rebuilding layer 1 also flags both layers
//! invalid explicitly.

use serde::{Deserialize, Serialize};

use super::kernels::{kernel, KERNEL_HEIGHT, KERNEL_SUBSAMPLE, KERNEL_SUM, KERNEL_WIDTH};
use super::mask::{Pixmap, TempBuf};
use super::transform::{transform_buffer, TransformParams};
use super::Brush;
use crate::core::PaintError;
use crate::paint::loops::PixelLoops;

const PHASES: usize = KERNEL_SUBSAMPLE + 1;

/// Offsets per axis in the solid layer
const SOLID_SUBSAMPLE: usize = 2;

/// Relative cost of one 3x3 convolution tap set
const CONVOLVE_COST: f64 = (KERNEL_WIDTH * KERNEL_HEIGHT) as f64 / 2.0;

/// How a dab's mask is derived from the transformed brush mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BrushApplication {
    /// Antialiased, subpixel positioned
    #[default]
    Soft,
    /// Binarized, pixel aligned
    Hard,
    /// Antialiased and remapped by pressure
    Pressure,
}

/// Response profile of the pressure layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PressureProfile {
    /// Doubles coverage at full pressure, clamps at 255
    #[default]
    Linear,
    /// Hyperbolic tangent profile
    Smooth,
}

/// Mask ready for compositing, `width + 2` x `height + 2` of the source
#[derive(Debug, Clone, Copy)]
pub enum DabMask<'a> {
    Coverage(&'a TempBuf<u8>),
    Solid(&'a TempBuf<f32>),
}

impl DabMask<'_> {
    pub fn width(&self) -> usize {
        match self {
            DabMask::Coverage(m) => m.width(),
            DabMask::Solid(m) => m.width(),
        }
    }

    pub fn height(&self) -> usize {
        match self {
            DabMask::Coverage(m) => m.height(),
            DabMask::Solid(m) => m.height(),
        }
    }

    /// Coverage in 0.0 - 1.0; zero outside the mask
    #[inline]
    pub fn value(&self, x: isize, y: isize) -> f32 {
        match self {
            DabMask::Coverage(m) => m.get(x, y, 0) as f32 / 255.0,
            DabMask::Solid(m) => m.get(x, y, 0),
        }
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// Take the cached value or build it, then store and borrow it
fn fill<T>(
    slot: &mut Option<T>,
    build: impl FnOnce() -> Result<T, PaintError>,
) -> Result<&T, PaintError> {
    let value = match slot.take() {
        Some(v) => v,
        None => build()?,
    };
    Ok(&*slot.insert(value))
}

/// Subpixel phase index and destination offset along one axis
fn subsample_phase(pos: f64, size: usize) -> (usize, usize) {
    let left = pos - pos.floor();
    let mut index = (left * PHASES as f64) as usize;
    let mut offset = 0;
    if size % 2 == 0 {
        index += KERNEL_SUBSAMPLE >> 1;
        if index > KERNEL_SUBSAMPLE {
            index -= PHASES;
            offset = 1;
        }
    }
    (index.min(KERNEL_SUBSAMPLE), offset)
}

#[derive(Debug, Default, Clone, PartialEq)]
struct TransformKey {
    brush_id: u64,
    generation: u64,
    params: Option<TransformParamsKey>,
}

/// Bitwise parameter key so that NaN-free floats compare exactly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TransformParamsKey([u64; 4], bool);

impl From<&TransformParams> for TransformParamsKey {
    fn from(p: &TransformParams) -> Self {
        Self(
            [
                p.scale.to_bits(),
                p.aspect_ratio.to_bits(),
                p.angle.to_bits(),
                p.hardness.to_bits(),
            ],
            p.reflect,
        )
    }
}

#[derive(Debug, Default)]
struct TransformLayer {
    mask_key: Option<TransformKey>,
    mask: Option<TempBuf<u8>>,
    pixmap_key: Option<TransformKey>,
    pixmap: Option<Pixmap>,
}

impl TransformLayer {
    fn drop_pixmap(&mut self) {
        self.pixmap = None;
        self.pixmap_key = None;
    }
}

#[derive(Debug, Default)]
struct SubsampleLayer {
    source: Option<u64>,
    invalid: bool,
    slots: [[Option<TempBuf<u8>>; PHASES]; PHASES],
}

impl SubsampleLayer {
    fn get(
        &mut self,
        mask: &TempBuf<u8>,
        x: f64,
        y: f64,
        loops: &PixelLoops,
        stats: &mut CacheStats,
    ) -> Result<&TempBuf<u8>, PaintError> {
        let (index_x, offset_x) = subsample_phase(x, mask.width());
        let (index_y, offset_y) = subsample_phase(y, mask.height());

        if self.invalid || self.source != Some(mask.id()) {
            if self.source.is_some() {
                tracing::trace!("Subsample cache dropped for mask {}", mask.id());
                stats.invalidations += 1;
            }
            self.slots = Default::default();
            self.source = Some(mask.id());
            self.invalid = false;
        }

        let slot = &mut self.slots[index_y][index_x];
        if slot.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        fill(slot, || {
            subsample_mask(mask, index_y, index_x, offset_y, offset_x, loops)
        })
    }
}

/// Convolve `mask` with the phase kernel into a buffer with a 1-pixel border
fn subsample_mask(
    mask: &TempBuf<u8>,
    index_y: usize,
    index_x: usize,
    offset_y: usize,
    offset_x: usize,
    loops: &PixelLoops,
) -> Result<TempBuf<u8>, PaintError> {
    let k = kernel(index_y, index_x);
    let dest_w = mask.width() + 2;
    let mut dest = TempBuf::<u8>::new(dest_w, mask.height() + 2)?;
    let (oy, ox) = (offset_y as isize, offset_x as isize);

    loops.process_rows(dest.data_mut(), dest_w, 1, CONVOLVE_COST, |y0, band| {
        for (i, row) in band.chunks_mut(dest_w).enumerate() {
            let y = (y0 + i) as isize;
            for (x, d) in row.iter_mut().enumerate() {
                let x = x as isize;
                let mut acc = 0u32;
                for (r, krow) in k.iter().enumerate() {
                    for (s, &weight) in krow.iter().enumerate() {
                        acc += mask.get(x - ox - s as isize, y - oy - r as isize, 0) as u32 * weight;
                    }
                }
                *d = ((acc + KERNEL_SUM / 2) / KERNEL_SUM) as u8;
            }
        }
    });
    Ok(dest)
}

#[derive(Debug, Default)]
struct SolidLayer {
    source: Option<u64>,
    invalid: bool,
    slots: [[Option<TempBuf<f32>>; SOLID_SUBSAMPLE]; SOLID_SUBSAMPLE],
}

impl SolidLayer {
    fn get(
        &mut self,
        mask: &TempBuf<u8>,
        x: f64,
        y: f64,
        stats: &mut CacheStats,
    ) -> Result<&TempBuf<f32>, PaintError> {
        let offset = |pos: f64, size: usize| usize::from(size % 2 == 0 && pos - pos.floor() >= 0.5);
        let offset_x = offset(x, mask.width());
        let offset_y = offset(y, mask.height());

        if self.invalid || self.source != Some(mask.id()) {
            if self.source.is_some() {
                tracing::trace!("Solid cache dropped for mask {}", mask.id());
                stats.invalidations += 1;
            }
            self.slots = Default::default();
            self.source = Some(mask.id());
            self.invalid = false;
        }

        let slot = &mut self.slots[offset_y][offset_x];
        if slot.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        fill(slot, || solidify_mask(mask, offset_y, offset_x))
    }
}

fn solidify_mask(
    mask: &TempBuf<u8>,
    offset_y: usize,
    offset_x: usize,
) -> Result<TempBuf<f32>, PaintError> {
    let dest_w = mask.width() + 2;
    let mut dest = TempBuf::<f32>::new(dest_w, mask.height() + 2)?;
    let data = dest.data_mut();
    for y in 0..mask.height() {
        let start = (y + offset_y + 1) * dest_w + offset_x + 1;
        for (d, &m) in data[start..start + mask.width()].iter_mut().zip(mask.row(y)) {
            *d = if m != 0 { 1.0 } else { 0.0 };
        }
    }
    Ok(dest)
}

#[derive(Debug, Default)]
struct PressureLayer {
    key: Option<(u64, i32, PressureProfile)>,
    mask: Option<TempBuf<u8>>,
}

impl PressureLayer {
    #[allow(clippy::too_many_arguments)]
    fn get<'a>(
        &'a mut self,
        subsample: &'a mut SubsampleLayer,
        mask: &TempBuf<u8>,
        x: f64,
        y: f64,
        pressure: f64,
        profile: PressureProfile,
        loops: &PixelLoops,
        stats: &mut CacheStats,
    ) -> Result<&'a TempBuf<u8>, PaintError> {
        let soft = subsample.get(mask, x, y, loops, stats)?;

        let bucket = (pressure * 100.0 + 0.5) as i32;
        if bucket == 50 {
            return Ok(soft);
        }

        let key = (soft.id(), bucket, profile);
        if self.key != Some(key) {
            self.mask = None;
            self.key = Some(key);
        }
        fill(&mut self.mask, || {
            let map = pressure_map(bucket as f64 / 100.0, profile);
            let data = soft.data().iter().map(|&v| map[v as usize]).collect();
            TempBuf::from_vec(soft.width(), soft.height(), data)
        })
    }
}

/// 256-entry coverage remapping for `pressure`
pub fn pressure_map(pressure: f64, profile: PressureProfile) -> [u8; 256] {
    let mut mapi = [0u8; 256];
    match profile {
        PressureProfile::Linear => {
            let step = pressure + pressure;
            let mut k = 0.0;
            for v in mapi.iter_mut() {
                *v = if k > 255.0 { 255 } else { k as u8 };
                k += step;
            }
        }
        PressureProfile::Smooth => {
            let mut map = [0.0f64; 256];
            let mut ds = (pressure - 0.5) * (20.0 / 256.0);
            let mut s = 0.0;
            let mut c = 1.0;
            if ds > 0.0 {
                for m in map.iter_mut() {
                    *m = s / c;
                    s += c * ds;
                    c += s * ds;
                }
                for (v, m) in mapi.iter_mut().zip(map.iter()) {
                    *v = (255.0 * m / map[255]) as u8;
                }
            } else if ds < 0.0 {
                ds = -ds;
                for m in map.iter_mut().rev() {
                    *m = s / c;
                    s += c * ds;
                    c += s * ds;
                }
                for (v, m) in mapi.iter_mut().zip(map.iter()) {
                    *v = (255.0 * (1.0 - m / map[0])) as u8;
                }
            } else {
                for (i, v) in mapi.iter_mut().enumerate() {
                    *v = i as u8;
                }
            }
        }
    }
    mapi
}

/// Mask transform cache owned by one paint core
#[derive(Debug, Default)]
pub struct MaskCache {
    transform: TransformLayer,
    subsample: SubsampleLayer,
    solid: SolidLayer,
    pressure: PressureLayer,
    profile: PressureProfile,
    stats: CacheStats,
}

impl MaskCache {
    pub fn new(profile: PressureProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Drop every cached entry
    pub fn invalidate(&mut self) {
        tracing::trace!("Mask cache invalidated");
        self.stats.invalidations += 1;
        self.transform = TransformLayer::default();
        self.subsample.invalid = true;
        self.solid.invalid = true;
        self.pressure = PressureLayer::default();
    }

    /// Bring the transform layer up to date for `brush` and `params`.
    ///
    /// Returns the transformed mask, or `None` when the scale is zero.
    pub fn transform_mask(
        &mut self,
        brush: &Brush,
        params: &TransformParams,
        loops: &PixelLoops,
    ) -> Result<Option<&TempBuf<u8>>, PaintError> {
        if params.scale <= 0.0 {
            self.transform.drop_pixmap();
            return Ok(None);
        }
        let key = TransformKey {
            brush_id: brush.id(),
            generation: brush.generation(),
            params: Some(params.into()),
        };
        let layer = &mut self.transform;
        if layer.mask_key.as_ref() != Some(&key) {
            tracing::trace!(
                "Transforming brush {} (generation {}) scale {:.3} angle {:.3}",
                brush.id(),
                brush.generation(),
                params.scale,
                params.angle
            );
            layer.drop_pixmap();
            layer.mask = Some(transform_buffer(brush.base_mask(), params, loops)?);
            layer.mask_key = Some(key);
            self.subsample.invalid = true;
            self.solid.invalid = true;
            self.stats.misses += 1;
        } else {
            self.stats.hits += 1;
        }
        Ok(self.transform.mask.as_ref())
    }

    /// Transformed pixmap of a color brush
    pub fn transform_pixmap(
        &mut self,
        brush: &Brush,
        params: &TransformParams,
        loops: &PixelLoops,
    ) -> Result<Option<&Pixmap>, PaintError> {
        let pixmap = match brush.pixmap() {
            Some(pixmap) if params.scale > 0.0 => pixmap,
            _ => {
                self.transform.drop_pixmap();
                return Ok(None);
            }
        };
        let key = TransformKey {
            brush_id: brush.id(),
            generation: brush.generation(),
            params: Some(params.into()),
        };
        let layer = &mut self.transform;
        if layer.pixmap_key.as_ref() != Some(&key) {
            layer.pixmap = Some(transform_buffer(pixmap, params, loops)?);
            layer.pixmap_key = Some(key);
        }
        Ok(layer.pixmap.as_ref())
    }

    /// Antialiased mask positioned at the subpixel phase of `(x, y)`
    pub fn get_soft_mask(
        &mut self,
        mask: &TempBuf<u8>,
        x: f64,
        y: f64,
        loops: &PixelLoops,
    ) -> Result<&TempBuf<u8>, PaintError> {
        self.subsample.get(mask, x, y, loops, &mut self.stats)
    }

    /// Binarized mask offset by the half-pixel parity of `(x, y)`
    pub fn get_hard_mask(
        &mut self,
        mask: &TempBuf<u8>,
        x: f64,
        y: f64,
    ) -> Result<&TempBuf<f32>, PaintError> {
        self.solid.get(mask, x, y, &mut self.stats)
    }

    /// Soft mask remapped by `pressure`; pressure 0.5 returns the soft mask
    pub fn get_pressure_mask(
        &mut self,
        mask: &TempBuf<u8>,
        x: f64,
        y: f64,
        pressure: f64,
        loops: &PixelLoops,
    ) -> Result<&TempBuf<u8>, PaintError> {
        self.pressure.get(
            &mut self.subsample,
            mask,
            x,
            y,
            pressure,
            self.profile,
            loops,
            &mut self.stats,
        )
    }

    /// Dab mask derived from the current transformed mask
    pub fn dab_mask(
        &mut self,
        application: BrushApplication,
        x: f64,
        y: f64,
        pressure: f64,
        loops: &PixelLoops,
    ) -> Result<Option<DabMask<'_>>, PaintError> {
        let Self {
            transform,
            subsample,
            solid,
            pressure: pressure_layer,
            profile,
            stats,
        } = self;
        let Some(mask) = transform.mask.as_ref() else {
            return Ok(None);
        };

        let dab = match application {
            BrushApplication::Soft => DabMask::Coverage(subsample.get(mask, x, y, loops, stats)?),
            BrushApplication::Hard => DabMask::Solid(solid.get(mask, x, y, stats)?),
            BrushApplication::Pressure => DabMask::Coverage(pressure_layer.get(
                subsample, mask, x, y, pressure, *profile, loops, stats,
            )?),
        };
        Ok(Some(dab))
    }

    /// Current transformed pixmap, if the brush has one
    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.transform.pixmap.as_ref()
    }
}
