//! Brush mask and pixmap transforms
//!
//! Scale, aspect ratio, rotation and reflection are composed into one affine
//! matrix about the mask center. The destination is resampled bilinearly
//! through the inverse matrix. Hardness below 1.0 shrinks the shape and
//! blurs it so the softened edge still fits the transformed bounds.

use super::mask::{MaskSample, TempBuf};
use crate::core::PaintError;
use crate::paint::loops::PixelLoops;

/// Aspect ratio range accepted by [`get_scale`]
pub const ASPECT_RATIO_LIMIT: f64 = 20.0;

/// Relative cost of one bilinear sample against a plain copy
const RESAMPLE_COST: f64 = 2.0;

/// 2D affine matrix: `x' = xx*x + xy*y + x0`, `y' = yx*x + yy*y + y0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub xx: f64,
    pub xy: f64,
    pub x0: f64,
    pub yx: f64,
    pub yy: f64,
    pub y0: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        xx: 1.0,
        xy: 0.0,
        x0: 0.0,
        yx: 0.0,
        yy: 1.0,
        y0: 0.0,
    };

    /// Apply `next` after `self`
    pub fn then(self, next: Affine) -> Affine {
        Affine {
            xx: next.xx * self.xx + next.xy * self.yx,
            xy: next.xx * self.xy + next.xy * self.yy,
            x0: next.xx * self.x0 + next.xy * self.y0 + next.x0,
            yx: next.yx * self.xx + next.yy * self.yx,
            yy: next.yx * self.xy + next.yy * self.yy,
            y0: next.yx * self.x0 + next.yy * self.y0 + next.y0,
        }
    }

    pub fn scale(self, sx: f64, sy: f64) -> Affine {
        self.then(Affine {
            xx: sx,
            yy: sy,
            ..Affine::IDENTITY
        })
    }

    pub fn translate(self, tx: f64, ty: f64) -> Affine {
        self.then(Affine {
            x0: tx,
            y0: ty,
            ..Affine::IDENTITY
        })
    }

    pub fn rotate(self, theta: f64) -> Affine {
        let (sin, cos) = theta.sin_cos();
        self.then(Affine {
            xx: cos,
            xy: -sin,
            yx: sin,
            yy: cos,
            ..Affine::IDENTITY
        })
    }

    pub fn invert(&self) -> Option<Affine> {
        let det = self.xx * self.yy - self.xy * self.yx;
        if det.abs() < 1e-12 {
            return None;
        }
        let xx = self.yy / det;
        let xy = -self.xy / det;
        let yx = -self.yx / det;
        let yy = self.xx / det;
        Some(Affine {
            xx,
            xy,
            x0: -(xx * self.x0 + xy * self.y0),
            yx,
            yy,
            y0: -(yx * self.x0 + yy * self.y0),
        })
    }

    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.xx * x + self.xy * y + self.x0,
            self.yx * x + self.yy * y + self.y0,
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Affine::IDENTITY
    }
}

/// Per-axis scale for a brush scale and aspect ratio in -20..20
pub fn get_scale(scale: f64, aspect_ratio: f64) -> (f64, f64) {
    let aspect = aspect_ratio.clamp(-ASPECT_RATIO_LIMIT, ASPECT_RATIO_LIMIT);
    if aspect < 0.0 {
        (scale * (1.0 + aspect / ASPECT_RATIO_LIMIT), scale)
    } else {
        (scale, scale * (1.0 - aspect / ASPECT_RATIO_LIMIT))
    }
}

/// Transform about the center of a `width` x `height` mask.
///
/// `angle` is in turns; positive values rotate counter-clockwise on screen.
pub fn transform_matrix(
    width: f64,
    height: f64,
    scale_x: f64,
    scale_y: f64,
    angle: f64,
    reflect: bool,
) -> Affine {
    let cx = width / 2.0;
    let cy = height / 2.0;

    let m = Affine::IDENTITY
        .scale(scale_x, scale_y)
        .translate(-cx * scale_x, -cy * scale_y)
        .rotate(-2.0 * std::f64::consts::PI * angle);
    let m = if reflect { m.scale(-1.0, 1.0) } else { m };
    m.translate(cx * scale_x, cy * scale_y)
}

/// Integer bounds `(x, y, width, height)` of a transformed `w` x `h` mask
pub fn bounding_box(w: f64, h: f64, matrix: &Affine) -> (i32, i32, usize, usize) {
    let corners = [
        matrix.apply(0.0, 0.0),
        matrix.apply(w, 0.0),
        matrix.apply(0.0, h),
        matrix.apply(w, h),
    ];
    let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
    let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

    let x = (min_x - 0.5).ceil() as i32;
    let y = (min_y - 0.5).ceil() as i32;
    let width = ((max_x - 0.5).ceil() as i32 - x).max(1);
    let height = ((max_y - 0.5).ceil() as i32 - y).max(1);
    (x, y, width as usize, height as usize)
}

/// Blur radius used to emulate `hardness` on a `width` x `height` mask
pub fn blur_radius(width: usize, height: usize, hardness: f64) -> usize {
    let r = ((1.0 - hardness) * (0.5f64.sqrt() - 0.5) * width.min(height) as f64).floor();
    r.max(0.0) as usize
}

fn adjust_hardness_matrix(width: f64, height: f64, radius: f64, matrix: Affine) -> Affine {
    if radius == 0.0 {
        return matrix;
    }
    let min = width.min(height);
    let scale = (min - 2.0 * radius) / min;
    matrix
        .scale(scale, scale)
        .translate((1.0 - scale) * width / 2.0, (1.0 - scale) * height / 2.0)
}

/// Size of a `width` x `height` brush after transformation
pub fn transform_size(
    width: usize,
    height: usize,
    scale: f64,
    aspect_ratio: f64,
    angle: f64,
    reflect: bool,
) -> (usize, usize) {
    let (sx, sy) = get_scale(scale, aspect_ratio);
    let matrix = transform_matrix(width as f64, height as f64, sx, sy, angle, reflect);
    if matrix.is_identity() {
        return (width, height);
    }
    let (_, _, w, h) = bounding_box(width as f64, height as f64, &matrix);
    (w, h)
}

/// Transformation parameters of one dab
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub scale: f64,
    pub aspect_ratio: f64,
    /// Rotation in turns
    pub angle: f64,
    pub reflect: bool,
    pub hardness: f64,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            aspect_ratio: 0.0,
            angle: 0.0,
            reflect: false,
            hardness: 1.0,
        }
    }
}

/// Transform a mask or pixmap; every channel is resampled independently.
///
/// The identity transform at full hardness returns a copy of `source`.
pub fn transform_buffer<T: MaskSample>(
    source: &TempBuf<T>,
    params: &TransformParams,
    loops: &PixelLoops,
) -> Result<TempBuf<T>, PaintError> {
    let src_w = source.width();
    let src_h = source.height();
    let channels = source.channels();
    let (sx, sy) = get_scale(params.scale, params.aspect_ratio);

    let mut matrix = transform_matrix(
        src_w as f64,
        src_h as f64,
        sx,
        sy,
        params.angle,
        params.reflect,
    );
    if matrix.is_identity() && params.hardness >= 1.0 {
        return Ok(source.clone());
    }

    let (x, y, dest_w, dest_h) = bounding_box(src_w as f64, src_h as f64, &matrix);

    let mut radius = 0;
    if params.hardness < 1.0 {
        let unrotated = transform_matrix(src_w as f64, src_h as f64, sx, sy, 0.0, false);
        let (_, _, uw, uh) = bounding_box(src_w as f64, src_h as f64, &unrotated);
        radius = blur_radius(uw, uh, params.hardness);
        matrix = adjust_hardness_matrix(dest_w as f64, dest_h as f64, radius as f64, matrix);
    }

    let inverse = matrix
        .translate(-x as f64, -y as f64)
        .invert()
        .ok_or_else(|| PaintError::InvalidInput(format!("singular brush transform {:?}", params)))?;

    let mut dest = TempBuf::<T>::with_channels(dest_w, dest_h, channels)?;
    let stride = dest_w * channels;
    let max_x = src_w as f64 - 0.5;
    let max_y = src_h as f64 - 0.5;

    loops.process_rows(dest.data_mut(), dest_w, channels, RESAMPLE_COST, |y0, band| {
        for (i, row) in band.chunks_mut(stride).enumerate() {
            let v = (y0 + i) as f64 + 0.5;
            for (u, px) in row.chunks_mut(channels).enumerate() {
                let (fx, fy) = inverse.apply(u as f64 + 0.5, v);
                let (fx, fy) = (fx - 0.5, fy - 0.5);
                if fx < -0.5 || fx >= max_x || fy < -0.5 || fy >= max_y {
                    continue;
                }
                sample_bilinear(source, fx, fy, px);
            }
        }
    });

    if radius > 0 {
        blur(&mut dest, radius, loops)?;
    }
    Ok(dest)
}

/// Bilinear lookup with edge replication
#[inline]
fn sample_bilinear<T: MaskSample>(source: &TempBuf<T>, fx: f64, fy: f64, out: &mut [T]) {
    let x0 = fx.floor();
    let y0 = fy.floor();
    let dx = (fx - x0) as f32;
    let dy = (fy - y0) as f32;
    let last_x = source.width() as isize - 1;
    let last_y = source.height() as isize - 1;
    let xa = (x0 as isize).clamp(0, last_x);
    let xb = (x0 as isize + 1).clamp(0, last_x);
    let ya = (y0 as isize).clamp(0, last_y);
    let yb = (y0 as isize + 1).clamp(0, last_y);

    for (c, slot) in out.iter_mut().enumerate() {
        let top = source.get(xa, ya, c).to_unit() * (1.0 - dx) + source.get(xb, ya, c).to_unit() * dx;
        let bottom =
            source.get(xa, yb, c).to_unit() * (1.0 - dx) + source.get(xb, yb, c).to_unit() * dx;
        *slot = T::from_unit(top * (1.0 - dy) + bottom * dy);
    }
}

/// Separable tent blur of radius `r`, zero outside the buffer
fn blur<T: MaskSample>(buf: &mut TempBuf<T>, r: usize, loops: &PixelLoops) -> Result<(), PaintError> {
    let width = buf.width();
    let height = buf.height();
    let channels = buf.channels();
    let stride = width * channels;
    let norm = ((r + 1) * (r + 1)) as f32;
    let r = r as isize;
    let cost = (2 * r + 1) as f64;

    let mut horizontal = crate::core::try_alloc(width * height * channels, 0.0f32)?;
    {
        let src = &*buf;
        loops.process_rows(&mut horizontal, width, channels, cost, |y0, band| {
            for (i, row) in band.chunks_mut(stride).enumerate() {
                let y = (y0 + i) as isize;
                for x in 0..width as isize {
                    for c in 0..channels {
                        let mut acc = 0.0;
                        for d in -r..=r {
                            acc += src.get(x + d, y, c).to_unit() * (r + 1 - d.abs()) as f32;
                        }
                        row[x as usize * channels + c] = acc / norm;
                    }
                }
            }
        });
    }

    let horizontal = &horizontal;
    loops.process_rows(buf.data_mut(), width, channels, cost, |y0, band| {
        for (i, row) in band.chunks_mut(stride).enumerate() {
            let y = (y0 + i) as isize;
            for (j, slot) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for d in -r..=r {
                    let yy = y + d;
                    if yy >= 0 && (yy as usize) < height {
                        acc += horizontal[yy as usize * stride + j] * (r + 1 - d.abs()) as f32;
                    }
                }
                *slot = T::from_unit(acc / norm);
            }
        }
    });
    Ok(())
}
