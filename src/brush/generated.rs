//! Procedural round brush masks
//!
//! Hard brushes get a one-pixel antialiased rim. Soft brushes use a
//! Gaussian falloff evaluated through `erf`, following Krita's
//! `KisGaussCircleMaskGenerator`; the mask grows with the fade so the tail
//! is not clipped.

use std::f32::consts::SQRT_2;

use super::mask::TempBuf;
use crate::core::PaintError;

/// Gaussian mask parameters, computed once per brush shape
#[derive(Clone, Debug)]
pub struct GaussParams {
    pub center: f32,
    pub alphafactor: f32,
    pub distfactor: f32,
    pub ycoef: f32,
    pub fade: f32,
}

impl GaussParams {
    /// # Arguments
    /// * `hardness` - 0.0 = soft, 1.0 = hard
    /// * `radius` - radius in pixels
    /// * `roundness` - 1.0 = circle, < 1.0 = ellipse squashed vertically
    pub fn new(hardness: f32, radius: f32, roundness: f32) -> Self {
        let fade = (1.0 - hardness) * 2.0;
        let safe_fade = fade.clamp(1e-6, 2.0);

        let center = (2.5 * (6761.0 * safe_fade - 10000.0)) / (SQRT_2 * 6761.0 * safe_fade);
        let alphafactor = 255.0 / (2.0 * erf_scalar(center));
        let distfactor = SQRT_2 * 12500.0 / (6761.0 * safe_fade * radius.max(0.5));

        Self {
            center,
            alphafactor,
            distfactor,
            ycoef: 1.0 / roundness.max(0.01),
            fade: safe_fade,
        }
    }

    /// Transparency at distance `dist` from the center (0.0 = opaque)
    #[inline]
    pub fn fade_at(&self, dist: f32) -> f32 {
        let val_dist = dist * self.distfactor;
        let full_fade = self.alphafactor
            * (erf_scalar(val_dist + self.center) - erf_scalar(val_dist - self.center));
        ((255.0 - full_fade) / 255.0).clamp(0.0, 1.0)
    }

    /// Coverage at distance `dist` from the center
    #[inline]
    pub fn coverage(&self, dist: f32) -> f32 {
        1.0 - self.fade_at(dist)
    }
}

/// Abramowitz and Stegun formula 7.1.26, |error| < 1.5e-7
#[inline]
pub fn erf_scalar(x: f32) -> f32 {
    let sign = if x >= 0.0 { 1.0 } else { -1.0 };
    let x = x.abs();

    const A1: f32 = 0.254_829_6;
    const A2: f32 = -0.284_496_72;
    const A3: f32 = 1.421_413_8;
    const A4: f32 = -1.453_152_1;
    const A5: f32 = 1.061_405_4;
    const P: f32 = 0.327_591_1;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();

    sign * y
}

/// Parameters of a procedural round brush
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratedShape {
    pub radius: f32,
    pub hardness: f32,
    pub roundness: f32,
}

impl Default for GeneratedShape {
    fn default() -> Self {
        Self {
            radius: 5.0,
            hardness: 1.0,
            roundness: 1.0,
        }
    }
}

/// Render the coverage mask of `shape`
pub fn render_mask(shape: &GeneratedShape) -> Result<TempBuf<u8>, PaintError> {
    if shape.radius.is_nan() || shape.radius <= 0.0 {
        return Err(PaintError::InvalidInput(format!(
            "brush radius {} must be positive",
            shape.radius
        )));
    }
    let hardness = shape.hardness.clamp(0.0, 1.0);
    let params = GaussParams::new(hardness, shape.radius, shape.roundness);
    let soft = hardness < 1.0;

    let extent = if soft {
        shape.radius * (1.0 + params.fade)
    } else {
        shape.radius
    };
    let size = ((extent * 2.0).ceil() as usize).max(1);
    let center = size as f32 / 2.0;

    let mut mask = TempBuf::<u8>::new(size, size)?;
    let data = mask.data_mut();
    for (row, line) in data.chunks_mut(size).enumerate() {
        let y = (row as f32 + 0.5 - center) * params.ycoef;
        for (col, v) in line.iter_mut().enumerate() {
            let x = col as f32 + 0.5 - center;
            let dist = (x * x + y * y).sqrt();
            let coverage = if soft {
                params.coverage(dist)
            } else {
                (shape.radius + 0.5 - dist).clamp(0.0, 1.0)
            };
            *v = (coverage * 255.0).round() as u8;
        }
    }
    Ok(mask)
}
