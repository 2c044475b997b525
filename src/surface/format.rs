//! Pixel format catalog
//!
//! The catalog is closed: every format a surface can carry is listed here.
//! Paint routines work on straight-alpha RGBA `f32` and convert at the
//! surface boundary.

use serde::{Deserialize, Serialize};

use crate::core::PaintError;

/// Storage format of a target surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PixelFormat {
    #[default]
    Rgba8,
    Rgb8,
    GrayA8,
    Gray8,
    /// Palette indices; stored but never painted on
    Indexed8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::GrayA8 => 2,
            PixelFormat::Gray8 | PixelFormat::Indexed8 => 1,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Rgba8 | PixelFormat::GrayA8)
    }

    /// Whether blend and convolution routines accept this format
    pub const fn is_paintable(self) -> bool {
        !matches!(self, PixelFormat::Indexed8)
    }

    pub fn ensure_paintable(self) -> Result<(), PaintError> {
        if self.is_paintable() {
            Ok(())
        } else {
            tracing::warn!("Rejecting paint operation on {:?} surface", self);
            Err(PaintError::UnsupportedFormat(self))
        }
    }

    /// Convert one stored pixel to straight-alpha RGBA
    #[inline]
    pub fn decode(self, src: &[u8], dst: &mut [f32]) {
        match self {
            PixelFormat::Rgba8 => {
                for c in 0..4 {
                    dst[c] = src[c] as f32 / 255.0;
                }
            }
            PixelFormat::Rgb8 => {
                for c in 0..3 {
                    dst[c] = src[c] as f32 / 255.0;
                }
                dst[3] = 1.0;
            }
            PixelFormat::GrayA8 => {
                let v = src[0] as f32 / 255.0;
                dst[..3].fill(v);
                dst[3] = src[1] as f32 / 255.0;
            }
            PixelFormat::Gray8 | PixelFormat::Indexed8 => {
                let v = src[0] as f32 / 255.0;
                dst[..3].fill(v);
                dst[3] = 1.0;
            }
        }
    }

    /// Convert one straight-alpha RGBA pixel to storage
    #[inline]
    pub fn encode(self, src: &[f32], dst: &mut [u8]) {
        match self {
            PixelFormat::Rgba8 => {
                for c in 0..4 {
                    dst[c] = to_u8(src[c]);
                }
            }
            PixelFormat::Rgb8 => {
                for c in 0..3 {
                    dst[c] = to_u8(src[c]);
                }
            }
            PixelFormat::GrayA8 => {
                dst[0] = to_u8(luminance(src));
                dst[1] = to_u8(src[3]);
            }
            PixelFormat::Gray8 | PixelFormat::Indexed8 => {
                dst[0] = to_u8(luminance(src));
            }
        }
    }
}

#[inline]
fn luminance(rgb: &[f32]) -> f32 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}

/// Quantize a unit value to 8 bits
#[inline]
pub fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_round_trip_is_exact() {
        let px = [12u8, 200, 7, 129];
        let mut unit = [0.0f32; 4];
        let mut back = [0u8; 4];
        PixelFormat::Rgba8.decode(&px, &mut unit);
        PixelFormat::Rgba8.encode(&unit, &mut back);
        assert_eq!(px, back);
    }

    #[test]
    fn test_gray_decodes_opaque() {
        let mut unit = [0.0f32; 4];
        PixelFormat::Gray8.decode(&[51], &mut unit);
        assert_eq!(unit[3], 1.0);
        assert!((unit[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_indexed_is_not_paintable() {
        assert!(PixelFormat::Indexed8.ensure_paintable().is_err());
        assert!(PixelFormat::GrayA8.ensure_paintable().is_ok());
    }
}
