//! Per-pixel blend functions on straight-alpha RGBA `f32` pixels
//!
//! Separable modes follow the W3C compositing model: the blended color is
//! mixed with the source by the backdrop alpha, then composited source-over.

use serde::{Deserialize, Serialize};

/// RGBA pixel, straight alpha, 0.0 - 1.0
pub type Rgba = [f32; 4];

/// Blend modes for dab compositing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    /// Paint only where the destination is transparent
    Behind,
    /// Remove alpha by the source coverage
    Erase,
    /// Restore alpha by the source coverage
    AntiErase,
}

impl BlendMode {
    /// Whether the mode reads the destination color channels
    pub fn is_separable(&self) -> bool {
        !matches!(self, BlendMode::Behind | BlendMode::Erase | BlendMode::AntiErase)
    }
}

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if base <= 0.0 {
        0.0
    } else if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if base >= 1.0 {
        1.0
    } else if top <= 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - base) / top).max(0.0)
    }
}

fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

/// Separable blend of one channel
#[inline]
fn blend_channel(mode: BlendMode, base: f32, top: f32) -> f32 {
    match mode {
        BlendMode::Multiply => base * top,
        BlendMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
        BlendMode::Overlay => overlay_channel(base, top),
        BlendMode::Darken => base.min(top),
        BlendMode::Lighten => base.max(top),
        BlendMode::ColorDodge => color_dodge_channel(base, top),
        BlendMode::ColorBurn => color_burn_channel(base, top),
        BlendMode::HardLight => overlay_channel(top, base),
        BlendMode::SoftLight => soft_light_channel(base, top),
        BlendMode::Difference => (base - top).abs(),
        BlendMode::Exclusion => base + top - 2.0 * base * top,
        _ => top,
    }
}

/// Composite `src` over `dst` with the source alpha scaled by `opacity`
#[inline]
pub fn composite(dst: Rgba, src: Rgba, opacity: f32, mode: BlendMode) -> Rgba {
    let src_a = (src[3] * opacity).clamp(0.0, 1.0);
    if src_a <= 0.0 {
        return dst;
    }
    let dst_a = dst[3];

    match mode {
        BlendMode::Erase => [dst[0], dst[1], dst[2], dst_a * (1.0 - src_a)],
        BlendMode::AntiErase => [dst[0], dst[1], dst[2], dst_a + (1.0 - dst_a) * src_a],
        BlendMode::Behind => {
            let out_a = dst_a + src_a * (1.0 - dst_a);
            if out_a <= 0.0 {
                return [0.0; 4];
            }
            let mut out = [0.0, 0.0, 0.0, out_a];
            for c in 0..3 {
                out[c] = (dst[c] * dst_a + src[c] * src_a * (1.0 - dst_a)) / out_a;
            }
            out
        }
        _ => {
            let out_a = src_a + dst_a * (1.0 - src_a);
            if out_a <= 0.0 {
                return [0.0; 4];
            }
            let mut out = [0.0, 0.0, 0.0, out_a];
            for c in 0..3 {
                let mixed = (1.0 - dst_a) * src[c] + dst_a * blend_channel(mode, dst[c], src[c]);
                out[c] = ((mixed * src_a + dst[c] * dst_a * (1.0 - src_a)) / out_a).clamp(0.0, 1.0);
            }
            out
        }
    }
}

/// Interpolate from `dst` toward `src` by `amount`, alpha included
#[inline]
pub fn replace(dst: Rgba, src: Rgba, amount: f32) -> Rgba {
    let t = amount.clamp(0.0, 1.0);
    if t <= 0.0 {
        return dst;
    }
    let out_a = dst[3] + (src[3] - dst[3]) * t;
    if out_a <= 0.0 {
        return [0.0; 4];
    }
    let mut out = [0.0, 0.0, 0.0, out_a];
    for c in 0..3 {
        let premul = dst[c] * dst[3] + (src[c] * src[3] - dst[c] * dst[3]) * t;
        out[c] = (premul / out_a).clamp(0.0, 1.0);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn close(a: Rgba, b: Rgba) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_normal_full_opacity_overwrites() {
        let out = composite([0.2, 0.4, 0.6, 1.0], [1.0, 0.0, 0.0, 1.0], 1.0, BlendMode::Normal);
        assert!(close(out, [1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_normal_half_opacity_mixes() {
        let out = composite([0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0, 1.0], 0.5, BlendMode::Normal);
        assert!(close(out, [0.5, 0.5, 0.5, 1.0]));
    }

    #[test]
    fn test_onto_transparent_keeps_source_color() {
        let out = composite([0.0; 4], [0.3, 0.6, 0.9, 1.0], 0.5, BlendMode::Multiply);
        assert!(close(out, [0.3, 0.6, 0.9, 0.5]));
    }

    #[test]
    fn test_multiply_on_opaque() {
        let out = composite([0.5, 0.5, 0.5, 1.0], [0.5, 1.0, 0.0, 1.0], 1.0, BlendMode::Multiply);
        assert!(close(out, [0.25, 0.5, 0.0, 1.0]));
    }

    #[test]
    fn test_erase_and_anti_erase() {
        let erased = composite([0.2, 0.2, 0.2, 1.0], [0.0, 0.0, 0.0, 1.0], 0.75, BlendMode::Erase);
        assert!((erased[3] - 0.25).abs() < 1e-6);
        let restored = composite(erased, [0.0, 0.0, 0.0, 1.0], 1.0, BlendMode::AntiErase);
        assert!((restored[3] - 1.0).abs() < 1e-6);
        assert_eq!(restored[0], 0.2);
    }

    #[test]
    fn test_behind_only_fills_transparency() {
        let opaque = composite([0.1, 0.2, 0.3, 1.0], [1.0, 1.0, 1.0, 1.0], 1.0, BlendMode::Behind);
        assert!(close(opaque, [0.1, 0.2, 0.3, 1.0]));
        let empty = composite([0.0; 4], [1.0, 0.0, 0.0, 1.0], 1.0, BlendMode::Behind);
        assert!(close(empty, [1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_replace_propagates_transparency() {
        let out = replace([1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 0.0, 0.0], 1.0);
        assert_eq!(out, [0.0; 4]);
        let half = replace([1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0], 0.5);
        assert!(close(half, [0.5, 0.0, 0.5, 1.0]));
    }

    #[test]
    fn test_zero_opacity_is_noop() {
        let dst = [0.3, 0.3, 0.3, 0.7];
        for mode in [BlendMode::Normal, BlendMode::Erase, BlendMode::Screen] {
            assert_eq!(composite(dst, [1.0; 4], 0.0, mode), dst);
        }
    }
}
