//! Brush module - brush resources, mask caching, dynamics and the stroke core

pub mod cache;
pub mod dynamics;
pub mod engine;
pub mod generated;
pub mod interpolation;
pub mod kernels;
pub mod mask;
pub mod options;
pub mod transform;

pub use cache::{BrushApplication, CacheStats, DabMask, MaskCache, PressureProfile};
pub use dynamics::{
    Dynamics, DynamicsContext, DynamicsInput, DynamicsOutput, DynamicsProvider, FadeOptions,
    FadeRepeat, InputMapping, PressureCurve,
};
pub use engine::{BrushCore, StrokeSummary};
pub use generated::GeneratedShape;
pub use interpolation::{InterpolationParams, Stamp, StrokeInterpolator};
pub use mask::{Pixmap, TempBuf};
pub use options::{AirbrushOptions, PaintOptions};
pub use transform::TransformParams;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::{GrayImage, RgbImage};
use parking_lot::RwLock;

use crate::core::{PaintError, Vector2};

static NEXT_BRUSH_ID: AtomicU64 = AtomicU64::new(1);

/// Brush resource shared between the UI and the paint core
pub type SharedBrush = Arc<RwLock<Brush>>;

/// A brush: coverage mask, optional color pixmap and spacing.
///
/// `generation` increases whenever the mask or pixmap content changes;
/// caches built from an older generation are discarded on next use.
#[derive(Debug, Clone)]
pub struct Brush {
    id: u64,
    name: String,
    mask: TempBuf<u8>,
    pixmap: Option<Pixmap>,
    /// Spacing in percent of the brush size
    spacing: f64,
    generation: u64,
    want_null_motion: bool,
}

impl Brush {
    pub fn new(name: impl Into<String>, mask: TempBuf<u8>) -> Self {
        Self {
            id: NEXT_BRUSH_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            mask,
            pixmap: None,
            spacing: 20.0,
            generation: 0,
            want_null_motion: false,
        }
    }

    /// Procedural round brush
    pub fn generated(name: impl Into<String>, shape: &GeneratedShape) -> Result<Self, PaintError> {
        let mask = generated::render_mask(shape)?;
        Ok(Self::new(name, mask).with_spacing(10.0))
    }

    /// Brush from a grayscale image, dark pixels paint
    pub fn from_gray_image(name: impl Into<String>, img: &GrayImage) -> Result<Self, PaintError> {
        let mut mask = TempBuf::from_gray_image(img)?;
        for v in mask.data_mut() {
            *v = 255 - *v;
        }
        Ok(Self::new(name, mask))
    }

    /// Attach a color pixmap; its size must match the mask
    pub fn with_pixmap(mut self, pixmap: Pixmap) -> Result<Self, PaintError> {
        if pixmap.width() != self.mask.width() || pixmap.height() != self.mask.height() {
            return Err(PaintError::InvalidInput(format!(
                "pixmap {}x{} does not match mask {}x{}",
                pixmap.width(),
                pixmap.height(),
                self.mask.width(),
                self.mask.height()
            )));
        }
        self.pixmap = Some(pixmap);
        Ok(self)
    }

    /// Attach a color pixmap decoded from an RGB image
    pub fn with_rgb_image(self, img: &RgbImage) -> Result<Self, PaintError> {
        let pixmap = TempBuf::from_rgb_image(img)?;
        self.with_pixmap(pixmap)
    }

    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing.clamp(1.0, 5000.0);
        self
    }

    pub fn with_null_motion(mut self, want: bool) -> Self {
        self.want_null_motion = want;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_mask(&self) -> &TempBuf<u8> {
        &self.mask
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    /// Spacing in percent of the brush size
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn width(&self) -> usize {
        self.mask.width()
    }

    pub fn height(&self) -> usize {
        self.mask.height()
    }

    pub fn x_axis(&self) -> Vector2 {
        Vector2::new(self.mask.width() as f64 / 2.0, 0.0)
    }

    pub fn y_axis(&self) -> Vector2 {
        Vector2::new(0.0, self.mask.height() as f64 / 2.0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether repeated samples at one position should still paint
    pub fn want_null_motion(&self) -> bool {
        self.want_null_motion
    }

    /// Signal that the brush content changed
    pub fn invalidate(&mut self) {
        self.generation += 1;
        tracing::trace!("Brush '{}' invalidated (generation {})", self.name, self.generation);
    }

    /// Replace the mask; an attached pixmap of another size is dropped
    pub fn set_mask(&mut self, mask: TempBuf<u8>) {
        if let Some(pixmap) = &self.pixmap {
            if pixmap.width() != mask.width() || pixmap.height() != mask.height() {
                self.pixmap = None;
            }
        }
        self.mask = mask;
        self.invalidate();
    }

    /// Size of the brush after transformation
    pub fn transform_size(&self, params: &TransformParams) -> (usize, usize) {
        transform::transform_size(
            self.mask.width(),
            self.mask.height(),
            params.scale,
            params.aspect_ratio,
            params.angle,
            params.reflect,
        )
    }

    pub fn into_shared(self) -> SharedBrush {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_brush_axes() {
        let brush = Brush::generated(
            "round",
            &GeneratedShape {
                radius: 4.0,
                ..GeneratedShape::default()
            },
        )
        .unwrap();
        assert_eq!(brush.width(), 8);
        assert_eq!(brush.x_axis(), Vector2::new(4.0, 0.0));
        assert_eq!(brush.y_axis(), Vector2::new(0.0, 4.0));
        assert_eq!(brush.spacing(), 10.0);
    }

    #[test]
    fn test_brush_ids_are_unique() {
        let a = Brush::generated("a", &GeneratedShape::default()).unwrap();
        let b = Brush::generated("b", &GeneratedShape::default()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_set_mask_bumps_generation() {
        let mut brush = Brush::generated("round", &GeneratedShape::default()).unwrap();
        let before = brush.generation();
        brush.set_mask(TempBuf::new(3, 3).unwrap());
        assert_eq!(brush.generation(), before + 1);
        assert_eq!(brush.width(), 3);
    }

    #[test]
    fn test_pixmap_size_must_match() {
        let brush = Brush::new("square", TempBuf::new(4, 4).unwrap());
        let wrong = TempBuf::with_channels(3, 4, 3).unwrap();
        assert!(brush.clone().with_pixmap(wrong).is_err());
        let right = TempBuf::with_channels(4, 4, 3).unwrap();
        assert!(brush.with_pixmap(right).unwrap().pixmap().is_some());
    }

    #[test]
    fn test_gray_image_inverts_to_coverage() {
        let img = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
        let brush = Brush::from_gray_image("ink", &img).unwrap();
        assert_eq!(brush.base_mask().data(), &[255, 0]);
    }

    #[test]
    fn test_shared_brush_invalidation() {
        let shared = Brush::generated("round", &GeneratedShape::default())
            .unwrap()
            .into_shared();
        shared.write().invalidate();
        assert_eq!(shared.read().generation(), 1);
    }
}
