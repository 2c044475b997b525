//! Paint options - the tool configuration a stroke is painted with

use serde::{Deserialize, Serialize};

use super::cache::{BrushApplication, PressureProfile};
use super::dynamics::FadeOptions;
use super::transform::ASPECT_RATIO_LIMIT;
use crate::core::PaintError;
use crate::input::SmoothingOptions;
use crate::paint::blend::BlendMode;
use crate::paint::loops::PixelLoopConfig;
use crate::paint::PaintApplicationMode;

/// Largest brush size in pixels after dynamics
pub const MAX_BRUSH_SIZE: f64 = 10000.0;

/// Airbrush settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AirbrushOptions {
    /// Stamps per second while the pointer rests, 0 - 150
    pub rate: f64,
    /// Opacity of a single stamp in percent
    pub flow: f64,
    /// Only paint on motion, never from the timer
    pub motion_only: bool,
}

impl Default for AirbrushOptions {
    fn default() -> Self {
        Self {
            rate: 80.0,
            flow: 10.0,
            motion_only: false,
        }
    }
}

/// Options of one stroke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaintOptions {
    /// Brush size in pixels; `None` paints at the brush's native size
    pub brush_size: Option<f64>,
    /// Aspect ratio, -20 (tall) to 20 (wide)
    pub brush_aspect_ratio: f64,
    /// Brush angle in turns
    pub brush_angle: f64,
    pub brush_hardness: f64,
    /// Spacing as a fraction of brush size; `None` uses the brush's own
    pub brush_spacing: Option<f64>,
    /// Compensate brush size for the view zoom
    pub brush_zoom: bool,
    /// Force passed to modes that consume it
    pub brush_force: f64,
    pub opacity: f64,
    /// Foreground color, straight RGBA
    pub color: [f32; 4],
    /// Background color, used by anti-erase and the eraser on opaque surfaces
    pub background: [f32; 4],
    pub blend_mode: BlendMode,
    pub application_mode: PaintApplicationMode,
    pub brush_application: BrushApplication,
    pub pressure_profile: PressureProfile,
    /// Jitter amount in brush sizes; 0 disables jitter
    pub jitter: f64,
    pub fade: FadeOptions,
    pub airbrush: AirbrushOptions,
    pub smoothing: SmoothingOptions,
    /// Fraction of the smudge accumulator kept per dab
    pub smudge_rate: f64,
    /// Clone source offset from the destination, in pixels
    pub clone_offset: [i32; 2],
    /// Eraser restores the background instead of removing paint
    pub anti_erase: bool,
    /// Seed for jitter and the random dynamics input
    pub random_seed: u64,
    pub pixel_loops: PixelLoopConfig,
}

impl Default for PaintOptions {
    fn default() -> Self {
        Self {
            brush_size: None,
            brush_aspect_ratio: 0.0,
            brush_angle: 0.0,
            brush_hardness: 1.0,
            brush_spacing: None,
            brush_zoom: false,
            brush_force: 0.5,
            opacity: 1.0,
            color: [0.0, 0.0, 0.0, 1.0],
            background: [1.0, 1.0, 1.0, 1.0],
            blend_mode: BlendMode::Normal,
            application_mode: PaintApplicationMode::Continuous,
            brush_application: BrushApplication::Soft,
            pressure_profile: PressureProfile::Linear,
            jitter: 0.0,
            fade: FadeOptions::default(),
            airbrush: AirbrushOptions::default(),
            smoothing: SmoothingOptions::default(),
            smudge_rate: 0.5,
            clone_offset: [0, 0],
            anti_erase: false,
            random_seed: 0,
            pixel_loops: PixelLoopConfig::default(),
        }
    }
}

impl PaintOptions {
    /// Parse and validate options from JSON
    pub fn from_json(json: &str) -> Result<Self, PaintError> {
        let options: PaintOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_json(&self) -> Result<String, PaintError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), PaintError> {
        if let Some(size) = self.brush_size {
            if !size.is_finite() || size < 0.0 {
                return Err(PaintError::InvalidInput(
                    "Brush size must be a non-negative finite number".to_string(),
                ));
            }
        }
        if let Some(spacing) = self.brush_spacing {
            if !spacing.is_finite() || spacing <= 0.0 {
                return Err(PaintError::InvalidInput(
                    "Brush spacing must be a positive finite number".to_string(),
                ));
            }
        }
        if !(-ASPECT_RATIO_LIMIT..=ASPECT_RATIO_LIMIT).contains(&self.brush_aspect_ratio) {
            return Err(PaintError::InvalidInput(format!(
                "Aspect ratio must be in [-{0}, {0}]",
                ASPECT_RATIO_LIMIT
            )));
        }
        if !self.brush_angle.is_finite() {
            return Err(PaintError::InvalidInput(
                "Brush angle must be finite".to_string(),
            ));
        }
        for (name, value) in [
            ("hardness", self.brush_hardness),
            ("opacity", self.opacity),
            ("force", self.brush_force),
            ("smudge rate", self.smudge_rate),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(PaintError::InvalidInput(format!(
                    "Brush {} must be in [0, 1]",
                    name
                )));
            }
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            return Err(PaintError::InvalidInput(
                "Jitter must be a non-negative finite number".to_string(),
            ));
        }
        if !(0.0..=150.0).contains(&self.airbrush.rate)
            || !(0.0..=100.0).contains(&self.airbrush.flow)
        {
            return Err(PaintError::InvalidInput(
                "Airbrush rate must be in [0, 150] and flow in [0, 100]".to_string(),
            ));
        }
        if !self.smoothing.factor.is_finite() || self.smoothing.factor < 0.0 {
            return Err(PaintError::InvalidInput(
                "Smoothing factor must be a non-negative finite number".to_string(),
            ));
        }
        Ok(())
    }

    /// Brush spacing as a fraction, falling back to the brush's percentage
    pub fn spacing_for(&self, brush_spacing_percent: f64) -> f64 {
        self.brush_spacing
            .unwrap_or(brush_spacing_percent / 100.0)
            .max(0.01)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(PaintOptions::default().validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let options = PaintOptions::from_json(
            r#"{
                "brushSize": 24.0,
                "applicationMode": "incremental",
                "brushApplication": "hard",
                "blendMode": "multiply",
                "fade": {"length": 50.0, "repeat": "triangular"}
            }"#,
        )
        .unwrap();
        assert_eq!(options.brush_size, Some(24.0));
        assert_eq!(options.application_mode, PaintApplicationMode::Incremental);
        assert_eq!(options.brush_application, BrushApplication::Hard);
        assert_eq!(options.blend_mode, BlendMode::Multiply);
        assert_eq!(options.opacity, 1.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let options = PaintOptions {
            opacity: 1.5,
            ..PaintOptions::default()
        };
        assert!(options.validate().is_err());

        let options = PaintOptions {
            brush_aspect_ratio: 25.0,
            ..PaintOptions::default()
        };
        assert!(options.validate().is_err());

        assert!(matches!(
            PaintOptions::from_json("{not json"),
            Err(PaintError::Config(_))
        ));
    }

    #[test]
    fn test_spacing_fallback() {
        let options = PaintOptions::default();
        assert!((options.spacing_for(25.0) - 0.25).abs() < 1e-12);
        let options = PaintOptions {
            brush_spacing: Some(0.5),
            ..options
        };
        assert_eq!(options.spacing_for(25.0), 0.5);
    }

    #[test]
    fn test_json_round_trip_keeps_fields() {
        let options = PaintOptions {
            jitter: 0.3,
            clone_offset: [4, -2],
            ..PaintOptions::default()
        };
        let back = PaintOptions::from_json(&options.to_json().unwrap()).unwrap();
        assert_eq!(back, options);
    }
}
