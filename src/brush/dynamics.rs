//! Paint dynamics - maps input channels to per-dab multipliers
//!
//! Every output (size, opacity, angle, ...) lists the input channels that
//! drive it, each through its own response curve. The output value is the
//! mean of the curved inputs, reinterpreted per output kind:
//! - linear outputs use the mean directly (1.0 when no input is enabled)
//! - angular outputs use `mean - 0.5` turns (0.0 when none)
//! - the aspect ratio output uses `2 * mean - 1` (0.0 when none)

use serde::{Deserialize, Serialize};

use crate::input::Coords;

/// Response curve applied to one input channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PressureCurve {
    /// Linear mapping (1:1)
    #[default]
    Linear,
    /// Ease-out: more sensitive at low input
    Soft,
    /// Ease-in: less sensitive at low input
    Hard,
    /// Piecewise linear through `[input, output]` control points
    Custom(Vec<[f32; 2]>),
}

impl PressureCurve {
    /// Apply the curve to a value in 0.0 - 1.0
    pub fn apply(&self, value: f32) -> f32 {
        let p = value.clamp(0.0, 1.0);

        match self {
            PressureCurve::Linear => p,
            PressureCurve::Soft => 1.0 - (1.0 - p).powi(2),
            PressureCurve::Hard => p.powi(2),
            PressureCurve::Custom(points) => custom_curve(points, p),
        }
    }
}

fn custom_curve(points: &[[f32; 2]], p: f32) -> f32 {
    let Some(first) = points.first() else {
        return p;
    };
    if p <= first[0] {
        return first[1].clamp(0.0, 1.0);
    }
    for pair in points.windows(2) {
        let [x0, y0] = pair[0];
        let [x1, y1] = pair[1];
        if p <= x1 {
            let span = x1 - x0;
            let t = if span > f32::EPSILON { (p - x0) / span } else { 1.0 };
            return (y0 + (y1 - y0) * t).clamp(0.0, 1.0);
        }
    }
    points.last().map_or(p, |last| last[1].clamp(0.0, 1.0))
}

/// Input channel feeding a dynamics output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DynamicsInput {
    Pressure,
    Velocity,
    Direction,
    Tilt,
    Wheel,
    Random,
    Fade,
}

/// Modulated paint parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DynamicsOutput {
    Opacity,
    Size,
    Angle,
    Hardness,
    Force,
    AspectRatio,
    Spacing,
    Rate,
    Flow,
    Jitter,
}

/// Per-dab values that are not part of the coordinate sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicsContext {
    /// Position along the fade, 0.0 - 1.0
    pub fade_point: f64,
    /// Uniform random sample, 0.0 - 1.0
    pub random: f64,
}

impl Default for DynamicsContext {
    fn default() -> Self {
        Self {
            fade_point: 1.0,
            random: 0.5,
        }
    }
}

/// Collaborator computing modulation multipliers
pub trait DynamicsProvider: Send + Sync {
    fn is_enabled(&self, output: DynamicsOutput) -> bool;

    fn evaluate(&self, output: DynamicsOutput, coords: &Coords, ctx: &DynamicsContext) -> f64;
}

/// One input of an output, with its curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMapping {
    pub input: DynamicsInput,
    #[serde(default)]
    pub curve: PressureCurve,
}

/// Named dynamics profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Dynamics {
    pub name: String,
    pub opacity: Vec<InputMapping>,
    pub size: Vec<InputMapping>,
    pub angle: Vec<InputMapping>,
    pub hardness: Vec<InputMapping>,
    pub force: Vec<InputMapping>,
    pub aspect_ratio: Vec<InputMapping>,
    pub spacing: Vec<InputMapping>,
    pub rate: Vec<InputMapping>,
    pub flow: Vec<InputMapping>,
    pub jitter: Vec<InputMapping>,
}

impl Dynamics {
    /// Profile with every output disabled
    pub fn off() -> Self {
        Self {
            name: "Dynamics Off".into(),
            ..Self::default()
        }
    }

    /// Pressure drives size and opacity linearly
    pub fn pressure_size_opacity() -> Self {
        let pressure = vec![InputMapping {
            input: DynamicsInput::Pressure,
            curve: PressureCurve::Linear,
        }];
        Self {
            name: "Pressure Size Opacity".into(),
            opacity: pressure.clone(),
            size: pressure,
            ..Self::default()
        }
    }

    fn mappings(&self, output: DynamicsOutput) -> &[InputMapping] {
        match output {
            DynamicsOutput::Opacity => &self.opacity,
            DynamicsOutput::Size => &self.size,
            DynamicsOutput::Angle => &self.angle,
            DynamicsOutput::Hardness => &self.hardness,
            DynamicsOutput::Force => &self.force,
            DynamicsOutput::AspectRatio => &self.aspect_ratio,
            DynamicsOutput::Spacing => &self.spacing,
            DynamicsOutput::Rate => &self.rate,
            DynamicsOutput::Flow => &self.flow,
            DynamicsOutput::Jitter => &self.jitter,
        }
    }

    pub fn mappings_mut(&mut self, output: DynamicsOutput) -> &mut Vec<InputMapping> {
        match output {
            DynamicsOutput::Opacity => &mut self.opacity,
            DynamicsOutput::Size => &mut self.size,
            DynamicsOutput::Angle => &mut self.angle,
            DynamicsOutput::Hardness => &mut self.hardness,
            DynamicsOutput::Force => &mut self.force,
            DynamicsOutput::AspectRatio => &mut self.aspect_ratio,
            DynamicsOutput::Spacing => &mut self.spacing,
            DynamicsOutput::Rate => &mut self.rate,
            DynamicsOutput::Flow => &mut self.flow,
            DynamicsOutput::Jitter => &mut self.jitter,
        }
    }

    fn mean(&self, output: DynamicsOutput, coords: &Coords, ctx: &DynamicsContext) -> Option<f64> {
        let mappings = self.mappings(output);
        if mappings.is_empty() {
            return None;
        }
        let angular = output == DynamicsOutput::Angle;
        let total: f64 = mappings
            .iter()
            .map(|m| m.curve.apply(input_value(m.input, coords, ctx, angular) as f32) as f64)
            .sum();
        Some(total / mappings.len() as f64)
    }
}

/// Raw value of an input channel, 0.0 - 1.0
fn input_value(input: DynamicsInput, coords: &Coords, ctx: &DynamicsContext, angular: bool) -> f64 {
    match input {
        DynamicsInput::Pressure => coords.pressure,
        DynamicsInput::Velocity => 1.0 - coords.velocity,
        DynamicsInput::Direction => {
            if angular {
                coords.direction
            } else {
                (coords.direction + 0.5).rem_euclid(1.0)
            }
        }
        DynamicsInput::Tilt => {
            if angular {
                let turns = coords.ytilt.atan2(coords.xtilt) / (2.0 * std::f64::consts::PI);
                turns.rem_euclid(1.0)
            } else {
                (1.0 - (coords.xtilt * coords.xtilt + coords.ytilt * coords.ytilt).sqrt()).max(0.0)
            }
        }
        DynamicsInput::Wheel => coords.wheel,
        DynamicsInput::Random => ctx.random,
        DynamicsInput::Fade => ctx.fade_point,
    }
    .clamp(0.0, 1.0)
}

impl DynamicsProvider for Dynamics {
    fn is_enabled(&self, output: DynamicsOutput) -> bool {
        !self.mappings(output).is_empty()
    }

    fn evaluate(&self, output: DynamicsOutput, coords: &Coords, ctx: &DynamicsContext) -> f64 {
        let mean = self.mean(output, coords, ctx);
        match output {
            DynamicsOutput::Angle => mean.map_or(0.0, |m| m - 0.5),
            DynamicsOutput::AspectRatio => mean.map_or(0.0, |m| 2.0 * m - 1.0),
            _ => mean.unwrap_or(1.0),
        }
    }
}

/// How the fade position repeats along the stroke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FadeRepeat {
    #[default]
    None,
    Sawtooth,
    Triangular,
}

/// Fade configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FadeOptions {
    /// Fade length in pixels; 0 disables fading
    pub length: f64,
    pub repeat: FadeRepeat,
    pub reverse: bool,
}

impl Default for FadeOptions {
    fn default() -> Self {
        Self {
            length: 0.0,
            repeat: FadeRepeat::None,
            reverse: false,
        }
    }
}

impl FadeOptions {
    /// Position along the fade after `pixel_dist` pixels of stroke.
    ///
    /// Disabled fading reports 1.0 so that a linear fade curve is neutral.
    pub fn fade_point(&self, pixel_dist: f64) -> f64 {
        if self.length <= 0.0 {
            return 1.0;
        }
        let pos = pixel_dist / self.length;
        let pos = match self.repeat {
            FadeRepeat::None => pos.clamp(0.0, 1.0),
            FadeRepeat::Sawtooth => pos - pos.floor(),
            FadeRepeat::Triangular => {
                let cycle = pos.floor();
                let frac = pos - cycle;
                if (cycle as i64) % 2 == 1 {
                    1.0 - frac
                } else {
                    frac
                }
            }
        };
        if self.reverse {
            1.0 - pos
        } else {
            pos
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_curve_linear() {
        let curve = PressureCurve::Linear;
        assert_eq!(curve.apply(0.0), 0.0);
        assert_eq!(curve.apply(0.5), 0.5);
        assert_eq!(curve.apply(1.0), 1.0);
    }

    #[test]
    fn test_pressure_curve_soft_and_hard() {
        assert!(PressureCurve::Soft.apply(0.5) > 0.5);
        assert!(PressureCurve::Hard.apply(0.5) < 0.5);
        assert_eq!(PressureCurve::Hard.apply(1.0), 1.0);
    }

    #[test]
    fn test_pressure_clamping() {
        let curve = PressureCurve::Linear;
        assert_eq!(curve.apply(-0.5), 0.0);
        assert_eq!(curve.apply(1.5), 1.0);
    }

    #[test]
    fn test_custom_curve_interpolates() {
        let curve = PressureCurve::Custom(vec![[0.0, 0.2], [0.5, 0.4], [1.0, 1.0]]);
        assert!((curve.apply(0.25) - 0.3).abs() < 1e-6);
        assert!((curve.apply(0.75) - 0.7).abs() < 1e-6);
        assert_eq!(PressureCurve::Custom(vec![]).apply(0.3), 0.3);
    }

    #[test]
    fn test_disabled_outputs_are_neutral() {
        let dynamics = Dynamics::off();
        let coords = Coords::new(0.0, 0.0, 0.2);
        let ctx = DynamicsContext::default();
        assert_eq!(dynamics.evaluate(DynamicsOutput::Size, &coords, &ctx), 1.0);
        assert_eq!(dynamics.evaluate(DynamicsOutput::Angle, &coords, &ctx), 0.0);
        assert_eq!(dynamics.evaluate(DynamicsOutput::AspectRatio, &coords, &ctx), 0.0);
        assert!(!dynamics.is_enabled(DynamicsOutput::Spacing));
    }

    #[test]
    fn test_linear_output_is_mean_of_inputs() {
        let mut dynamics = Dynamics::pressure_size_opacity();
        dynamics.size.push(InputMapping {
            input: DynamicsInput::Velocity,
            curve: PressureCurve::Linear,
        });
        let coords = Coords {
            velocity: 0.6,
            ..Coords::new(0.0, 0.0, 0.8)
        };
        let value = dynamics.evaluate(DynamicsOutput::Size, &coords, &DynamicsContext::default());
        assert!((value - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_aspect_output_is_signed() {
        let mut dynamics = Dynamics::off();
        dynamics.aspect_ratio.push(InputMapping {
            input: DynamicsInput::Pressure,
            curve: PressureCurve::Linear,
        });
        let coords = Coords::new(0.0, 0.0, 0.25);
        let value = dynamics.evaluate(DynamicsOutput::AspectRatio, &coords, &DynamicsContext::default());
        assert!((value + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fade_repeat_modes() {
        let mut fade = FadeOptions {
            length: 10.0,
            ..FadeOptions::default()
        };
        assert_eq!(fade.fade_point(25.0), 1.0);
        fade.repeat = FadeRepeat::Sawtooth;
        assert!((fade.fade_point(25.0) - 0.5).abs() < 1e-9);
        fade.repeat = FadeRepeat::Triangular;
        assert!((fade.fade_point(12.5) - 0.75).abs() < 1e-9);
        fade.reverse = true;
        assert!((fade.fade_point(12.5) - 0.25).abs() < 1e-9);
        assert_eq!(FadeOptions::default().fade_point(100.0), 1.0);
    }

    #[test]
    fn test_dynamics_from_json() {
        let json = r#"{"name": "Tilt", "angle": [{"input": "tilt"}]}"#;
        let dynamics: Dynamics = serde_json::from_str(json).unwrap();
        assert!(dynamics.is_enabled(DynamicsOutput::Angle));
        assert_eq!(dynamics.angle[0].curve, PressureCurve::Linear);
    }
}
