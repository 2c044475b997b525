//! Input module - the coordinate samples the paint core consumes

pub mod smoothing;

pub use smoothing::{SmoothingOptions, StrokeSmoother};

use serde::{Deserialize, Serialize};

/// One input sample in surface space.
///
/// Samples are produced by the input collaborator and consumed
/// synchronously; the interpolator derives intermediate samples by
/// linear blending between the last two recorded ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Coords {
    /// X coordinate in surface space
    pub x: f64,
    /// Y coordinate in surface space
    pub y: f64,
    /// Pressure (0.0 - 1.0)
    pub pressure: f64,
    /// Horizontal tilt (-1.0 - 1.0)
    pub xtilt: f64,
    /// Vertical tilt (-1.0 - 1.0)
    pub ytilt: f64,
    /// Wheel / barrel rotation (0.0 - 1.0, one full turn)
    pub wheel: f64,
    /// Pointer velocity (0.0 - 1.0)
    pub velocity: f64,
    /// Direction of travel (0.0 - 1.0, one full turn)
    pub direction: f64,
    /// Display zoom along x, used by zoom-aware brush sizing
    pub xscale: f64,
    /// Display zoom along y
    pub yscale: f64,
    /// Whether the view is mirrored
    pub reflect: bool,
}

impl Default for Coords {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            pressure: 1.0,
            xtilt: 0.0,
            ytilt: 0.0,
            wheel: 0.5,
            velocity: 0.0,
            direction: 0.0,
            xscale: 1.0,
            yscale: 1.0,
            reflect: false,
        }
    }
}

impl Coords {
    /// Create a sample at `(x, y)` with the given pressure
    pub fn new(x: f64, y: f64, pressure: f64) -> Self {
        Self {
            x,
            y,
            pressure: pressure.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    /// Create with tilt
    pub fn with_tilt(x: f64, y: f64, pressure: f64, xtilt: f64, ytilt: f64) -> Self {
        Self {
            xtilt: xtilt.clamp(-1.0, 1.0),
            ytilt: ytilt.clamp(-1.0, 1.0),
            ..Self::new(x, y, pressure)
        }
    }

    /// Same position as `other`
    pub fn same_position(&self, other: &Coords) -> bool {
        self.x == other.x && self.y == other.y
    }

    /// Pixel cell containing this sample
    pub fn cell(&self) -> (i64, i64) {
        (self.x.floor() as i64, self.y.floor() as i64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_coords_creation() {
        let coords = Coords::new(100.0, 200.0, 0.5);

        assert_eq!(coords.x, 100.0);
        assert_eq!(coords.y, 200.0);
        assert_eq!(coords.pressure, 0.5);
        assert_eq!(coords.xscale, 1.0);
    }

    #[test]
    fn test_pressure_clamping() {
        assert_eq!(Coords::new(0.0, 0.0, 1.5).pressure, 1.0);
        assert_eq!(Coords::new(0.0, 0.0, -0.5).pressure, 0.0);
    }

    #[test]
    fn test_tilt_clamping() {
        let coords = Coords::with_tilt(0.0, 0.0, 1.0, 3.0, -3.0);
        assert_eq!(coords.xtilt, 1.0);
        assert_eq!(coords.ytilt, -1.0);
    }

    #[test]
    fn test_deserialize_partial_sample() {
        let coords: Coords = serde_json::from_str(r#"{"x": 4.5, "y": 2.0}"#).unwrap();
        assert_eq!(coords.x, 4.5);
        assert_eq!(coords.pressure, 1.0);
        assert_eq!(coords.cell(), (4, 2));
    }
}
