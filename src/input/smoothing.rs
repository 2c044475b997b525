//! Stroke smoothing - velocity-windowed gaussian average of recent samples

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::Coords;

/// Smoothing settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmoothingOptions {
    pub enabled: bool,
    /// Number of recent samples averaged, 0 disables smoothing
    pub quality: usize,
    /// Width of the gaussian window over accumulated velocity
    pub factor: f64,
}

impl Default for SmoothingOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            quality: 20,
            factor: 50.0,
        }
    }
}

/// Averages each sample's position with the samples before it.
///
/// Weights fall off with the velocity accumulated walking back through the
/// history, so slow motion is smoothed over more samples than fast motion.
#[derive(Debug, Clone)]
pub struct StrokeSmoother {
    options: SmoothingOptions,
    history: VecDeque<Coords>,
}

impl StrokeSmoother {
    pub fn new(options: SmoothingOptions) -> Self {
        Self {
            options,
            history: VecDeque::with_capacity(options.quality.max(1)),
        }
    }

    pub fn options(&self) -> SmoothingOptions {
        self.options
    }

    fn is_active(&self) -> bool {
        self.options.enabled && self.options.quality > 0 && self.options.factor > 0.0
    }

    /// Record `coords` and return it with a smoothed position.
    ///
    /// Everything but `x` and `y` passes through unchanged.
    pub fn smooth(&mut self, coords: &Coords) -> Coords {
        let mut out = *coords;
        if !self.is_active() {
            return out;
        }

        self.history.push_back(*coords);
        if self.history.len() > self.options.quality {
            self.history.pop_front();
        }
        if self.history.len() < 2 {
            return out;
        }

        let factor = self.options.factor;
        let gaussian_weight = 1.0 / ((2.0 * std::f64::consts::PI).sqrt() * factor);
        let variance2 = 2.0 * factor * factor;

        let mut velocity_sum = 0.0;
        let mut scale_sum = 0.0;
        let (mut x, mut y) = (0.0, 0.0);
        for sample in self.history.iter().rev() {
            velocity_sum += sample.velocity * 100.0;
            let rate = gaussian_weight * (-velocity_sum * velocity_sum / variance2).exp();
            scale_sum += rate;
            x += rate * sample.x;
            y += rate * sample.y;
        }

        if scale_sum > 0.0 {
            out.x = x / scale_sum;
            out.y = y / scale_sum;
        }
        out
    }

    /// Forget the history; called at stroke start
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl Default for StrokeSmoother {
    fn default() -> Self {
        Self::new(SmoothingOptions::default())
    }
}
