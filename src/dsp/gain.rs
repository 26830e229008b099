//! Output gain smoothing.
//!
//! The target is set at most once per block; the gain then moves linearly,
//! one step per sample, over a fixed time regardless of sample rate.

use nih_plug::prelude::{Smoother, SmoothingStyle};

/// Ramp length for output gain changes.
pub const GAIN_RAMP_MS: f32 = 20.0;

pub struct GainSmoother {
    smoother: Smoother<f32>,
    sample_rate: f32,
    target: f32,
}

impl GainSmoother {
    pub fn new(initial: f32) -> Self {
        let smoother = Smoother::new(SmoothingStyle::Linear(GAIN_RAMP_MS));
        smoother.reset(initial);
        Self {
            smoother,
            sample_rate: 0.0,
            target: initial,
        }
    }

    /// Re-initialises for a (possibly new) sample rate, jumping straight to
    /// the current target.
    pub fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.smoother.reset(self.target);
    }

    /// Jumps to `value` without ramping.
    pub fn reset(&mut self, value: f32) {
        self.target = value;
        self.smoother.reset(value);
    }

    /// Starts a ramp towards `target`. Calling again with the same target
    /// leaves a running ramp alone.
    pub fn set_target(&mut self, target: f32) {
        if target != self.target {
            self.target = target;
            self.smoother.set_target(self.sample_rate, target);
        }
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        self.smoother.next()
    }

    /// Multiplies `buffer` by the gain, advancing one step per sample.
    pub fn apply(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample *= self.smoother.next();
        }
    }

    pub fn is_smoothing(&self) -> bool {
        self.smoother.steps_left() > 0
    }

    pub fn ramp_samples(&self) -> usize {
        (GAIN_RAMP_MS / 1000.0 * self.sample_rate).round() as usize
    }
}
