//! Per-band parameter values to the `(1, NUM_BANDS, LATENT_SIZE)` conditioning tensor.

use super::latent::{Latent, LatentTable};
use super::{LATENT_SIZE, NUM_BANDS};
use crate::params::BandSettings;
use std::sync::Arc;

/// Row-major `(1, NUM_BANDS, LATENT_SIZE)` conditioning data, one row per band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditioningTensor {
    rows: [Latent; NUM_BANDS],
}

impl Default for ConditioningTensor {
    fn default() -> Self {
        Self {
            rows: [[0.0; LATENT_SIZE]; NUM_BANDS],
        }
    }
}

impl ConditioningTensor {
    #[inline]
    pub fn row(&self, band: usize) -> &Latent {
        &self.rows[band]
    }

    /// All rows flattened in band order.
    #[inline]
    pub fn as_flat(&self) -> &[f32] {
        self.rows.as_flattened()
    }
}

/// Rebuilds the conditioning tensor from a parameter snapshot.
///
/// The output tensor is owned here and overwritten on every build; it never
/// allocates, so it is safe to call once per block on the audio thread.
pub struct ConditioningBuilder {
    table: Arc<LatentTable>,
    tensor: ConditioningTensor,
}

impl ConditioningBuilder {
    pub fn new(table: Arc<LatentTable>) -> Self {
        Self {
            table,
            tensor: ConditioningTensor::default(),
        }
    }

    /// Writes all `NUM_BANDS` rows. Continuous values are truncated to integer
    /// levels before lookup.
    pub fn build(&mut self, bands: &[BandSettings; NUM_BANDS]) -> &ConditioningTensor {
        for (band, (settings, row)) in bands.iter().zip(self.tensor.rows.iter_mut()).enumerate() {
            *row = *self.table.latent(
                band,
                settings.effect_type as i32,
                settings.gain as i32,
                settings.tone as i32,
            );
        }
        &self.tensor
    }
}
