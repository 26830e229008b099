//! Host-facing parameter tree and the snapshot the audio path reads from it.
//!
//! The audio thread never holds on to parameter objects. Once per inference
//! block it takes a [`ParameterSnapshot`] (plain atomic loads) and works from
//! that copy.

use crate::neural::NUM_BANDS;
use nih_plug::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const LEVEL_MIN: f32 = 0.0;
pub const LEVEL_MAX: f32 = 10.0;
pub const LEVEL_STEP: f32 = 2.0;
pub const DEFAULT_LEVEL: f32 = 4.0;
pub const DEFAULT_OUTPUT_VOLUME: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    #[serde(alias = "riot")]
    #[name = "Distortion"]
    Distortion,
    #[name = "Fuzz"]
    Fuzz,
    #[serde(alias = "kingoftone")]
    #[name = "Overdrive"]
    Overdrive,
}

impl EffectType {
    /// Accepts display names and the model's training labels, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "distortion" | "riot" => Some(EffectType::Distortion),
            "fuzz" => Some(EffectType::Fuzz),
            "overdrive" | "kingoftone" => Some(EffectType::Overdrive),
            _ => None,
        }
    }

    /// Factory default for a band: three bands of distortion, three of fuzz,
    /// the top two overdrive.
    pub fn default_for_band(band: usize) -> Self {
        Self::from_index((band / 3).min(Self::variants().len() - 1))
    }
}

/// One band's values as the conditioning path sees them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSettings {
    pub effect_type: f32,
    pub gain: f32,
    pub tone: f32,
}

impl BandSettings {
    pub fn new(effect: EffectType, gain: f32, tone: f32) -> Self {
        Self {
            effect_type: effect.to_index() as f32,
            gain,
            tone,
        }
    }
}

/// Point-in-time copy of every parameter the core reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub bands: [BandSettings; NUM_BANDS],
    pub bypass: bool,
    pub output_volume: f32,
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            bands: std::array::from_fn(|band| {
                BandSettings::new(EffectType::default_for_band(band), DEFAULT_LEVEL, DEFAULT_LEVEL)
            }),
            bypass: false,
            output_volume: DEFAULT_OUTPUT_VOLUME,
        }
    }
}

/// Anything the audio path can poll for current parameter values.
pub trait ParameterSource {
    fn snapshot(&self) -> ParameterSnapshot;
}

impl ParameterSource for ParameterSnapshot {
    fn snapshot(&self) -> ParameterSnapshot {
        *self
    }
}

#[derive(Params)]
pub struct PrismParams {
    #[id = "bypass"]
    pub bypass: BoolParam,

    #[id = "output_volume"]
    pub output_volume: FloatParam,

    #[nested(array, group = "Band")]
    pub bands: [BandParams; NUM_BANDS],
}

#[derive(Params)]
pub struct BandParams {
    #[id = "effect"]
    pub effect: EnumParam<EffectType>,

    #[id = "gain"]
    pub gain: FloatParam,

    #[id = "tone"]
    pub tone: FloatParam,
}

impl BandParams {
    fn new(band: usize) -> Self {
        let n = band + 1;
        Self {
            effect: EnumParam::new(
                format!("Band {n} Effect"),
                EffectType::default_for_band(band),
            ),
            gain: level_param(format!("Band {n} Gain")),
            tone: level_param(format!("Band {n} Tone")),
        }
    }

    fn settings(&self) -> BandSettings {
        BandSettings::new(self.effect.value(), self.gain.value(), self.tone.value())
    }
}

fn level_param(name: String) -> FloatParam {
    FloatParam::new(
        name,
        DEFAULT_LEVEL,
        FloatRange::Linear {
            min: LEVEL_MIN,
            max: LEVEL_MAX,
        },
    )
    .with_step_size(LEVEL_STEP)
    .with_value_to_string(Arc::new(|v| format!("{v:.0}")))
}

impl Default for PrismParams {
    fn default() -> Self {
        Self {
            bypass: BoolParam::new("Bypass", false).make_bypass(),

            output_volume: FloatParam::new(
                "Output Volume",
                DEFAULT_OUTPUT_VOLUME,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_step_size(0.01)
            .with_unit(" %")
            .with_value_to_string(formatters::v2s_f32_percentage(0))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            bands: std::array::from_fn(BandParams::new),
        }
    }
}

impl ParameterSource for PrismParams {
    fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            bands: std::array::from_fn(|band| self.bands[band].settings()),
            bypass: self.bypass.value(),
            output_volume: self.output_volume.value(),
        }
    }
}
