use crate::neural::NUM_BANDS;
use crate::params::{BandSettings, EffectType, ParameterSnapshot, ParameterSource};
use anyhow::{anyhow, Context};
use nih_plug::prelude::Enum;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// FACTORY PROGRAMS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
pub enum FactoryProgram {
    #[serde(rename = "Init Program")]
    #[name = "Init Program"]
    Init,
    #[serde(rename = "Heavy Distortion")]
    #[name = "Heavy Distortion"]
    HeavyDistortion,
    #[serde(rename = "Smooth Overdrive")]
    #[name = "Smooth Overdrive"]
    SmoothOverdrive,
    #[serde(rename = "Fuzzy Madness")]
    #[name = "Fuzzy Madness"]
    FuzzyMadness,
    #[serde(rename = "Distortion Bass Fuzz Highs")]
    #[name = "Distortion Bass Fuzz Highs"]
    DistortionBassFuzzHighs,
}

impl FactoryProgram {
    pub const ALL: [FactoryProgram; 5] = [
        FactoryProgram::Init,
        FactoryProgram::HeavyDistortion,
        FactoryProgram::SmoothOverdrive,
        FactoryProgram::FuzzyMadness,
        FactoryProgram::DistortionBassFuzzHighs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FactoryProgram::Init => "Init Program",
            FactoryProgram::HeavyDistortion => "Heavy Distortion",
            FactoryProgram::SmoothOverdrive => "Smooth Overdrive",
            FactoryProgram::FuzzyMadness => "Fuzzy Madness",
            FactoryProgram::DistortionBassFuzzHighs => "Distortion Bass Fuzz Highs",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FactoryProgram::Init => "Distortion lows, fuzz mids, overdrive highs at moderate drive",
            FactoryProgram::HeavyDistortion => "Full drive distortion on every band, dark tone",
            FactoryProgram::SmoothOverdrive => "Moderate overdrive with a brighter tone",
            FactoryProgram::FuzzyMadness => "High-gain fuzz everywhere, tone fully closed",
            FactoryProgram::DistortionBassFuzzHighs => {
                "Saturated distortion below, fuzz above with open highs"
            }
        }
    }

    /// Case-insensitive lookup by display name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn program(&self) -> Program {
        use EffectType::{Distortion as D, Fuzz as F, Overdrive as O};
        match self {
            FactoryProgram::Init => Program::new(
                self.name(),
                [D, D, D, F, F, F, O, O],
                [4.0; NUM_BANDS],
                [4.0; NUM_BANDS],
                1.0,
            ),
            FactoryProgram::HeavyDistortion => Program::new(
                self.name(),
                [D; NUM_BANDS],
                [10.0; NUM_BANDS],
                [2.0; NUM_BANDS],
                0.8,
            ),
            FactoryProgram::SmoothOverdrive => Program::new(
                self.name(),
                [O; NUM_BANDS],
                [4.0; NUM_BANDS],
                [6.0; NUM_BANDS],
                1.0,
            ),
            FactoryProgram::FuzzyMadness => Program::new(
                self.name(),
                [F; NUM_BANDS],
                [8.0; NUM_BANDS],
                [0.0; NUM_BANDS],
                0.9,
            ),
            FactoryProgram::DistortionBassFuzzHighs => Program::new(
                self.name(),
                [D, D, F, F, F, F, F, F],
                [10.0, 10.0, 8.0, 8.0, 8.0, 8.0, 0.0, 0.0],
                [2.0, 2.0, 0.0, 0.0, 0.0, 0.0, 10.0, 10.0],
                1.0,
            ),
        }
    }
}

// =============================================================================
// PROGRAMS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgramBand {
    pub effect: EffectType,
    pub gain: f32,
    pub tone: f32,
}

/// A named bundle of per-band settings plus output volume. Applying one
/// replaces every value at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub bands: [ProgramBand; NUM_BANDS],
    #[serde(default = "default_volume")]
    pub output_volume: f32,
}

fn default_volume() -> f32 {
    crate::params::DEFAULT_OUTPUT_VOLUME
}

impl Program {
    fn new(
        name: &str,
        effects: [EffectType; NUM_BANDS],
        gains: [f32; NUM_BANDS],
        tones: [f32; NUM_BANDS],
        output_volume: f32,
    ) -> Self {
        Self {
            name: name.to_string(),
            bands: std::array::from_fn(|i| ProgramBand {
                effect: effects[i],
                gain: gains[i],
                tone: tones[i],
            }),
            output_volume,
        }
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let program: Program = serde_json::from_str(json).context("malformed program JSON")?;
        program.validate()?;
        Ok(program)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read program {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("in {}", path.display()))
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (i, band) in self.bands.iter().enumerate() {
            for (what, v) in [("gain", band.gain), ("tone", band.tone)] {
                if !(0.0..=10.0).contains(&v) {
                    return Err(anyhow!("band {}: {what} {v} outside 0..=10", i + 1));
                }
            }
        }
        if !(0.0..=1.0).contains(&self.output_volume) {
            return Err(anyhow!("output volume {} outside 0..=1", self.output_volume));
        }
        Ok(())
    }
}

impl ParameterSource for Program {
    /// Programs never engage bypass.
    fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            bands: std::array::from_fn(|i| {
                let b = self.bands[i];
                BandSettings::new(b.effect, b.gain, b.tone)
            }),
            bypass: false,
            output_volume: self.output_volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_program_matches_defaults() {
        let snap = FactoryProgram::Init.program().snapshot();
        assert_eq!(snap, ParameterSnapshot::default());
    }

    #[test]
    fn test_factory_values() {
        let heavy = FactoryProgram::HeavyDistortion.program();
        assert!(heavy.bands.iter().all(|b| b.effect == EffectType::Distortion));
        assert!(heavy.bands.iter().all(|b| b.gain == 10.0 && b.tone == 2.0));
        assert!((heavy.output_volume - 0.8).abs() < 1e-6);

        let split = FactoryProgram::DistortionBassFuzzHighs.program().snapshot();
        assert_eq!(split.bands[0].effect_type, 0.0);
        assert_eq!(split.bands[2].effect_type, 1.0);
        assert_eq!(split.bands[7].tone, 10.0);
        assert_eq!(split.bands[6].gain, 0.0);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            FactoryProgram::from_name("fuzzy madness"),
            Some(FactoryProgram::FuzzyMadness)
        );
        assert_eq!(FactoryProgram::from_name("Clean Boost"), None);
        for p in FactoryProgram::ALL {
            assert_eq!(FactoryProgram::from_name(p.name()), Some(p));
        }
    }

    #[test]
    fn test_program_json() {
        let json = serde_json::to_string(&FactoryProgram::SmoothOverdrive.program()).unwrap();
        let parsed = Program::from_json_str(&json).unwrap();
        assert_eq!(parsed, FactoryProgram::SmoothOverdrive.program());

        let bad = json.replace("\"gain\":4.0", "\"gain\":14.0");
        assert!(Program::from_json_str(&bad).is_err());
    }
}
