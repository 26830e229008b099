//! Precomputed latent codes for every (band, effect, gain, tone) combination.
//!
//! The table is immutable after loading. Build it once at startup and hand it
//! out as `Arc<LatentTable>`; lookups are allocation-free and lock-free.

use super::{LATENT_SIZE, NUM_BANDS};
use crate::params::EffectType;
use anyhow::{anyhow, bail, Context};
use nih_plug::prelude::Enum;
use serde::Deserialize;
use std::io::Read;

pub type Latent = [f32; LATENT_SIZE];

pub const NUM_EFFECT_TYPES: usize = 3;
/// Gain/tone parameter levels are 0, 2, 4, 6, 8, 10.
pub const NUM_LEVELS: usize = 6;
pub const LEVEL_STEP: i32 = 2;
pub const MAX_LEVEL: i32 = LEVEL_STEP * (NUM_LEVELS as i32 - 1);

type Grid = [[[Latent; NUM_LEVELS]; NUM_LEVELS]; NUM_EFFECT_TYPES];

const CELLS_PER_BAND: usize = NUM_EFFECT_TYPES * NUM_LEVELS * NUM_LEVELS;

#[derive(Clone)]
pub struct LatentTable {
    bands: Box<[Grid; NUM_BANDS]>,
}

impl std::fmt::Debug for LatentTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatentTable")
            .field("bands", &NUM_BANDS)
            .field("cells_per_band", &CELLS_PER_BAND)
            .finish()
    }
}

impl LatentTable {
    /// Builds a table by evaluating `f(band, effect, gain_index, tone_index)`
    /// for every cell. Indices, not parameter levels.
    pub fn from_fn(mut f: impl FnMut(usize, usize, usize, usize) -> Latent) -> Self {
        let mut bands = Box::new([[[[[0.0; LATENT_SIZE]; NUM_LEVELS]; NUM_LEVELS]; NUM_EFFECT_TYPES]; NUM_BANDS]);
        for (band, grid) in bands.iter_mut().enumerate() {
            for (effect, gains) in grid.iter_mut().enumerate() {
                for (gain, tones) in gains.iter_mut().enumerate() {
                    for (tone, cell) in tones.iter_mut().enumerate() {
                        *cell = f(band, effect, gain, tone);
                    }
                }
            }
        }
        Self { bands }
    }

    /// Looks up the latent for a band given integer parameter levels.
    ///
    /// `gain` and `tone` are parameter levels (0..=10, stepped by 2). Every
    /// axis is clamped into range, so out-of-range input never reads outside
    /// the table.
    #[inline]
    pub fn latent(&self, band: usize, effect: i32, gain: i32, tone: i32) -> &Latent {
        let band = band.min(NUM_BANDS - 1);
        let effect = effect.clamp(0, NUM_EFFECT_TYPES as i32 - 1) as usize;
        &self.bands[band][effect][level_index(gain)][level_index(tone)]
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let file: LatentFile = serde_json::from_str(json).context("malformed latent table JSON")?;
        Self::from_entries(file.entries)
    }

    pub fn from_json_reader(reader: impl Read) -> anyhow::Result<Self> {
        let file: LatentFile =
            serde_json::from_reader(reader).context("malformed latent table JSON")?;
        Self::from_entries(file.entries)
    }

    fn from_entries(entries: Vec<LatentEntry>) -> anyhow::Result<Self> {
        let mut shared: Vec<Option<Latent>> = vec![None; CELLS_PER_BAND];
        let mut per_band: Vec<Vec<Option<Latent>>> = vec![vec![None; CELLS_PER_BAND]; NUM_BANDS];

        for (i, entry) in entries.iter().enumerate() {
            let effect = entry.effect.index().with_context(|| format!("entry {i}"))?;
            let gain = checked_level(entry.gain).with_context(|| format!("entry {i}: gain"))?;
            let tone = checked_level(entry.tone).with_context(|| format!("entry {i}: tone"))?;
            let cell = cell_index(effect, gain, tone);
            match entry.band {
                None => shared[cell] = Some(entry.latent),
                Some(band) if band < NUM_BANDS => per_band[band][cell] = Some(entry.latent),
                Some(band) => bail!("entry {i}: band {band} out of range 0..{NUM_BANDS}"),
            }
        }

        let mut missing = None;
        let table = Self::from_fn(|band, effect, gain, tone| {
            let cell = cell_index(effect, gain, tone);
            match per_band[band][cell].or(shared[cell]) {
                Some(latent) => latent,
                None => {
                    missing.get_or_insert((band, effect, gain, tone));
                    [0.0; LATENT_SIZE]
                }
            }
        });

        if let Some((band, effect, gain, tone)) = missing {
            bail!(
                "latent table incomplete: no entry for band {band}, effect {effect}, gain {}, tone {}",
                gain as i32 * LEVEL_STEP,
                tone as i32 * LEVEL_STEP
            );
        }
        Ok(table)
    }
}

#[inline]
fn level_index(level: i32) -> usize {
    (level.clamp(0, MAX_LEVEL) / LEVEL_STEP) as usize
}

#[inline]
fn cell_index(effect: usize, gain: usize, tone: usize) -> usize {
    (effect * NUM_LEVELS + gain) * NUM_LEVELS + tone
}

fn checked_level(level: u32) -> anyhow::Result<usize> {
    if level as i32 > MAX_LEVEL {
        bail!("level {level} above {MAX_LEVEL}");
    }
    Ok(level_index(level as i32))
}

#[derive(Deserialize)]
struct LatentFile {
    entries: Vec<LatentEntry>,
}

#[derive(Deserialize)]
struct LatentEntry {
    #[serde(default)]
    band: Option<usize>,
    effect: EffectKey,
    gain: u32,
    tone: u32,
    latent: Latent,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EffectKey {
    Index(usize),
    Label(String),
}

impl EffectKey {
    fn index(&self) -> anyhow::Result<usize> {
        match self {
            EffectKey::Index(i) if *i < NUM_EFFECT_TYPES => Ok(*i),
            EffectKey::Index(i) => Err(anyhow!("effect index {i} out of range")),
            EffectKey::Label(label) => EffectType::from_label(label)
                .map(|e| e.to_index())
                .ok_or_else(|| anyhow!("unknown effect label '{label}'")),
        }
    }
}
