//! Runtime configuration.
//!
//! Read once, off the audio thread, from the JSON file named by `PRISM_CONFIG`.
//! Every field has a default so an empty object (or no file at all) is valid.

use crate::neural::StateInit;
use anyhow::Context;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "PRISM_CONFIG";
pub const DEFAULT_MODEL_SAMPLE_RATE: f32 = 48000.0;

/// What a block whose forward pass failed sounds like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave the buffer as the host delivered it, same as bypass.
    #[default]
    Passthrough,
    Silence,
}

/// How a multichannel input becomes the model's mono input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MonoInput {
    #[default]
    FirstChannel,
    Downmix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrismConfig {
    /// ONNX model file. Falls back to the bundled model when unset.
    pub model_path: Option<PathBuf>,
    /// Latent table JSON. Falls back to the bundled table when unset.
    pub latents_path: Option<PathBuf>,
    /// Inference block size. Defaults to the host's maximum buffer size.
    pub block_size: Option<usize>,
    pub model_sample_rate: f32,
    pub prefer_accelerator: bool,
    pub optimize: bool,
    pub state_init: StateInit,
    pub failure_policy: FailurePolicy,
    pub mono_input: MonoInput,
}

impl Default for PrismConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            latents_path: None,
            block_size: None,
            model_sample_rate: DEFAULT_MODEL_SAMPLE_RATE,
            prefer_accelerator: true,
            optimize: true,
            state_init: StateInit::Zeros,
            failure_policy: FailurePolicy::Passthrough,
            mono_input: MonoInput::FirstChannel,
        }
    }
}

impl PrismConfig {
    /// Loads from `$PRISM_CONFIG` if set, otherwise returns defaults.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_path(Path::new(&path)),
            None => {
                info!("{CONFIG_ENV_VAR} not set, using default configuration");
                Ok(Self::default())
            }
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::from_json_str(&json)
            .with_context(|| format!("invalid config {}", path.display()))?;

        // Relative asset paths are resolved against the config file's directory
        if let Some(dir) = path.parent() {
            config.model_path = config.model_path.map(|p| resolve(dir, p));
            config.latents_path = config.latents_path.map(|p| resolve(dir, p));
        }
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.block_size == Some(0) {
            anyhow::bail!("block_size must be greater than zero");
        }
        if !(self.model_sample_rate.is_finite() && self.model_sample_rate > 0.0) {
            anyhow::bail!("model_sample_rate must be positive");
        }
        if !self.optimize {
            warn!("Model optimisation disabled; inference will be slower");
        }
        Ok(())
    }
}

fn resolve(dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        dir.join(path)
    } else {
        path
    }
}
