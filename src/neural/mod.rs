//! Neural inference core: latent lookup, conditioning and the stateful engine.

pub mod assets;
pub mod backend;
pub mod conditioning;
pub mod engine;
pub mod latent;
#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod tensor;

pub use backend::{ComputeDevice, ForwardOutput, ModelBackend};
pub use conditioning::{ConditioningBuilder, ConditioningTensor};
pub use engine::{EnginePhase, InferenceEngine, StateInit};
pub use latent::{Latent, LatentTable};
pub use tensor::{StateUpdate, Tensor3};

use crate::config::PrismConfig;
use crate::error::InitError;
use crate::status::EngineStatus;
use std::sync::Arc;

/// Number of frequency bands, each with its own effect/gain/tone.
pub const NUM_BANDS: usize = 8;
/// Size of one band's latent code.
pub const LATENT_SIZE: usize = 8;
/// Length of the recurrent state vector carried between blocks.
pub const STATE_SIZE: usize = 1022;

pub const CONDITIONING_SHAPE: [usize; 3] = [1, NUM_BANDS, LATENT_SIZE];
pub const STATE_SHAPE: [usize; 3] = [1, 1, STATE_SIZE];

#[inline]
pub fn audio_shape(block_size: usize) -> [usize; 3] {
    [1, block_size, 1]
}

/// Resolves the model asset, builds the configured backend and initializes
/// an [`InferenceEngine`] on it. Every failure here is fatal for the effect.
pub fn load_engine(
    config: &PrismConfig,
    status: Arc<EngineStatus>,
) -> Result<InferenceEngine, InitError> {
    let backend = load_backend(config)?;
    Ok(InferenceEngine::initialize(backend, config.state_init, status))
}

#[cfg(feature = "onnx")]
fn load_backend(config: &PrismConfig) -> Result<Box<dyn ModelBackend>, InitError> {
    let bytes = assets::model_bytes(config).map_err(InitError::ModelLoad)?;
    let device = ComputeDevice::select(config.prefer_accelerator, onnx::ACCELERATOR_AVAILABLE);
    let backend =
        onnx::OnnxBackend::from_bytes(&bytes, device, config.optimize).map_err(InitError::ModelLoad)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "onnx"))]
fn load_backend(_config: &PrismConfig) -> Result<Box<dyn ModelBackend>, InitError> {
    Err(InitError::NoBackend)
}
