//! The model boundary.
//!
//! A backend evaluates `forward(audio (1,N,1), conditioning (1,8,8), state (1,1,1022))
//! -> (audio (1,N,1), state (1,1,1022))`. Nothing outside this trait knows which
//! inference runtime sits behind it.

use super::tensor::Tensor3;
use super::{audio_shape, STATE_SHAPE};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeDevice {
    Cpu,
    Accelerator,
}

impl ComputeDevice {
    /// Prefer an accelerator when one is both wanted and available.
    pub fn select(prefer_accelerator: bool, accelerator_available: bool) -> Self {
        if prefer_accelerator && accelerator_available {
            info!("Using accelerator");
            ComputeDevice::Accelerator
        } else {
            info!("Using CPU");
            ComputeDevice::Cpu
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComputeDevice::Cpu => "CPU",
            ComputeDevice::Accelerator => "Accelerator",
        }
    }
}

/// Destination buffers for one forward pass.
///
/// Owned by the engine and sized at prepare time, so a backend that writes
/// outputs of the negotiated shapes never reallocates them.
#[derive(Debug, Clone)]
pub struct ForwardOutput {
    pub audio: Tensor3,
    pub state: Tensor3,
}

impl ForwardOutput {
    pub fn new(block_size: usize) -> Self {
        Self {
            audio: Tensor3::zeros(audio_shape(block_size)),
            state: Tensor3::zeros(STATE_SHAPE),
        }
    }
}

pub trait ModelBackend: Send {
    fn name(&self) -> &str;

    fn device(&self) -> ComputeDevice;

    /// Called off the audio thread whenever the block size changes. May
    /// allocate and rebuild any internal execution plan.
    fn prepare(&mut self, block_size: usize) -> anyhow::Result<()>;

    /// Runs one forward pass, writing results into `out`.
    ///
    /// On error `out` may hold partial data; the caller must not commit it.
    fn forward(
        &mut self,
        audio: &Tensor3,
        conditioning: &Tensor3,
        state: &Tensor3,
        out: &mut ForwardOutput,
    ) -> Result<(), crate::error::InferenceError>;
}
