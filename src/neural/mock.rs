//! Deterministic stand-in for a trained model, used by tests.
//!
//! Silence in gives silence out; the state drifts every call so continuity
//! can be observed.

use super::backend::{ComputeDevice, ForwardOutput, ModelBackend};
use super::tensor::Tensor3;
use super::{audio_shape, STATE_SHAPE, STATE_SIZE};
use crate::error::InferenceError;
use anyhow::anyhow;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct MockControl {
    pub fail_next: AtomicBool,
    pub wrong_state_shape: AtomicBool,
    pub calls: AtomicU32,
    pub prepared_block_size: AtomicU32,
}

pub struct MockBackend {
    control: Arc<MockControl>,
    block_size: usize,
}

impl MockBackend {
    pub fn new() -> (Self, Arc<MockControl>) {
        let control = Arc::new(MockControl::default());
        (
            Self {
                control: control.clone(),
                block_size: 0,
            },
            control,
        )
    }

    pub fn boxed() -> (Box<dyn ModelBackend>, Arc<MockControl>) {
        let (backend, control) = Self::new();
        (Box::new(backend), control)
    }
}

impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn device(&self) -> ComputeDevice {
        ComputeDevice::Cpu
    }

    fn prepare(&mut self, block_size: usize) -> anyhow::Result<()> {
        if block_size == 0 {
            return Err(anyhow!("block size must be non-zero"));
        }
        self.block_size = block_size;
        self.control
            .prepared_block_size
            .store(block_size as u32, Ordering::Relaxed);
        Ok(())
    }

    fn forward(
        &mut self,
        audio: &Tensor3,
        conditioning: &Tensor3,
        state: &Tensor3,
        out: &mut ForwardOutput,
    ) -> Result<(), InferenceError> {
        self.control.calls.fetch_add(1, Ordering::Relaxed);

        if self.control.fail_next.swap(false, Ordering::Relaxed) {
            // Scribble over the outputs to prove the caller does not commit them
            out.state.fill(f32::NAN);
            out.audio.fill(f32::NAN);
            return Err(InferenceError::Forward(anyhow!("injected failure")));
        }
        if audio.shape() != audio_shape(self.block_size) {
            return Err(InferenceError::Forward(anyhow!(
                "mock prepared for {} samples",
                self.block_size
            )));
        }

        let cond = conditioning.as_slice();
        let drive = 1.0 + cond.iter().map(|c| c.abs()).sum::<f32>() / cond.len().max(1) as f32;
        let s = state.as_slice();
        let colour = 1.0 + 0.1 * s.first().copied().unwrap_or(0.0).tanh();

        for (y, x) in out.audio.as_mut_slice().iter_mut().zip(audio.as_slice()) {
            *y = (drive * x).tanh() * colour;
        }

        let mean_in = audio.as_slice().iter().sum::<f32>() / audio.len().max(1) as f32;
        if self.control.wrong_state_shape.load(Ordering::Relaxed) {
            let grown: Vec<f32> = (0..STATE_SIZE + 2).map(|k| k as f32 * 1e-3).collect();
            out.state.update_or_replace([1, 1, STATE_SIZE + 2], &grown);
            return Ok(());
        }
        if out.state.shape() != STATE_SHAPE {
            out.state.update_or_replace(STATE_SHAPE, &[0.0; STATE_SIZE]);
        }
        for (k, v) in out.state.as_mut_slice().iter_mut().enumerate() {
            let prev = s.get(k).copied().unwrap_or(0.0);
            let c = cond.get(k % cond.len().max(1)).copied().unwrap_or(0.0);
            *v = 0.5 * prev + 0.1 + 0.01 * mean_in + 0.001 * c;
        }
        Ok(())
    }
}
