//! Stateful block inference.
//!
//! The engine owns the backend, the recurrent state and every tensor handed
//! to the model. `prepare` allocates; `set_conditioning` and `run_inference`
//! do not (beyond what the backend itself does internally).

use super::backend::{ComputeDevice, ForwardOutput, ModelBackend};
use super::conditioning::ConditioningTensor;
use super::tensor::{StateUpdate, Tensor3};
use super::{audio_shape, CONDITIONING_SHAPE, STATE_SHAPE};
use crate::error::{InferenceError, InitError};
use crate::status::EngineStatus;
use assert_no_alloc::permit_alloc;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Initial value of the recurrent state, restored on every reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StateInit {
    #[default]
    Zeros,
    /// Standard normal noise from a fixed seed.
    Gaussian { seed: u64 },
}

impl StateInit {
    pub fn build(&self) -> Tensor3 {
        let mut state = Tensor3::zeros(STATE_SHAPE);
        if let StateInit::Gaussian { seed } = *self {
            let mut rng = StdRng::seed_from_u64(seed);
            for v in state.as_mut_slice() {
                // Box-Muller; 1 - u keeps the log argument in (0, 1]
                let u1: f32 = 1.0 - rng.gen::<f32>();
                let u2: f32 = rng.gen::<f32>();
                *v = (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos();
            }
        }
        state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// Model loaded, no block size negotiated yet.
    Uninitialized,
    /// Buffers allocated for a block size; state at its initial value.
    Prepared,
    /// At least one block has run since the last prepare.
    Running,
}

pub struct InferenceEngine {
    backend: Box<dyn ModelBackend>,
    status: Arc<EngineStatus>,
    phase: EnginePhase,
    block_size: usize,

    input_audio: Tensor3,
    conditioning: Tensor3,
    state: Tensor3,
    initial_state: Tensor3,
    output: ForwardOutput,
}

impl InferenceEngine {
    /// Wraps a loaded backend. The state starts at `state_init` and the
    /// conditioning at zero; no audio buffers exist until [`prepare`](Self::prepare).
    pub fn initialize(
        backend: Box<dyn ModelBackend>,
        state_init: StateInit,
        status: Arc<EngineStatus>,
    ) -> Self {
        let device = backend.device();
        status.set_device(device);
        info!("Inference engine ready: backend '{}' on {}", backend.name(), device.name());

        let initial_state = state_init.build();
        Self {
            backend,
            status,
            phase: EnginePhase::Uninitialized,
            block_size: 0,
            input_audio: Tensor3::zeros(audio_shape(0)),
            conditioning: Tensor3::zeros(CONDITIONING_SHAPE),
            state: initial_state.clone(),
            initial_state,
            output: ForwardOutput::new(0),
        }
    }

    /// Allocates buffers for `block_size` and resets the recurrent state.
    ///
    /// Not real-time safe. On failure the engine is left `Uninitialized` and
    /// will refuse to run until a later prepare succeeds.
    pub fn prepare(&mut self, block_size: usize) -> Result<(), InitError> {
        if block_size == 0 {
            return Err(InitError::InvalidBlockSize(block_size));
        }

        self.phase = EnginePhase::Uninitialized;
        self.backend
            .prepare(block_size)
            .map_err(|reason| InitError::Prepare { block_size, reason })?;

        self.input_audio = Tensor3::zeros(audio_shape(block_size));
        self.output = ForwardOutput::new(block_size);
        self.state = self.initial_state.clone();
        self.block_size = block_size;
        self.phase = EnginePhase::Prepared;

        info!("Inference prepared for {block_size} samples per block");
        Ok(())
    }

    /// Restores the recurrent state to its initial value.
    pub fn reset_state(&mut self) {
        let initial = &self.initial_state;
        let outcome = if initial.shape() == self.state.shape() {
            self.state.update_or_replace(initial.shape(), initial.as_slice())
        } else {
            permit_alloc(|| self.state.update_or_replace(initial.shape(), initial.as_slice()))
        };
        if outcome == StateUpdate::Replaced {
            self.status.record_state_reallocation();
        }
        if self.phase == EnginePhase::Running {
            self.phase = EnginePhase::Prepared;
        }
    }

    /// Copies the per-band latents into the engine's conditioning buffer.
    #[inline]
    pub fn set_conditioning(&mut self, conditioning: &ConditioningTensor) {
        self.conditioning.copy_from(conditioning.as_flat());
    }

    /// Runs one block through the model and carries the recurrent state forward.
    ///
    /// `input` and `output` must both be exactly the prepared block size. The
    /// new state is committed only when the whole call succeeds.
    pub fn run_inference(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), InferenceError> {
        if self.phase == EnginePhase::Uninitialized {
            debug_assert!(false, "run_inference called before prepare");
            self.status.record_contract_violation();
            return Err(InferenceError::NotPrepared);
        }
        if input.len() != self.block_size || output.len() != self.block_size {
            let actual = if input.len() != self.block_size {
                input.len()
            } else {
                output.len()
            };
            debug_assert!(
                false,
                "block size mismatch: prepared for {}, got {}",
                self.block_size, actual
            );
            self.status.record_contract_violation();
            return Err(InferenceError::BlockSizeMismatch {
                expected: self.block_size,
                actual,
            });
        }

        self.input_audio.copy_from(input);

        if let Err(err) = self.backend.forward(
            &self.input_audio,
            &self.conditioning,
            &self.state,
            &mut self.output,
        ) {
            self.status.record_inference_failure();
            return Err(err);
        }

        let expected = audio_shape(self.block_size);
        if self.output.audio.shape() != expected {
            self.status.record_inference_failure();
            return Err(InferenceError::OutputShape {
                expected,
                actual: self.output.audio.shape(),
            });
        }

        output.copy_from_slice(self.output.audio.as_slice());

        let next = &self.output.state;
        let outcome = if next.shape() == self.state.shape() {
            self.state.update_or_replace(next.shape(), next.as_slice())
        } else {
            // Shape drift is rare; the reallocation is counted in the status
            permit_alloc(|| self.state.update_or_replace(next.shape(), next.as_slice()))
        };
        if outcome == StateUpdate::Replaced {
            self.status.record_state_reallocation();
        }
        self.phase = EnginePhase::Running;
        Ok(())
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn device(&self) -> ComputeDevice {
        self.backend.device()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &Tensor3 {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn load_state(&mut self, state: &Tensor3) {
        self.state = state.clone();
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        let reallocations = self.status.state_reallocations();
        if reallocations > 0 {
            warn!("Recurrent state was reallocated {reallocations} time(s) during processing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::mock::MockBackend;
    use crate::neural::{LATENT_SIZE, NUM_BANDS, STATE_SIZE};
    use std::sync::atomic::Ordering;

    const BLOCK: usize = 512;

    fn engine() -> (InferenceEngine, Arc<crate::neural::mock::MockControl>, Arc<EngineStatus>) {
        let (backend, control) = MockBackend::boxed();
        let status = Arc::new(EngineStatus::new());
        let engine = InferenceEngine::initialize(backend, StateInit::Zeros, status.clone());
        (engine, control, status)
    }

    fn sine(len: usize, phase: f32) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.05 + phase).sin() * 0.5).collect()
    }

    #[test]
    fn test_phases() {
        let (mut engine, _, _) = engine();
        assert_eq!(engine.phase(), EnginePhase::Uninitialized);

        engine.prepare(BLOCK).unwrap();
        assert_eq!(engine.phase(), EnginePhase::Prepared);

        let input = vec![0.0; BLOCK];
        let mut output = vec![0.0; BLOCK];
        engine.run_inference(&input, &mut output).unwrap();
        assert_eq!(engine.phase(), EnginePhase::Running);

        engine.run_inference(&input, &mut output).unwrap();
        assert_eq!(engine.phase(), EnginePhase::Running);
    }

    #[test]
    fn test_output_length_matches_prepared_block() {
        let (mut engine, control, _) = engine();
        for block in [64, 512, 1024] {
            engine.prepare(block).unwrap();
            assert_eq!(control.prepared_block_size.load(Ordering::Relaxed), block as u32);

            let input = sine(block, 0.0);
            let mut output = vec![0.0; block];
            engine.run_inference(&input, &mut output).unwrap();
            assert_eq!(output.len(), block);
            assert!(output.iter().any(|v| *v != 0.0));
        }
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let (mut engine, _, _) = engine();
        assert!(matches!(engine.prepare(0), Err(InitError::InvalidBlockSize(0))));
        assert_eq!(engine.phase(), EnginePhase::Uninitialized);
    }

    #[test]
    fn test_state_continuity_is_reproducible() {
        let x1 = sine(BLOCK, 0.0);
        let x2 = sine(BLOCK, 1.0);
        let mut y = vec![0.0; BLOCK];

        let (mut a, _, _) = engine();
        a.prepare(BLOCK).unwrap();
        a.run_inference(&x1, &mut y).unwrap();
        let state_after_first = a.state().clone();
        let mut ya = vec![0.0; BLOCK];
        a.run_inference(&x2, &mut ya).unwrap();

        // A fresh engine seeded with the carried state reproduces the second block exactly
        let (mut b, _, _) = engine();
        b.prepare(BLOCK).unwrap();
        b.load_state(&state_after_first);
        let mut yb = vec![0.0; BLOCK];
        b.run_inference(&x2, &mut yb).unwrap();

        assert_eq!(
            ya.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            yb.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn test_state_updates_in_place() {
        let (mut engine, _, status) = engine();
        engine.prepare(BLOCK).unwrap();
        let ptr = engine.state().as_slice().as_ptr();

        let input = sine(BLOCK, 0.0);
        let mut output = vec![0.0; BLOCK];
        for _ in 0..4 {
            engine.run_inference(&input, &mut output).unwrap();
        }

        assert_eq!(engine.state().as_slice().as_ptr(), ptr);
        assert_eq!(status.state_reallocations(), 0);
    }

    #[test]
    fn test_state_shape_change_falls_back_to_replace() {
        let (mut engine, control, status) = engine();
        engine.prepare(BLOCK).unwrap();
        control.wrong_state_shape.store(true, Ordering::Relaxed);

        let input = sine(BLOCK, 0.0);
        let mut output = vec![0.0; BLOCK];
        engine.run_inference(&input, &mut output).unwrap();

        assert_eq!(engine.state().shape(), [1, 1, STATE_SIZE + 2]);
        assert_eq!(status.state_reallocations(), 1);

        // Reset goes back to the canonical shape
        engine.reset_state();
        assert_eq!(engine.state().shape(), STATE_SHAPE);
    }

    #[test]
    fn test_failed_forward_leaves_state_untouched() {
        let (mut engine, control, status) = engine();
        engine.prepare(BLOCK).unwrap();

        let input = sine(BLOCK, 0.0);
        let mut output = vec![0.0; BLOCK];
        engine.run_inference(&input, &mut output).unwrap();
        let before = engine.state().clone();

        control.fail_next.store(true, Ordering::Relaxed);
        let mut failed_output = vec![0.25; BLOCK];
        let result = engine.run_inference(&input, &mut failed_output);

        assert!(matches!(result, Err(InferenceError::Forward(_))));
        assert_eq!(engine.state(), &before);
        assert!(failed_output.iter().all(|v| *v == 0.25));
        assert_eq!(status.inference_failures(), 1);

        // The next call picks up from the last good state
        engine.run_inference(&input, &mut output).unwrap();
        assert!(output.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_prepare_and_reset_restore_initial_state() {
        let (mut engine, _, _) = engine();
        engine.prepare(BLOCK).unwrap();
        let initial = engine.state().clone();

        let input = vec![0.0; BLOCK];
        let mut output = vec![0.0; BLOCK];
        engine.run_inference(&input, &mut output).unwrap();
        assert_ne!(engine.state(), &initial);

        engine.reset_state();
        assert_eq!(engine.state(), &initial);
        assert_eq!(engine.phase(), EnginePhase::Prepared);

        engine.run_inference(&input, &mut output).unwrap();
        engine.prepare(256).unwrap();
        assert_eq!(engine.state(), &initial);
    }

    #[test]
    fn test_silence_scenario() {
        let (mut engine, _, _) = engine();
        engine.prepare(BLOCK).unwrap();

        let mut conditioning = crate::neural::ConditioningBuilder::new(Arc::new(
            crate::neural::latent::tests::coordinate_table(),
        ));
        let bands = [crate::params::BandSettings {
            effect_type: 0.0,
            gain: 4.0,
            tone: 4.0,
        }; NUM_BANDS];
        engine.set_conditioning(conditioning.build(&bands));

        let silence = vec![0.0; BLOCK];
        let mut output = vec![1.0; BLOCK];
        for _ in 0..2 {
            let before = engine.state().clone();
            engine.run_inference(&silence, &mut output).unwrap();
            assert!(output.iter().all(|v| v.abs() < 1e-6));
            assert_ne!(engine.state(), &before);
        }
    }

    #[test]
    fn test_conditioning_reaches_model() {
        let (mut engine, _, _) = engine();
        engine.prepare(BLOCK).unwrap();
        let input = sine(BLOCK, 0.0);

        let mut quiet = vec![0.0; BLOCK];
        engine.run_inference(&input, &mut quiet).unwrap();

        let table = crate::neural::LatentTable::from_fn(|_, _, _, _| [4.0; LATENT_SIZE]);
        let mut builder = crate::neural::ConditioningBuilder::new(Arc::new(table));
        engine.set_conditioning(builder.build(&crate::params::ParameterSnapshot::default().bands));
        engine.reset_state();

        let mut driven = vec![0.0; BLOCK];
        engine.run_inference(&input, &mut driven).unwrap();

        assert!(driven[10].abs() > quiet[10].abs());
    }

    #[test]
    fn test_gaussian_state_init_is_seeded() {
        let a = StateInit::Gaussian { seed: 7 }.build();
        let b = StateInit::Gaussian { seed: 7 }.build();
        let c = StateInit::Gaussian { seed: 8 }.build();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_slice().iter().all(|v| v.is_finite()));

        let mean = a.as_slice().iter().sum::<f32>() / a.len() as f32;
        assert!(mean.abs() < 0.2);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "block size mismatch")]
    fn test_mismatched_block_panics_in_debug() {
        let (mut engine, _, _) = engine();
        engine.prepare(BLOCK).unwrap();
        let input = vec![0.0; BLOCK / 2];
        let mut output = vec![0.0; BLOCK / 2];
        let _ = engine.run_inference(&input, &mut output);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_mismatched_block_is_rejected_in_release() {
        let (mut engine, _, status) = engine();
        engine.prepare(BLOCK).unwrap();
        let before = engine.state().clone();
        let input = vec![0.0; BLOCK / 2];
        let mut output = vec![0.5; BLOCK / 2];

        let result = engine.run_inference(&input, &mut output);

        assert!(matches!(
            result,
            Err(InferenceError::BlockSizeMismatch { expected: BLOCK, actual }) if actual == BLOCK / 2
        ));
        assert!(output.iter().all(|v| *v == 0.5));
        assert_eq!(engine.state(), &before);
        assert_eq!(status.contract_violations(), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "before prepare")]
    fn test_run_before_prepare_panics_in_debug() {
        let (mut engine, _, _) = engine();
        let _ = engine.run_inference(&[], &mut []);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_run_before_prepare_is_rejected_in_release() {
        let (mut engine, _, _) = engine();
        assert!(matches!(
            engine.run_inference(&[], &mut []),
            Err(InferenceError::NotPrepared)
        ));
    }
}
