//! Per-block orchestration: bypass, mono input, inference, output gain, fan-out.

use super::gain::GainSmoother;
use crate::config::{FailurePolicy, MonoInput, PrismConfig};
use crate::error::{InferenceError, InitError};
use crate::neural::{self, ConditioningBuilder, InferenceEngine, LatentTable};
use crate::params::{ParameterSnapshot, DEFAULT_OUTPUT_VOLUME};
use crate::status::EngineStatus;
use log::{info, warn};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Bypass was on; nothing was written.
    Bypassed,
    Processed,
    /// The forward pass failed and the failure policy was applied.
    Failed,
    /// The call broke the block contract (wrong size, not prepared); nothing
    /// was written.
    Rejected,
}

pub struct SignalPath {
    engine: InferenceEngine,
    conditioning: ConditioningBuilder,
    gain: GainSmoother,
    status: Arc<EngineStatus>,

    failure_policy: FailurePolicy,
    mono_input: MonoInput,
    model_sample_rate: f32,
    // Cleared by prepare/reset; the next block jumps straight to its volume
    gain_primed: bool,

    mono_in: Vec<f32>,
    mono_out: Vec<f32>,
}

impl SignalPath {
    /// Loads the latent table and model named by `config`. Any failure here
    /// means the effect cannot run.
    pub fn from_config(config: &PrismConfig, status: Arc<EngineStatus>) -> Result<Self, InitError> {
        let table = neural::assets::load_latent_table(config).map_err(InitError::LatentTable)?;
        let engine = neural::load_engine(config, status.clone())?;
        Ok(Self::new(engine, Arc::new(table), config, status))
    }

    pub fn new(
        engine: InferenceEngine,
        table: Arc<LatentTable>,
        config: &PrismConfig,
        status: Arc<EngineStatus>,
    ) -> Self {
        Self {
            engine,
            conditioning: ConditioningBuilder::new(table),
            gain: GainSmoother::new(DEFAULT_OUTPUT_VOLUME),
            status,
            failure_policy: config.failure_policy,
            mono_input: config.mono_input,
            model_sample_rate: config.model_sample_rate,
            gain_primed: false,
            mono_in: Vec::new(),
            mono_out: Vec::new(),
        }
    }

    /// Non-real-time. Allocates every buffer the block path needs, resets the
    /// recurrent state and re-initialises the gain ramp for `sample_rate`.
    pub fn prepare(&mut self, sample_rate: f32, block_size: usize) -> Result<(), InitError> {
        self.engine.prepare(block_size)?;
        self.mono_in = vec![0.0; block_size];
        self.mono_out = vec![0.0; block_size];

        self.gain.prepare(sample_rate);
        self.gain_primed = false;

        self.status.set_sample_rate(sample_rate, self.model_sample_rate);
        if self.status.sample_rate_mismatch() {
            warn!(
                "Host sample rate {sample_rate} Hz differs from the model's {} Hz; the sound will not match",
                self.model_sample_rate
            );
        }
        info!("Signal path prepared: {block_size} samples at {sample_rate} Hz");
        Ok(())
    }

    /// Real-time safe. Clears the recurrent state; the gain settles on the
    /// next block's volume without ramping.
    pub fn reset(&mut self) {
        self.engine.reset_state();
        self.gain_primed = false;
    }

    /// Processes one block in place. Every channel must hold exactly the
    /// prepared block size.
    pub fn process_block<C: AsMut<[f32]>>(
        &mut self,
        params: &ParameterSnapshot,
        channels: &mut [C],
    ) -> BlockOutcome {
        if params.bypass {
            return BlockOutcome::Bypassed;
        }

        let block_size = self.mono_in.len();
        if channels.is_empty() || channels.iter_mut().any(|c| c.as_mut().len() != block_size) {
            debug_assert!(
                false,
                "block size mismatch: signal path prepared for {block_size} samples"
            );
            self.status.record_contract_violation();
            return BlockOutcome::Rejected;
        }

        self.load_mono(channels);
        self.engine
            .set_conditioning(self.conditioning.build(&params.bands));
        if self.gain_primed {
            self.gain.set_target(params.output_volume);
        } else {
            self.gain.reset(params.output_volume);
            self.gain_primed = true;
        }

        match self.engine.run_inference(&self.mono_in, &mut self.mono_out) {
            Ok(()) => {
                self.gain.apply(&mut self.mono_out);
                for channel in channels.iter_mut() {
                    channel.as_mut().copy_from_slice(&self.mono_out);
                }
                BlockOutcome::Processed
            }
            Err(InferenceError::NotPrepared | InferenceError::BlockSizeMismatch { .. }) => {
                BlockOutcome::Rejected
            }
            Err(_) => {
                if self.failure_policy == FailurePolicy::Silence {
                    for channel in channels.iter_mut() {
                        channel.as_mut().fill(0.0);
                    }
                }
                BlockOutcome::Failed
            }
        }
    }

    fn load_mono<C: AsMut<[f32]>>(&mut self, channels: &mut [C]) {
        match self.mono_input {
            MonoInput::FirstChannel => {
                self.mono_in.copy_from_slice(channels[0].as_mut());
            }
            MonoInput::Downmix => {
                self.mono_in.fill(0.0);
                for channel in channels.iter_mut() {
                    for (m, s) in self.mono_in.iter_mut().zip(channel.as_mut().iter()) {
                        *m += *s;
                    }
                }
                let scale = 1.0 / channels.len() as f32;
                for m in self.mono_in.iter_mut() {
                    *m *= scale;
                }
            }
        }
    }

    pub fn block_size(&self) -> usize {
        self.mono_in.len()
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }
}
