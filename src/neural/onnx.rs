//! ONNX backend on tract.
//!
//! The parsed model is kept unspecialised; every `prepare` pins the input
//! facts to the negotiated block size and builds a fresh runnable plan.

use super::backend::{ComputeDevice, ForwardOutput, ModelBackend};
use super::tensor::Tensor3;
use super::{audio_shape, CONDITIONING_SHAPE, STATE_SHAPE};
use crate::error::InferenceError;
use anyhow::{anyhow, bail, Context};
use assert_no_alloc::permit_alloc;
use log::{info, warn};
use tract_onnx::prelude::*;

/// tract executes on the CPU only.
pub const ACCELERATOR_AVAILABLE: bool = false;

const NUM_INPUTS: usize = 3;
const NUM_OUTPUTS: usize = 2;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

pub struct OnnxBackend {
    model: InferenceModel,
    plan: Option<Plan>,
    device: ComputeDevice,
    optimize: bool,
}

impl OnnxBackend {
    pub fn from_bytes(bytes: &[u8], device: ComputeDevice, optimize: bool) -> anyhow::Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .context("failed to parse ONNX model")?;

        if model.inputs.len() != NUM_INPUTS {
            bail!(
                "model takes {} inputs, expected (audio, conditioning, state)",
                model.inputs.len()
            );
        }
        if model.outputs.len() != NUM_OUTPUTS {
            bail!(
                "model produces {} outputs, expected (audio, state)",
                model.outputs.len()
            );
        }

        info!(
            "Parsed ONNX model ({} nodes), running on {}",
            model.nodes.len(),
            device.name()
        );
        Ok(Self {
            model,
            plan: None,
            device,
            optimize,
        })
    }

    fn build_plan(&self, block_size: usize) -> anyhow::Result<Plan> {
        let typed = self
            .model
            .clone()
            .with_input_fact(0, f32::fact(audio_shape(block_size)).into())?
            .with_input_fact(1, f32::fact(CONDITIONING_SHAPE).into())?
            .with_input_fact(2, f32::fact(STATE_SHAPE).into())?
            .into_typed()
            .context("failed to type model")?;

        let model = if self.optimize {
            match typed.clone().into_optimized() {
                Ok(optimized) => optimized,
                Err(e) => {
                    // Unoptimised plans are slower but numerically the same
                    warn!("Model optimisation failed, using unoptimised graph: {e:#}");
                    typed
                }
            }
        } else {
            typed
        };

        model.into_runnable().context("failed to build execution plan")
    }
}

impl ModelBackend for OnnxBackend {
    fn name(&self) -> &str {
        "tract-onnx"
    }

    fn device(&self) -> ComputeDevice {
        self.device
    }

    fn prepare(&mut self, block_size: usize) -> anyhow::Result<()> {
        self.plan = None;
        self.plan = Some(self.build_plan(block_size)?);
        Ok(())
    }

    fn forward(
        &mut self,
        audio: &Tensor3,
        conditioning: &Tensor3,
        state: &Tensor3,
        out: &mut ForwardOutput,
    ) -> Result<(), InferenceError> {
        let plan = self.plan.as_ref().ok_or(InferenceError::NotPrepared)?;

        // tract allocates its own tensors on every run
        permit_alloc(|| {
            let inputs = tvec!(
                to_tract(audio).map_err(InferenceError::Forward)?,
                to_tract(conditioning).map_err(InferenceError::Forward)?,
                to_tract(state).map_err(InferenceError::Forward)?,
            );
            let outputs = plan.run(inputs).map_err(InferenceError::Forward)?;
            if outputs.len() != NUM_OUTPUTS {
                return Err(InferenceError::UnexpectedOutputs(outputs.len()));
            }

            let audio_out = rank3(&outputs[0]).map_err(InferenceError::Forward)?;
            let expected = out.audio.shape();
            if audio_out != expected {
                return Err(InferenceError::OutputShape {
                    expected,
                    actual: audio_out,
                });
            }
            let state_out = rank3(&outputs[1]).map_err(InferenceError::Forward)?;

            write_tensor(&outputs[0], audio_out, &mut out.audio).map_err(InferenceError::Forward)?;
            write_tensor(&outputs[1], state_out, &mut out.state).map_err(InferenceError::Forward)?;
            Ok(())
        })
    }
}

fn to_tract(t: &Tensor3) -> anyhow::Result<TValue> {
    Ok(Tensor::from_shape(&t.shape(), t.as_slice())?.into_tvalue())
}

fn rank3(t: &Tensor) -> anyhow::Result<[usize; 3]> {
    match *t.shape() {
        [a, b, c] => Ok([a, b, c]),
        ref other => Err(anyhow!("expected a rank-3 output, got shape {other:?}")),
    }
}

fn write_tensor(src: &Tensor, shape: [usize; 3], dst: &mut Tensor3) -> anyhow::Result<()> {
    let view = src.to_array_view::<f32>()?;
    match view.as_slice() {
        Some(slice) => {
            dst.update_or_replace(shape, slice);
        }
        None => {
            dst.update_or_replace_iter(shape, view.iter().copied());
        }
    }
    Ok(())
}
