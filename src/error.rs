//! Error types for the PRISM core.
//!
//! `InitError` is fatal: the effect cannot run and the host must be told
//! before any audio is processed. `InferenceError` is scoped to a single
//! block; the recurrent state is left at its last committed value.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to load configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("failed to load latent table: {0:#}")]
    LatentTable(anyhow::Error),

    #[error("failed to load model: {0:#}")]
    ModelLoad(anyhow::Error),

    #[error("no inference backend compiled in (enable the `onnx` feature)")]
    NoBackend,

    #[error("invalid inference block size {0}")]
    InvalidBlockSize(usize),

    #[error("failed to prepare inference for {block_size} samples: {reason:#}")]
    Prepare {
        block_size: usize,
        reason: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference engine has not been prepared")]
    NotPrepared,

    #[error("block size mismatch: prepared for {expected} samples, got {actual}")]
    BlockSizeMismatch { expected: usize, actual: usize },

    #[error("model returned audio of shape {actual:?}, expected {expected:?}")]
    OutputShape {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error("model returned {0} outputs, expected (audio, state)")]
    UnexpectedOutputs(usize),

    #[error("forward pass failed: {0:#}")]
    Forward(anyhow::Error),
}
