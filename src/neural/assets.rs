//! Model and latent-table resolution.
//!
//! An explicit path in the configuration always wins. Without one, the assets
//! compiled in by the `bundled-assets` feature are used. With neither, loading
//! fails and the effect must not start.
//!
//! `bundled-assets` embeds the files named by the build-time environment
//! variables `PRISM_MODEL_ONNX` and `PRISM_LATENTS_JSON` (absolute paths).

use super::latent::LatentTable;
use crate::config::PrismConfig;
use anyhow::{anyhow, Context};
use log::info;
use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[cfg(feature = "bundled-assets")]
const BUNDLED_MODEL: &[u8] = include_bytes!(env!(
    "PRISM_MODEL_ONNX",
    "bundled-assets needs PRISM_MODEL_ONNX set to the .onnx model path"
));
#[cfg(feature = "bundled-assets")]
const BUNDLED_LATENTS: &str = include_str!(env!(
    "PRISM_LATENTS_JSON",
    "bundled-assets needs PRISM_LATENTS_JSON set to the latent table path"
));

const BUNDLED: bool = cfg!(feature = "bundled-assets");

/// Where an asset will be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource<'a> {
    File(&'a Path),
    Bundled,
    Missing,
}

pub fn resolve(configured: Option<&Path>, bundled: bool) -> AssetSource<'_> {
    match configured {
        Some(path) => AssetSource::File(path),
        None if bundled => AssetSource::Bundled,
        None => AssetSource::Missing,
    }
}

pub fn model_bytes(config: &PrismConfig) -> anyhow::Result<Cow<'static, [u8]>> {
    match resolve(config.model_path.as_deref(), BUNDLED) {
        AssetSource::File(path) => {
            info!("Loading model from {}", path.display());
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read model {}", path.display()))?;
            Ok(Cow::Owned(bytes))
        }
        AssetSource::Bundled | AssetSource::Missing => bundled_model(),
    }
}

pub fn load_latent_table(config: &PrismConfig) -> anyhow::Result<LatentTable> {
    match resolve(config.latents_path.as_deref(), BUNDLED) {
        AssetSource::File(path) => {
            info!("Loading latent table from {}", path.display());
            let file = File::open(path)
                .with_context(|| format!("failed to open latent table {}", path.display()))?;
            LatentTable::from_json_reader(BufReader::new(file))
                .with_context(|| format!("in {}", path.display()))
        }
        AssetSource::Bundled | AssetSource::Missing => bundled_latents(),
    }
}

#[cfg(feature = "bundled-assets")]
fn bundled_model() -> anyhow::Result<Cow<'static, [u8]>> {
    info!("Using bundled model ({} bytes)", BUNDLED_MODEL.len());
    Ok(Cow::Borrowed(BUNDLED_MODEL))
}

#[cfg(not(feature = "bundled-assets"))]
fn bundled_model() -> anyhow::Result<Cow<'static, [u8]>> {
    Err(anyhow!(
        "no model_path configured and no bundled model (set {} or enable `bundled-assets`)",
        crate::config::CONFIG_ENV_VAR
    ))
}

#[cfg(feature = "bundled-assets")]
fn bundled_latents() -> anyhow::Result<LatentTable> {
    info!("Using bundled latent table");
    LatentTable::from_json_str(BUNDLED_LATENTS).context("bundled latent table")
}

#[cfg(not(feature = "bundled-assets"))]
fn bundled_latents() -> anyhow::Result<LatentTable> {
    Err(anyhow!(
        "no latents_path configured and no bundled latent table (set {} or enable `bundled-assets`)",
        crate::config::CONFIG_ENV_VAR
    ))
}
