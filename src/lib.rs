pub mod config;
pub mod dsp;
pub mod error;
pub mod neural;
pub mod params;
pub mod presets;
pub mod status;

use crate::config::PrismConfig;
use crate::dsp::{FrameReblocker, SignalPath};
use crate::params::{ParameterSource, PrismParams};
use crate::status::EngineStatus;
use log::{error, info};
use nih_plug::prelude::*;
use std::sync::Arc;

pub struct PrismPlugin {
    params: Arc<PrismParams>,
    status: Arc<EngineStatus>,

    // Built in `initialize`; `None` until the model has loaded
    signal_path: Option<SignalPath>,
    reblocker: Option<FrameReblocker>,
}

impl Default for PrismPlugin {
    fn default() -> Self {
        Self {
            params: Arc::new(PrismParams::default()),
            status: Arc::new(EngineStatus::new()),
            signal_path: None,
            reblocker: None,
        }
    }
}

impl PrismPlugin {
    pub fn status(&self) -> Arc<EngineStatus> {
        self.status.clone()
    }

    fn initialize_internal(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
    ) -> Result<usize, error::InitError> {
        let config = PrismConfig::load().map_err(error::InitError::Config)?;
        let block_size = inference_block_size(&config, buffer_config.max_buffer_size);
        match self.signal_path.as_mut() {
            // Re-prepare keeps the loaded model and latent table
            Some(path) => path.prepare(buffer_config.sample_rate, block_size)?,
            None => {
                let mut path = SignalPath::from_config(&config, self.status.clone())?;
                path.prepare(buffer_config.sample_rate, block_size)?;
                self.signal_path = Some(path);
            }
        }

        let channels = audio_io_layout
            .main_output_channels
            .map_or(0, |c| c.get() as usize);
        self.reblocker = Some(FrameReblocker::new(channels, block_size));

        info!("PRISM ready: {channels} channel(s), {block_size} samples per inference block");
        Ok(block_size)
    }

    /// Runs the host buffer through the reblocker. Parameters are polled once
    /// per inference block.
    fn process_channels(&mut self, channels: &mut [&mut [f32]]) {
        let (Some(path), Some(reblocker)) = (self.signal_path.as_mut(), self.reblocker.as_mut())
        else {
            return;
        };
        run_blocks(path, reblocker, &*self.params, channels);
    }

    fn reset_internal(&mut self) {
        if let Some(path) = self.signal_path.as_mut() {
            path.reset();
        }
        if let Some(reblocker) = self.reblocker.as_mut() {
            reblocker.reset();
        }
    }
}

/// The configured block size wins over the host's maximum buffer size.
fn inference_block_size(config: &PrismConfig, max_buffer_size: u32) -> usize {
    config.block_size.unwrap_or(max_buffer_size as usize)
}

fn run_blocks(
    path: &mut SignalPath,
    reblocker: &mut FrameReblocker,
    params: &impl ParameterSource,
    channels: &mut [&mut [f32]],
) {
    reblocker.process(channels, |block| {
        let snapshot = params.snapshot();
        path.process_block(&snapshot, block);
    });
}

impl Plugin for PrismPlugin {
    const NAME: &'static str = "PRISM";
    const VENDOR: &'static str = "PRISM Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            match self.initialize_internal(audio_io_layout, buffer_config) {
                Ok(latency) => {
                    context.set_latency_samples(latency as u32);
                    true
                }
                Err(e) => {
                    error!("PRISM failed to initialize: {e}");
                    self.signal_path = None;
                    self.reblocker = None;
                    false
                }
            }
        }))
        .unwrap_or(false)
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.process_channels(buffer.as_slice());
            ProcessStatus::Normal
        }))
        .unwrap_or(ProcessStatus::Normal)
    }

    fn reset(&mut self) {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.reset_internal();
        }))
        .unwrap_or(());
    }
}

impl ClapPlugin for PrismPlugin {
    const CLAP_ID: &'static str = "audio.prism.multiband-distortion";
    const CLAP_DESCRIPTION: Option<&'static str> = Some("Neural multiband distortion");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Distortion,
        ClapFeature::Mono,
        ClapFeature::Stereo,
    ];
}

impl Vst3Plugin for PrismPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"PrismNeuralMBD01";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Distortion,
    ];
}

nih_export_clap!(PrismPlugin);
nih_export_vst3!(PrismPlugin);
