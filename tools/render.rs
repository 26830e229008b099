use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::info;
use prism_mbd::config::PrismConfig;
use prism_mbd::dsp::{BlockOutcome, SignalPath};
use prism_mbd::params::ParameterSource;
use prism_mbd::presets::{FactoryProgram, Program};
use prism_mbd::status::EngineStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_BLOCK_SIZE: usize = 512;

fn usage() -> ! {
    eprintln!("usage: prism_render <input.wav> <output.wav> [program name | program.json]");
    eprintln!("factory programs:");
    for p in FactoryProgram::ALL {
        eprintln!("  {:<28} {}", p.name(), p.description());
    }
    std::process::exit(2);
}

fn load_program(arg: Option<String>) -> Result<Program> {
    let Some(arg) = arg else {
        return Ok(FactoryProgram::Init.program());
    };
    if let Some(factory) = FactoryProgram::from_name(&arg) {
        return Ok(factory.program());
    }
    let path = Path::new(&arg);
    if path.extension().is_some_and(|e| e == "json") {
        return Program::from_path(path);
    }
    bail!("'{arg}' is neither a factory program nor a .json program file")
}

fn read_channels(path: &Path) -> Result<(Vec<Vec<f32>>, u32)> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open input WAV '{}'", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let frames = interleaved.len() / channels.max(1);
    let mut out = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, s) in out.iter_mut().zip(frame) {
            ch.push(*s);
        }
    }
    Ok((out, spec.sample_rate))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let (Some(input), Some(output)) = (args.next().map(PathBuf::from), args.next().map(PathBuf::from))
    else {
        usage();
    };
    let program = load_program(args.next())?;

    let config = PrismConfig::load().context("failed to load configuration")?;
    let block_size = config.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);

    let (mut channels, sample_rate) = read_channels(&input)?;
    if channels.is_empty() {
        bail!("input has no channels");
    }
    let frames = channels[0].len();

    let status = Arc::new(EngineStatus::new());
    let mut path = SignalPath::from_config(&config, status.clone())?;
    path.prepare(sample_rate as f32, block_size)?;

    info!(
        "Rendering '{}' with program '{}' ({} frames, {} channel(s))",
        input.display(),
        program.name,
        frames,
        channels.len()
    );

    let snapshot = program.snapshot();
    let mut blocks = vec![vec![0.0f32; block_size]; channels.len()];
    let mut failed = 0usize;
    let mut start = 0;
    while start < frames {
        let len = block_size.min(frames - start);
        for (block, ch) in blocks.iter_mut().zip(&channels) {
            block[..len].copy_from_slice(&ch[start..start + len]);
            block[len..].fill(0.0);
        }
        if path.process_block(&snapshot, &mut blocks) == BlockOutcome::Failed {
            failed += 1;
        }
        for (block, ch) in blocks.iter().zip(channels.iter_mut()) {
            ch[start..start + len].copy_from_slice(&block[..len]);
        }
        start += len;
    }

    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&output, spec)
        .with_context(|| format!("failed to create output WAV '{}'", output.display()))?;
    for i in 0..frames {
        for ch in &channels {
            writer.write_sample(ch[i])?;
        }
    }
    writer.finalize()?;

    println!("Render summary for '{}':", input.display());
    println!("  program          : {}", program.name);
    println!("  frames processed : {}", frames);
    println!("  failed blocks    : {}", failed);
    println!("  backend          : {}", path.engine().backend_name());
    println!("  device           : {}", status.device().name());
    if status.sample_rate_mismatch() {
        println!(
            "  warning          : input is {} Hz, model expects {} Hz",
            sample_rate, config.model_sample_rate
        );
    }
    Ok(())
}
