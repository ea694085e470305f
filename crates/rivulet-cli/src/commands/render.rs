//! Offline rendering command.
//!
//! The engine runs on its own thread exactly as it would under an audio
//! callback; this thread stays the controller, draining responses and
//! dropping retired payloads until rendering finishes.

use std::path::{Path, PathBuf};
use std::thread;

use anyhow::Context;
use clap::{Args, ValueEnum};
use rivulet_core::{
    Controller, Engine, EngineError, ParamValue, Response, ResponseKind, create_session,
};

use super::common::{builtin_registry, load_config};

/// Demo patches.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum Patch {
    /// Sine oscillator
    #[default]
    Sine,
    /// Seeded white noise
    Noise,
}

#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Patch to render
    #[arg(long, value_enum, default_value_t = Patch::Sine)]
    patch: Patch,

    /// Duration in seconds
    #[arg(long, default_value = "2.0")]
    seconds: f32,

    /// Oscillator frequency in Hz (sine patch)
    #[arg(long, default_value = "440.0")]
    freq: f64,

    /// Noise seed (noise patch)
    #[arg(long, default_value = "1")]
    seed: i64,

    /// Peak amplitude after the fade-in
    #[arg(long, default_value = "0.5")]
    amplitude: f64,

    /// Fade-in time in milliseconds
    #[arg(long, default_value = "50.0")]
    fade_ms: f64,

    /// Output bit depth (16, 24 or 32 float)
    #[arg(long, default_value = "32")]
    bits: u16,
}

pub fn run(args: RenderArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    if !(args.seconds.is_finite() && args.seconds > 0.0) {
        anyhow::bail!("duration must be positive, got {}", args.seconds);
    }
    if !matches!(args.bits, 16 | 24 | 32) {
        anyhow::bail!("unsupported bit depth {} (use 16, 24 or 32)", args.bits);
    }

    let config = load_config(config_path)?;
    let settings = config.to_settings()?;
    let channels = settings.output_channels;
    if channels == 0 {
        anyhow::bail!("session has no output channels");
    }
    let sample_rate = config.audio.sample_rate;
    let frames = (args.seconds * sample_rate as f32).round() as usize;
    let blocks = frames.div_ceil(settings.block_size);

    let (engine, controller) = create_session(settings, builtin_registry()?)?;
    build_patch(&controller, &args, channels)?;

    tracing::info!(
        patch = ?args.patch,
        seconds = args.seconds,
        sample_rate,
        channels,
        "rendering"
    );

    let handle = thread::Builder::new()
        .name("rivulet-render".to_string())
        .spawn(move || render(engine, blocks, channels))
        .context("spawning render thread")?;

    let timeout = config.response_timeout();
    while !handle.is_finished() {
        for response in controller.fetch_responses(timeout) {
            log_response(&response);
        }
    }
    let mut samples = handle
        .join()
        .map_err(|_| anyhow::anyhow!("render thread panicked"))??;
    for response in controller.fetch_responses(timeout) {
        log_response(&response);
    }
    controller.collect_retired();

    samples.truncate(frames * channels);
    write_wav(&args.output, &samples, channels as u16, sample_rate, args.bits)?;

    let dropped = controller.dropped_responses();
    if dropped > 0 {
        tracing::warn!(dropped, "responses were dropped during rendering");
    }
    println!(
        "Rendered {} frames ({} ch, {} Hz) to {}",
        frames,
        channels,
        sample_rate,
        args.output.display()
    );
    Ok(())
}

/// `source -> *~ <- line~`, fanned out to one `dac~` per output channel.
fn build_patch(controller: &Controller, args: &RenderArgs, channels: usize) -> anyhow::Result<()> {
    let source = match args.patch {
        Patch::Sine => controller.create("osc~", 0, 0, &[("freq", ParamValue::Float(args.freq))])?,
        Patch::Noise => controller.create("noise~", 0, 0, &[("seed", ParamValue::Int(args.seed))])?,
    };
    let envelope = controller.create(
        "line~",
        0,
        0,
        &[
            ("target", ParamValue::Float(0.0)),
            ("time_ms", ParamValue::Float(args.fade_ms)),
        ],
    )?;
    let gain = controller.create("*~", 0, 0, &[])?;
    controller.connect(source, 0, gain, 0)?;
    controller.connect(envelope, 0, gain, 1)?;

    for channel in 0..channels {
        let dac = controller.create("dac~", 0, 0, &[("channel", ParamValue::Int(channel as i64))])?;
        controller.connect(gain, 0, dac, 0)?;
    }

    // Applied after creation so the line ramps instead of starting at target.
    controller.set_param(envelope, "target", args.amplitude)?;
    Ok(())
}

/// Render thread body: `blocks` blocks, interleaved.
fn render(mut engine: Engine, blocks: usize, channels: usize) -> Result<Vec<f32>, EngineError> {
    let block_size = engine.block_size();
    let mut planes = vec![vec![0.0f32; block_size]; channels];
    let mut interleaved = Vec::with_capacity(blocks * block_size * channels);

    for _ in 0..blocks {
        let mut outputs: Vec<&mut [f32]> = planes.iter_mut().map(Vec::as_mut_slice).collect();
        engine.process_block(&[], &mut outputs)?;
        for i in 0..block_size {
            for plane in &planes {
                interleaved.push(plane[i]);
            }
        }
    }
    Ok(interleaved)
}

fn log_response(response: &Response) {
    match response.kind {
        ResponseKind::ConfigError
        | ResponseKind::RequestFailed
        | ResponseKind::ProcessorFault
        | ResponseKind::SchedulingFailed => {
            tracing::warn!(processor = ?response.processor, kind = ?response.kind, payload = ?response.payload, "engine response");
        }
        _ => {
            tracing::debug!(processor = ?response.processor, kind = ?response.kind, payload = ?response.payload, "engine response");
        }
    }
}

fn write_wav(path: &Path, samples: &[f32], channels: u16, sample_rate: u32, bits: u16) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: bits,
        sample_format: if bits == 32 {
            hound::SampleFormat::Float
        } else {
            hound::SampleFormat::Int
        },
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;

    if bits == 32 {
        for &sample in samples {
            writer.write_sample(sample)?;
        }
    } else {
        let max_val = (1i32 << (bits - 1)) as f32;
        for &sample in samples {
            let int_sample = (sample * max_val).clamp(-max_val, max_val - 1.0) as i32;
            writer.write_sample(int_sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
