//! OPN2 (YM2612) Register Script Renderer CLI
//!
//! Command-line renderer for OPN2 register scripts featuring:
//! - Register-exact tabular emulation or lightweight modeled synthesis
//! - Deterministic offline rendering to 16-bit stereo WAV
//! - JSON scripts mixing writes, waits and render spans

mod args;
mod backend_factory;
mod script;

use std::fs;
use std::process;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

use opn2_common::{EngineConfig, SynthesisBackend};

use args::CliArgs;
use backend_factory::create_backend;
use script::{RegisterScript, ScriptEvent};

fn main() {
    let args = CliArgs::parse();
    if args.show_help || args.script_path.is_none() {
        CliArgs::print_help();
        process::exit(if args.show_help { 0 } else { 1 });
    }

    if let Err(err) = run(&args) {
        eprintln!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<()> {
    let script_path = args.script_path.as_deref().unwrap();
    let text = fs::read_to_string(script_path)
        .with_context(|| format!("failed to read script {}", script_path))?;
    let script = RegisterScript::from_json(&text)?;

    let config = resolve_config(args, &script)?;
    config
        .validate()
        .map_err(anyhow::Error::from)
        .context("invalid engine configuration")?;

    let mut backend = create_backend(&config)?;

    println!(
        "Rendering {} ({} backend, {} Hz master clock, {} Hz output)",
        script_path, config.backend, config.master_clock, config.sample_rate
    );

    let samples = render_script(backend.as_mut(), &script);
    write_wav(&args.output_path, config.sample_rate, &samples)
        .with_context(|| format!("failed to write {}", args.output_path))?;

    println!(
        "Wrote {} frames ({:.2}s) to {}",
        samples.len() / 2,
        samples.len() as f64 / 2.0 / config.sample_rate as f64,
        args.output_path
    );
    Ok(())
}

/// Merge the script config with command-line overrides.
fn resolve_config(args: &CliArgs, script: &RegisterScript) -> Result<EngineConfig> {
    let mut config = match &args.config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse config {}", path))?
        }
        None => script.config.clone(),
    };
    if let Some(kind) = args.backend_override {
        config.backend = kind;
    }
    Ok(config)
}

/// Play the event sequence through the backend, collecting rendered
/// frames as interleaved stereo samples.
fn render_script(backend: &mut dyn SynthesisBackend, script: &RegisterScript) -> Vec<i32> {
    let mut samples = Vec::with_capacity(script.rendered_frames() as usize * 2);
    let mut scratch = vec![0i32; 2048];

    for event in &script.events {
        match *event {
            ScriptEvent::Write { addr, value } => backend.write(addr, value),
            ScriptEvent::Wait { frames } => {
                drain_frames(backend, &mut scratch, frames, &mut None);
            }
            ScriptEvent::Render { frames } => {
                drain_frames(backend, &mut scratch, frames, &mut Some(&mut samples));
            }
        }
    }

    samples
}

fn drain_frames(
    backend: &mut dyn SynthesisBackend,
    scratch: &mut [i32],
    frames: u32,
    sink: &mut Option<&mut Vec<i32>>,
) {
    let mut remaining = frames as usize;
    while remaining > 0 {
        let chunk = remaining.min(scratch.len() / 2);
        let buffer = &mut scratch[..chunk * 2];
        backend.generate(buffer);
        if let Some(out) = sink.as_mut() {
            out.extend_from_slice(buffer);
        }
        remaining -= chunk;
    }
}

/// Write interleaved stereo samples as a 16-bit WAV file.
///
/// A single full-scale carrier peaks at 16384, so the chip's mix is
/// clamped to the i16 range rather than rescaled.
fn write_wav(path: &str, sample_rate: u32, samples: &[i32]) -> Result<()> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
