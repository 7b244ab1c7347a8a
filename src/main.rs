use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use hexafm::engine::Engine;
use hexafm::fm::patch::Patch;
use hexafm::wav_writer::WavOutput;
use hexafm::{patch_file, sysex};

/// HexaFM render CLI
///
/// Plays a single note through a patch and renders it to a WAV file,
/// stopping once the note has decayed to silence.
#[derive(Parser, Clone)]
#[command(name = "hexafm-render")]
#[command(about = "Render a note from a HexaFM patch to a WAV file")]
#[command(version)]
struct Args {
    /// Patch file: either a `.syx` single-voice SysEx dump or a plain-text
    /// `KEY = VALUE` patch file.
    #[arg(help = "Path to a .syx or plain-text patch file")]
    patch_file: PathBuf,

    /// MIDI note number to play (0-127, 60 = Middle C, 69 = A4).
    midi_note: u8,

    /// Maximum note length in seconds, before a forced release.
    note_length: f64,

    /// Output WAV file path.
    output_file: String,

    /// Sample rate in Hz.
    #[arg(short, long, default_value = "44100")]
    sample_rate: u32,

    /// Silence threshold in microseconds before the renderer stops early.
    #[arg(short = 't', long = "silence-threshold", default_value = "100000")]
    silence_threshold_us: u32,

    /// MIDI velocity (1-127).
    #[arg(long, default_value = "100")]
    velocity: u8,

    /// MIDI channel the engine listens on (1-16).
    #[arg(long, default_value = "1")]
    channel: u8,

    /// Verbose logging (equivalent to `RUST_LOG=debug`).
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();
    } else {
        env_logger::init();
    }

    validate_args(&args)?;

    let patch = load_patch(&args.patch_file)?;
    log::info!("loaded patch '{}' (algorithm {})", patch.name, patch.algorithm);

    let mut engine = Engine::init(patch, args.sample_rate, args.channel, false)
        .map_err(|e| anyhow!("engine init failed: {e}"))?;
    engine.start();
    engine.feed_midi(&[0x90 | (args.channel - 1), args.midi_note, args.velocity]);

    let mut wav_output = WavOutput::new(&args.output_file, args.sample_rate, args.silence_threshold_us)?;

    const BLOCK_SIZE: usize = 256;
    let max_samples = ((args.note_length * args.sample_rate as f64) as usize).max(BLOCK_SIZE);
    let mut released = false;
    let mut total_written = 0usize;
    let mut block = vec![0.0f32; BLOCK_SIZE];

    while total_written < max_samples {
        if !released && total_written >= (args.note_length * args.sample_rate as f64) as usize {
            engine.feed_midi(&[0x80 | (args.channel - 1), args.midi_note, 0]);
            released = true;
        }
        engine.render_block(&mut block, BLOCK_SIZE);
        let silence_detected = wav_output.write_samples(&block)?;
        total_written += BLOCK_SIZE;
        if silence_detected && released {
            log::debug!("silence threshold reached after {total_written} samples");
            break;
        }
    }

    wav_output.finalize()?;
    log::info!("wrote {total_written} samples to '{}'", args.output_file);
    Ok(())
}

fn load_patch(path: &Path) -> Result<Patch> {
    if path.extension().and_then(|e| e.to_str()) == Some("syx") {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let (patch, _channel) =
            sysex::decode_voice(&bytes).map_err(|e| anyhow!("decoding SysEx file {}: {e}", path.display()))?;
        Ok(patch)
    } else {
        patch_file::load(path)
    }
}

fn validate_args(args: &Args) -> Result<()> {
    if !args.patch_file.exists() {
        return Err(anyhow!("patch file '{}' not found", args.patch_file.display()));
    }
    if args.velocity == 0 {
        return Err(anyhow!("velocity must be 1-127"));
    }
    if !(1..=16).contains(&args.channel) {
        return Err(anyhow!("channel must be 1-16"));
    }
    if args.note_length <= 0.0 {
        return Err(anyhow!("note length must be positive"));
    }
    Ok(())
}
