//! The engine: owns the patch, voice pool, and controllers block, and wires
//! the MIDI-ingress side to the audio-render side per the two-thread model
//! (§5). `feed_midi` is safe to call from a single ingress thread while
//! `render_block` runs concurrently on a single audio thread; no other
//! interleaving is supported.

use crossbeam_channel::{Receiver, Sender};

use crate::error::EngineError;
use crate::fm::controllers::Controllers;
use crate::fm::midi::{MidiEvent, MidiParser};
use crate::fm::patch::Patch;
use crate::fm::voice_pool::VoicePool;

const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Commands the ingress side enqueues for the audio thread to apply at the
/// head of each render block.
#[derive(Debug, Clone)]
enum EngineCommand {
    AllocateVoice { midi_note: u8, velocity: f64, channel: u8 },
    ReleaseVoice { midi_note: u8, channel: u8 },
    ReleaseAllVoices,
    SilenceAllVoices,
    SustainReleased,
}

/// A snapshot of engine activity, returned by [`Engine::stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    /// Currently active voices.
    pub active_voices: usize,
    /// Total note-ons successfully allocated.
    pub notes_played: u64,
    /// Total times a note-on stole an already-active voice.
    pub voice_steals: u64,
    /// Orphan data bytes, SysEx overflow, and unrecognized status bytes seen.
    pub midi_errors: u64,
    /// Current pitch bend, `[-1, 1]`.
    pub pitch_bend: f64,
    /// Current mod wheel, `[0, 1]`.
    pub mod_wheel: f64,
    /// Current sustain pedal state.
    pub sustain_pedal: bool,
    /// Slowest `render_block` call observed, in samples-worth of wall clock
    /// (i.e. `frames` of the slowest call); informational only, never
    /// affects output (§7, underruns).
    pub peak_block_frames: usize,
}

/// The six-operator FM synthesis engine.
pub struct Engine {
    patch: Patch,
    channel: u8,
    omni: bool,
    sample_rate: f64,
    running: bool,

    controllers: Controllers,
    voice_pool: VoicePool,
    midi_parser: MidiParser,

    command_tx: Sender<EngineCommand>,
    command_rx: Receiver<EngineCommand>,

    notes_played: u64,
    voice_steals: u64,
    peak_block_frames: usize,
    warned_program_change: bool,
    warned_channel_pressure: bool,
    warned_poly_pressure: bool,
}

impl Engine {
    /// Builds a new engine for `patch`, listening on 1-based `channel`
    /// (`1..=16`) unless `omni` is set, in which case every channel is
    /// accepted. Rejects out-of-range configuration (§7, invalid
    /// configuration).
    pub fn init(patch: Patch, sample_rate: u32, channel: u8, omni: bool) -> Result<Self, EngineError> {
        if !(1..=16).contains(&channel) {
            return Err(EngineError::InvalidChannel(channel));
        }
        if !(1..=32).contains(&patch.algorithm) {
            return Err(EngineError::InvalidAlgorithm(patch.algorithm));
        }
        if !(8_000..=192_000).contains(&sample_rate) {
            return Err(EngineError::InvalidSampleRate(sample_rate));
        }

        let sample_rate_f = sample_rate as f64;
        let voice_pool = VoicePool::new(&patch, sample_rate_f);
        let (command_tx, command_rx) = crossbeam_channel::bounded(COMMAND_QUEUE_CAPACITY);

        Ok(Self {
            patch,
            channel,
            omni,
            sample_rate: sample_rate_f,
            running: false,
            controllers: Controllers::new(),
            voice_pool,
            midi_parser: MidiParser::new(),
            command_tx,
            command_rx,
            notes_played: 0,
            voice_steals: 0,
            peak_block_frames: 0,
            warned_program_change: false,
            warned_channel_pressure: false,
            warned_poly_pressure: false,
        })
    }

    /// Enables the render path. Before `start`, `render_block` produces
    /// silence without touching voice state.
    pub fn start(&mut self) {
        self.running = true;
        log::info!("engine started on channel {} (omni={})", self.channel, self.omni);
    }

    /// Disables the render path. Subsequent `render_block` calls produce
    /// silence; queued commands are left unapplied until `start` again.
    pub fn stop(&mut self) {
        self.running = false;
        log::info!("engine stopped");
    }

    /// Cooperative shutdown (§5): stops the render path, releases every
    /// active voice, and leaves the engine in a state where any further
    /// `feed_midi` call observes `active == false` and no-ops.
    pub fn shutdown(&mut self) {
        self.stop();
        self.voice_pool.release_all(self.sample_rate);
        self.voice_pool.silence_all();
        log::info!("engine shut down");
    }

    /// Feeds raw MIDI bytes from the ingress side. Thread-safe to call from
    /// exactly one ingress thread; performs only small, bounded work per
    /// byte and never blocks.
    pub fn feed_midi(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if let Some(event) = self.midi_parser.feed_byte(byte) {
                self.dispatch(event);
            }
        }
    }

    fn channel_matches(&self, channel: u8) -> bool {
        self.omni || channel == self.channel
    }

    fn dispatch(&mut self, event: MidiEvent) {
        match event {
            MidiEvent::NoteOn { channel, note, velocity } if self.channel_matches(channel) => {
                let _ = self.command_tx.try_send(EngineCommand::AllocateVoice {
                    midi_note: note,
                    velocity: velocity as f64 / 127.0,
                    channel,
                });
            }
            MidiEvent::NoteOff { channel, note } if self.channel_matches(channel) => {
                let _ = self
                    .command_tx
                    .try_send(EngineCommand::ReleaseVoice { midi_note: note, channel });
            }
            MidiEvent::ControlChange { channel, controller, value } if self.channel_matches(channel) => {
                self.dispatch_control_change(controller, value);
            }
            MidiEvent::PitchBend { channel, value } if self.channel_matches(channel) => {
                self.controllers.set_pitch_bend_raw(value);
            }
            MidiEvent::ProgramChange { channel, program } if self.channel_matches(channel) => {
                self.controllers.program.store(program, std::sync::atomic::Ordering::Relaxed);
                if !self.warned_program_change {
                    log::warn!("Program Change received (program {program}); no effect, recorded for diagnostics");
                    self.warned_program_change = true;
                }
            }
            MidiEvent::ChannelPressure { channel, value } if self.channel_matches(channel) => {
                self.controllers
                    .channel_pressure
                    .store(value, std::sync::atomic::Ordering::Relaxed);
                if !self.warned_channel_pressure {
                    log::warn!("Channel Pressure received (value {value}); no effect, recorded for diagnostics");
                    self.warned_channel_pressure = true;
                }
            }
            MidiEvent::PolyPressure { channel, .. } if self.channel_matches(channel) => {
                if !self.warned_poly_pressure {
                    log::warn!("Polyphonic Key Pressure received; no effect");
                    self.warned_poly_pressure = true;
                }
            }
            MidiEvent::SysEx(inner) => {
                self.handle_sysex(&inner);
            }
            _ => {} // different channel, ignored
        }
    }

    fn dispatch_control_change(&mut self, controller: u8, value: u8) {
        match controller {
            64 => {
                let was_held = self.controllers.sustain_pedal();
                let now_held = value >= 64;
                self.controllers.sustain_pedal.store(now_held, std::sync::atomic::Ordering::Relaxed);
                if was_held && !now_held {
                    let _ = self.command_tx.try_send(EngineCommand::SustainReleased);
                }
            }
            120 => {
                let _ = self.command_tx.try_send(EngineCommand::SilenceAllVoices);
            }
            121 => {
                self.controllers.reset();
            }
            123 => {
                let _ = self.command_tx.try_send(EngineCommand::ReleaseAllVoices);
            }
            _ => self.controllers.set_cc(controller, value),
        }
    }

    fn handle_sysex(&self, inner: &[u8]) {
        let mut frame = Vec::with_capacity(inner.len() + 2);
        frame.push(0xF0);
        frame.extend_from_slice(inner);
        frame.push(0xF7);
        match crate::sysex::decode_voice(&frame) {
            Ok((patch, channel)) => {
                log::info!("received SysEx patch '{}' addressed to channel {channel}; not hot-applied (no live-patch-reload operation in this engine)", patch.name);
            }
            Err(err) => {
                log::debug!("received SysEx frame that is not a valid single-voice dump: {err}");
            }
        }
    }

    /// Renders `frames` mono samples into `out`, applying any queued
    /// commands at the head of the block. Output is scaled by 0.5x and
    /// soft-clipped to `[-1, 1]` (§6).
    pub fn render_block(&mut self, out: &mut [f32], frames: usize) {
        if frames > self.peak_block_frames {
            self.peak_block_frames = frames;
        }

        if !self.running {
            out[..frames].fill(0.0);
            return;
        }

        self.apply_queued_commands();

        for sample in out[..frames].iter_mut() {
            let mut mix = 0.0f64;
            for voice in self.voice_pool.voices_mut() {
                if voice.active {
                    mix += voice.advance(&self.patch, &self.controllers, self.sample_rate);
                }
            }
            let scaled = mix * 0.5;
            *sample = scaled.tanh() as f32;
            self.voice_pool.deactivate_silent();
        }
    }

    fn apply_queued_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                EngineCommand::AllocateVoice { midi_note, velocity, channel } => {
                    self.voice_pool.allocate(&self.patch, midi_note, velocity, channel, self.sample_rate);
                    self.notes_played += 1;
                    if self.voice_pool.voice_steals > self.voice_steals {
                        self.voice_steals = self.voice_pool.voice_steals;
                    }
                }
                EngineCommand::ReleaseVoice { midi_note, channel } => {
                    let sustained = self.controllers.sustain_pedal();
                    self.voice_pool.note_off(midi_note, channel, sustained, self.sample_rate);
                }
                EngineCommand::ReleaseAllVoices => {
                    self.voice_pool.release_all(self.sample_rate);
                }
                EngineCommand::SilenceAllVoices => {
                    self.voice_pool.silence_all();
                }
                EngineCommand::SustainReleased => {
                    self.voice_pool.release_sustained(self.sample_rate);
                }
            }
        }
    }

    /// Returns a snapshot of engine statistics.
    pub fn stats(&self) -> Stats {
        Stats {
            active_voices: self.voice_pool.active_count,
            notes_played: self.notes_played,
            voice_steals: self.voice_steals,
            midi_errors: self.midi_parser.midi_errors,
            pitch_bend: self.controllers.pitch_bend(),
            mod_wheel: self.controllers.mod_wheel(),
            sustain_pedal: self.controllers.sustain_pedal(),
            peak_block_frames: self.peak_block_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fm::patch::Patch;

    fn note_on(channel: u8, note: u8, velocity: u8) -> Vec<u8> {
        vec![0x90 | (channel - 1), note, velocity]
    }

    fn note_off(channel: u8, note: u8) -> Vec<u8> {
        vec![0x80 | (channel - 1), note, 0]
    }

    #[test]
    fn init_rejects_out_of_range_channel() {
        assert!(matches!(
            Engine::init(Patch::default(), 48000, 17, false),
            Err(EngineError::InvalidChannel(17))
        ));
    }

    #[test]
    fn init_rejects_implausible_sample_rate() {
        assert!(matches!(
            Engine::init(Patch::default(), 1, 1, false),
            Err(EngineError::InvalidSampleRate(1))
        ));
    }

    #[test]
    fn silent_until_started() {
        let mut engine = Engine::init(Patch::default(), 48000, 1, false).unwrap();
        engine.feed_midi(&note_on(1, 60, 100));
        let mut out = [1.0f32; 16];
        engine.render_block(&mut out, 16);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn note_on_produces_nonzero_output_once_started() {
        let mut engine = Engine::init(Patch::default(), 48000, 1, false).unwrap();
        engine.start();
        engine.feed_midi(&note_on(1, 60, 100));
        let mut out = [0.0f32; 256];
        engine.render_block(&mut out, 256);
        assert!(out.iter().any(|&s| s.abs() > 1e-6));
        assert_eq!(engine.stats().active_voices, 1);
    }

    #[test]
    fn other_channel_is_ignored_without_omni() {
        let mut engine = Engine::init(Patch::default(), 48000, 1, false).unwrap();
        engine.start();
        engine.feed_midi(&note_on(2, 60, 100));
        let mut out = [0.0f32; 64];
        engine.render_block(&mut out, 64);
        assert_eq!(engine.stats().active_voices, 0);
    }

    #[test]
    fn omni_mode_accepts_every_channel() {
        let mut engine = Engine::init(Patch::default(), 48000, 1, true).unwrap();
        engine.start();
        engine.feed_midi(&note_on(9, 60, 100));
        let mut out = [0.0f32; 64];
        engine.render_block(&mut out, 64);
        assert_eq!(engine.stats().active_voices, 1);
    }

    #[test]
    fn output_never_exceeds_unit_range() {
        let mut patch = Patch::default();
        patch.feedback = 7;
        let mut engine = Engine::init(patch, 48000, 1, false).unwrap();
        engine.start();
        for note in 0..16u8 {
            engine.feed_midi(&note_on(1, 40 + note, 127));
        }
        let mut out = [0.0f32; 1024];
        engine.render_block(&mut out, 1024);
        assert!(out.iter().all(|&s| (-1.0..=1.0).contains(&s)));
    }

    #[test]
    fn note_off_releases_voice_eventually() {
        let mut patch = Patch::default();
        for op in &mut patch.operators {
            op.env_rates = [99, 99, 99, 99];
        }
        let mut engine = Engine::init(patch, 48000, 1, false).unwrap();
        engine.start();
        engine.feed_midi(&note_on(1, 60, 100));
        let mut out = [0.0f32; 64];
        engine.render_block(&mut out, 64);
        assert_eq!(engine.stats().active_voices, 1);
        engine.feed_midi(&note_off(1, 60));
        for _ in 0..200 {
            engine.render_block(&mut out, 64);
        }
        assert_eq!(engine.stats().active_voices, 0);
    }

    #[test]
    fn all_sound_off_silences_immediately() {
        let mut engine = Engine::init(Patch::default(), 48000, 1, false).unwrap();
        engine.start();
        engine.feed_midi(&note_on(1, 60, 100));
        let mut out = [0.0f32; 16];
        engine.render_block(&mut out, 16);
        assert_eq!(engine.stats().active_voices, 1);
        engine.feed_midi(&[0xB0, 120, 0]);
        engine.render_block(&mut out, 16);
        assert_eq!(engine.stats().active_voices, 0);
    }

    #[test]
    fn shutdown_then_feed_midi_is_inert() {
        let mut engine = Engine::init(Patch::default(), 48000, 1, false).unwrap();
        engine.start();
        engine.feed_midi(&note_on(1, 60, 100));
        let mut out = [0.0f32; 16];
        engine.render_block(&mut out, 16);
        engine.shutdown();
        engine.feed_midi(&note_on(1, 64, 100));
        engine.render_block(&mut out, 16);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
