//! Process-wide, lock-free controller state shared between the MIDI-ingress
//! thread (writer) and the audio-render thread (reader).
//!
//! Every field is an independently-readable atomic: `f32` values are stored
//! as their `AtomicU32` bit pattern, grounded on the same pattern this
//! crate's sibling examples use for lock-free audio level metering.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

fn f32_to_u32(f: f32) -> u32 {
    f.to_bits()
}

fn u32_to_f32(u: u32) -> f32 {
    f32::from_bits(u)
}

/// Current values of all MIDI continuous controllers and channel-mode state.
///
/// `pitch_bend`, `mod_wheel`, `breath`, `foot`, `volume`, `expression`, and
/// `pan` are the named semantic controllers; `raw` holds every CC (0..=127)
/// at its last-seen float value, including ones with no semantic meaning
/// here. Sustain-threshold and all-sound-off edge detection live in the
/// MIDI dispatcher, since they need to reach the voice pool, not just this
/// block.
pub struct Controllers {
    /// `[-1, 1]`, mapped from the 14-bit pitch bend wheel.
    pub pitch_bend: AtomicU32,
    /// `[0, 1]`, CC 1.
    pub mod_wheel: AtomicU32,
    /// `[0, 1]`, CC 2.
    pub breath: AtomicU32,
    /// `[0, 1]`, CC 4.
    pub foot: AtomicU32,
    /// `[0, 1]`, CC 7. Defaults to 1.0.
    pub volume: AtomicU32,
    /// `[0, 1]`, CC 11. Defaults to 1.0.
    pub expression: AtomicU32,
    /// `[-1, 1]`, CC 10.
    pub pan: AtomicU32,
    /// CC 64, threshold 64.
    pub sustain_pedal: AtomicBool,
    /// CC 65, threshold 64. Recognized but inert (no portamento model).
    pub portamento: AtomicBool,
    /// Last-seen Program Change number. Recognized but inert.
    pub program: AtomicU8,
    /// Last-seen Channel Pressure value, `0..=127`. Recognized but inert.
    pub channel_pressure: AtomicU8,
    /// Raw value (as a float fraction, `0..=1`) of every one of the 128 CCs.
    raw: [AtomicU32; 128],
}

impl Controllers {
    /// Creates a new block at spec-mandated defaults: volume=1.0,
    /// expression=1.0, everything else 0/false.
    pub fn new() -> Self {
        const ZERO: AtomicU32 = AtomicU32::new(0);
        Self {
            pitch_bend: AtomicU32::new(f32_to_u32(0.0)),
            mod_wheel: AtomicU32::new(f32_to_u32(0.0)),
            breath: AtomicU32::new(f32_to_u32(0.0)),
            foot: AtomicU32::new(f32_to_u32(0.0)),
            volume: AtomicU32::new(f32_to_u32(1.0)),
            expression: AtomicU32::new(f32_to_u32(1.0)),
            pan: AtomicU32::new(f32_to_u32(0.0)),
            sustain_pedal: AtomicBool::new(false),
            portamento: AtomicBool::new(false),
            program: AtomicU8::new(0),
            channel_pressure: AtomicU8::new(0),
            raw: [ZERO; 128],
        }
    }

    /// Resets every controller to its default, per CC 121 (Reset All
    /// Controllers): volume and expression return to 1.0, everything else
    /// to 0/false. Does not touch `sustain_pedal` (CC 121 is not defined to
    /// release a held pedal).
    pub fn reset(&self) {
        self.pitch_bend.store(f32_to_u32(0.0), Ordering::Relaxed);
        self.mod_wheel.store(f32_to_u32(0.0), Ordering::Relaxed);
        self.breath.store(f32_to_u32(0.0), Ordering::Relaxed);
        self.foot.store(f32_to_u32(0.0), Ordering::Relaxed);
        self.volume.store(f32_to_u32(1.0), Ordering::Relaxed);
        self.expression.store(f32_to_u32(1.0), Ordering::Relaxed);
        self.pan.store(f32_to_u32(0.0), Ordering::Relaxed);
        for cc in self.raw.iter() {
            cc.store(f32_to_u32(0.0), Ordering::Relaxed);
        }
    }

    /// Stores a raw CC value (`0..=127`) both in the 128-slot vector and,
    /// for named controllers (other than sustain/portamento, handled by the
    /// dispatcher), in its semantic field.
    pub fn set_cc(&self, controller: u8, value: u8) {
        let frac = value as f32 / 127.0;
        if let Some(slot) = self.raw.get(controller as usize) {
            slot.store(f32_to_u32(frac), Ordering::Relaxed);
        }
        match controller {
            1 => self.mod_wheel.store(f32_to_u32(frac), Ordering::Relaxed),
            2 => self.breath.store(f32_to_u32(frac), Ordering::Relaxed),
            4 => self.foot.store(f32_to_u32(frac), Ordering::Relaxed),
            7 => self.volume.store(f32_to_u32(frac), Ordering::Relaxed),
            10 => self.pan.store(f32_to_u32(frac * 2.0 - 1.0), Ordering::Relaxed),
            11 => self.expression.store(f32_to_u32(frac), Ordering::Relaxed),
            65 => self.portamento.store(value >= 64, Ordering::Relaxed),
            _ => {}
        }
    }

    /// Sets the pitch bend wheel from a combined 14-bit MIDI value
    /// (`data1 | (data2 << 7)`), mapped to `[-1, 1]`.
    pub fn set_pitch_bend_raw(&self, value: u16) {
        let bend = (value as f64 - 8192.0) / 8192.0;
        self.pitch_bend.store(f32_to_u32(bend as f32), Ordering::Relaxed);
    }

    /// Reads the raw value of any CC, `0..=127`, as a `0..=1` fraction.
    pub fn raw(&self, controller: u8) -> f32 {
        self.raw
            .get(controller as usize)
            .map(|c| u32_to_f32(c.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    /// Current pitch bend in `[-1, 1]`.
    pub fn pitch_bend(&self) -> f64 {
        u32_to_f32(self.pitch_bend.load(Ordering::Relaxed)) as f64
    }

    /// Current mod wheel in `[0, 1]`.
    pub fn mod_wheel(&self) -> f64 {
        u32_to_f32(self.mod_wheel.load(Ordering::Relaxed)) as f64
    }

    /// Current sustain pedal state.
    pub fn sustain_pedal(&self) -> bool {
        self.sustain_pedal.load(Ordering::Relaxed)
    }
}

impl Default for Controllers {
    fn default() -> Self {
        Self::new()
    }
}
