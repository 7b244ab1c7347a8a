//! Fixed-size voice pool with oldest-voice stealing and sustain-pedal
//! deferred release.
//!
//! Owned by the audio-render thread; the MIDI-ingress thread only ever
//! reaches it indirectly through the command queue drained at the head of
//! each render block (see [`crate::engine::Engine`]).

use super::patch::Patch;
use super::voice::Voice;

/// Maximum number of simultaneously active voices.
pub const MAX_VOICES: usize = 16;

/// The fixed-size voice array plus allocation statistics.
pub struct VoicePool {
    voices: Vec<Voice>,
    /// Number of currently active voices.
    pub active_count: usize,
    /// Total note-ons successfully allocated.
    pub notes_played: u64,
    /// Total times a note-on stole an already-active voice.
    pub voice_steals: u64,
    next_alloc_time: u64,
}

impl VoicePool {
    /// Builds a pool of `MAX_VOICES` inactive voices against the given
    /// patch (used only to size each voice's operator state).
    pub fn new(patch: &Patch, sample_rate: f64) -> Self {
        let voices = (0..MAX_VOICES)
            .map(|_| Voice::new_inactive(patch, sample_rate))
            .collect();
        Self {
            voices,
            active_count: 0,
            notes_played: 0,
            voice_steals: 0,
            next_alloc_time: 0,
        }
    }

    /// Read-only access to the voice array, for rendering and statistics.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Mutable access to the voice array, for rendering.
    pub fn voices_mut(&mut self) -> &mut [Voice] {
        &mut self.voices
    }

    /// Allocates a voice for a note-on: first free slot, or the oldest
    /// active voice if the pool is full (§4.4 P2/P3).
    pub fn allocate(&mut self, patch: &Patch, midi_note: u8, velocity: f64, channel: u8, sample_rate: f64) {
        let time = self.next_alloc_time;
        self.next_alloc_time += 1;

        let free_slot = self.voices.iter().position(|v| !v.active);
        let target = match free_slot {
            Some(idx) => {
                self.active_count += 1;
                idx
            }
            None => {
                let oldest = self
                    .voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| v.note_on_time)
                    .map(|(idx, _)| idx)
                    .expect("pool is never empty");
                self.voice_steals += 1;
                oldest
            }
        };

        self.voices[target].allocate(patch, midi_note, velocity, channel, time, sample_rate);
        self.notes_played += 1;
    }

    /// Releases (or defers, under sustain) the voice matching `(note,
    /// channel)`. No-op if no active voice matches (P4).
    pub fn note_off(&mut self, midi_note: u8, channel: u8, sustain_pedal: bool, sample_rate: f64) {
        for voice in self.voices.iter_mut() {
            if voice.active && voice.midi_note == midi_note && voice.channel == channel {
                if sustain_pedal {
                    voice.sustain_held = true;
                } else {
                    voice.release(sample_rate);
                }
                return;
            }
        }
    }

    /// Called when the sustain pedal transitions off: every voice with
    /// `sustain_held` advances to Release exactly once (P5).
    pub fn release_sustained(&mut self, sample_rate: f64) {
        for voice in self.voices.iter_mut() {
            if voice.active && voice.sustain_held {
                voice.sustain_held = false;
                voice.release(sample_rate);
            }
        }
    }

    /// Immediately releases every active voice, regardless of sustain
    /// (CC 120/123, All Sound Off / All Notes Off).
    pub fn release_all(&mut self, sample_rate: f64) {
        for voice in self.voices.iter_mut() {
            if voice.active {
                voice.sustain_held = false;
                voice.release(sample_rate);
            }
        }
    }

    /// Hard-silences every active voice immediately, without a release
    /// ramp. Used for CC 120 (All Sound Off) where the spec property (P9)
    /// requires `active_count == 0` within one render block.
    pub fn silence_all(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.active = false;
        }
        self.active_count = 0;
    }

    /// Deactivates any voice whose envelopes have all decayed below the
    /// silence threshold, decrementing `active_count`. Call once per
    /// sample (or once per block, scanning all voices) after mixing.
    pub fn deactivate_silent(&mut self) {
        for voice in self.voices.iter_mut() {
            if voice.active && voice.is_silent() {
                voice.active = false;
                self.active_count = self.active_count.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_fills_free_slots_before_stealing() {
        let patch = Patch::default();
        let mut pool = VoicePool::new(&patch, 48000.0);
        for note in 60..60 + MAX_VOICES as u8 {
            pool.allocate(&patch, note, 1.0, 1, 48000.0);
        }
        assert_eq!(pool.active_count, MAX_VOICES);
        assert_eq!(pool.voice_steals, 0);
    }

    #[test]
    fn stealing_replaces_oldest_voice() {
        let patch = Patch::default();
        let mut pool = VoicePool::new(&patch, 48000.0);
        let notes = [60u8, 62, 64, 65, 67];
        for &note in &notes {
            pool.allocate(&patch, note, 1.0, 1, 48000.0);
        }
        assert_eq!(pool.active_count, MAX_VOICES.min(5));
    }

    #[test]
    fn full_pool_steals_oldest_note_on_overflow() {
        let patch = Patch::default();
        let mut pool = VoicePool::new(&patch, 48000.0);
        for note in 0..MAX_VOICES as u8 {
            pool.allocate(&patch, 60 + note, 1.0, 1, 48000.0);
        }
        assert_eq!(pool.voice_steals, 0);
        pool.allocate(&patch, 127, 1.0, 1, 48000.0);
        assert_eq!(pool.voice_steals, 1);
        assert!(!pool.voices().iter().any(|v| v.midi_note == 60));
        assert!(pool.voices().iter().any(|v| v.midi_note == 127));
    }

    #[test]
    fn note_off_unmatched_is_noop() {
        let patch = Patch::default();
        let mut pool = VoicePool::new(&patch, 48000.0);
        pool.allocate(&patch, 60, 1.0, 1, 48000.0);
        pool.note_off(61, 1, false, 48000.0);
        assert_eq!(pool.active_count, 1);
        assert!(pool.voices()[0].active);
    }

    #[test]
    fn sustain_defers_release_until_pedal_up() {
        let patch = Patch::default();
        let mut pool = VoicePool::new(&patch, 48000.0);
        pool.allocate(&patch, 60, 1.0, 1, 48000.0);
        pool.note_off(60, 1, true, 48000.0);
        assert!(pool.voices()[0].sustain_held);
        pool.release_sustained(48000.0);
        assert!(!pool.voices()[0].sustain_held);
    }

    #[test]
    fn silence_all_deactivates_immediately() {
        let patch = Patch::default();
        let mut pool = VoicePool::new(&patch, 48000.0);
        pool.allocate(&patch, 60, 1.0, 1, 48000.0);
        pool.silence_all();
        assert_eq!(pool.active_count, 0);
    }
}
