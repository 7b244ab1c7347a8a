//! One polyphonic note: six operator states, one LFO, and per-voice
//! allocation metadata. Owned almost entirely by the audio-render thread;
//! only `active`, `midi_note`, `velocity`, `channel`, `note_on_time`, and
//! `sustain_held` are ever written from the MIDI-ingress side (via
//! [`super::voice_pool::VoicePool::allocate`] and `set_sustain_held`).

use super::algorithms::{self, ALGORITHMS};
use super::controllers::Controllers;
use super::lfo::Lfo;
use super::operator::{advance_operator, OperatorSample, OperatorState};
use super::patch::Patch;

/// Deactivation threshold: once every operator envelope drops below this,
/// the voice is considered silent.
pub const SILENCE_THRESHOLD: f64 = 0.001;

/// One note-in-flight.
pub struct Voice {
    /// Whether this slot holds a live note.
    pub active: bool,
    /// MIDI note number, `0..=127`.
    pub midi_note: u8,
    /// Normalized velocity, `0.0..=1.0`.
    pub velocity: f64,
    /// 1-based MIDI channel this note arrived on.
    pub channel: u8,
    /// Monotonic allocation-order key, used for oldest-voice stealing.
    pub note_on_time: u64,
    /// True once a note-off has arrived while the sustain pedal was held.
    pub sustain_held: bool,
    /// The six operator states.
    pub operators: [OperatorState; 6],
    /// Per-voice LFO.
    pub lfo: Lfo,
    /// Operator 0's feedback term from the previous sample, used only by
    /// [`algorithms::FeedbackMode::Classic`].
    prev_feedback: f64,
}

impl Voice {
    /// Creates an inactive voice with arbitrary placeholder operator state;
    /// `allocate` must be called before it produces sound.
    pub fn new_inactive(patch: &Patch, sample_rate: f64) -> Self {
        let operators =
            std::array::from_fn(|i| OperatorState::new(&patch.operators[i], 60, sample_rate));
        Self {
            active: false,
            midi_note: 60,
            velocity: 0.0,
            channel: 1,
            note_on_time: 0,
            sustain_held: false,
            operators,
            lfo: Lfo::new(patch.lfo_wave),
            prev_feedback: 0.0,
        }
    }

    /// Allocates this voice for a new note-on, per spec §4.4's
    /// initialization sequence.
    pub fn allocate(
        &mut self,
        patch: &Patch,
        midi_note: u8,
        velocity: f64,
        channel: u8,
        note_on_time: u64,
        sample_rate: f64,
    ) {
        self.active = true;
        self.midi_note = midi_note;
        self.velocity = velocity;
        self.channel = channel;
        self.note_on_time = note_on_time;
        self.sustain_held = false;
        self.operators = std::array::from_fn(|i| {
            OperatorState::new(&patch.operators[i], midi_note, sample_rate)
        });
        self.lfo = Lfo::new(patch.lfo_wave);
        if patch.lfo_sync {
            self.lfo.reset_phase();
        }
        self.prev_feedback = 0.0;
    }

    /// Triggers Release on all six operator envelopes, bypassing any
    /// sustain-pedal deferral (the caller is responsible for checking the
    /// pedal state first).
    pub fn release(&mut self, sample_rate: f64) {
        for op in self.operators.iter_mut() {
            op.env.release(sample_rate);
        }
    }

    /// True once every operator envelope has decayed below the silence
    /// threshold.
    pub fn is_silent(&self) -> bool {
        self.operators.iter().all(|op| op.env.is_silent())
    }

    /// Advances this voice by one sample: recomputes per-operator frequency
    /// from the live controllers (§4.4's "per-sample controller
    /// application"), advances the LFO and all six operators, and routes
    /// them through the patch's algorithm.
    pub fn advance(&mut self, patch: &Patch, controllers: &Controllers, sample_rate: f64) -> f64 {
        let bend = controllers.pitch_bend();
        let transposed_note =
            (self.midi_note as i16 + patch.transpose as i16).clamp(0, 127) as u8;
        let (lfo_raw, lfo_fade) = self.lfo.advance(
            patch.lfo_speed,
            patch.lfo_delay,
            Some(controllers.mod_wheel()),
            sample_rate,
        );
        let lfo_value = lfo_raw * lfo_fade;

        let mut samples: [OperatorSample; 6] = Default::default();
        for i in 0..6 {
            let op_params = &patch.operators[i];
            let freq = base_hz(transposed_note, bend)
                * op_params.freq_ratio
                * 2f64.powf((op_params.detune as f64 / 7.0) * 0.01);
            self.operators[i].freq = freq;

            samples[i] = advance_operator(
                &mut self.operators[i],
                op_params,
                self.velocity,
                lfo_value,
                patch.lfo_amd,
                patch.lfo_pmd,
                patch.lfo_pitch_mod_sens,
                sample_rate,
            );
        }

        let algorithm = &ALGORITHMS[(patch.algorithm.clamp(1, 32) - 1) as usize];
        algorithms::route(
            algorithm,
            &samples,
            patch.feedback,
            patch.feedback_mode,
            &mut self.prev_feedback,
        )
    }
}

/// `base_hz(n, bend) = 440 * 2^((n-69)/12) * 2^(bend*2/12)`, ±2 semitones
/// per unit pitch bend.
pub fn base_hz(midi_note: u8, pitch_bend: f64) -> f64 {
    440.0 * 2f64.powf((midi_note as f64 - 69.0) / 12.0) * 2f64.powf(pitch_bend * 2.0 / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440hz_at_no_bend() {
        assert!((base_hz(69, 0.0) - 440.0).abs() < 1e-6);
    }

    #[test]
    fn max_bend_is_two_semitones_up() {
        let expected = 440.0 * 2f64.powf(2.0 / 12.0);
        assert!((base_hz(69, 1.0) - expected).abs() < 1e-3);
    }

    #[test]
    fn allocate_resets_operator_phase_and_envelope() {
        let patch = Patch::default();
        let mut voice = Voice::new_inactive(&patch, 48000.0);
        voice.allocate(&patch, 60, 1.0, 1, 0, 48000.0);
        assert!(voice.active);
        for op in &voice.operators {
            assert_eq!(op.phase, 0.0);
        }
    }

    #[test]
    fn transpose_shifts_operator_frequency() {
        let mut patch = Patch::default();
        patch.transpose = 12;
        let mut voice = Voice::new_inactive(&patch, 48000.0);
        voice.allocate(&patch, 60, 1.0, 1, 0, 48000.0);
        let controllers = Controllers::new();
        voice.advance(&patch, &controllers, 48000.0);
        let expected = base_hz(72, 0.0) * patch.operators[0].freq_ratio;
        assert!((voice.operators[0].freq - expected).abs() < 1e-6);
    }

    #[test]
    fn freshly_allocated_voice_is_not_silent() {
        let patch = Patch {
            operators: [crate::fm::patch::OperatorParams {
                env_levels: [99, 99, 99, 0],
                ..Default::default()
            }; 6],
            ..Default::default()
        };
        let mut voice = Voice::new_inactive(&patch, 48000.0);
        voice.allocate(&patch, 60, 1.0, 1, 0, 48000.0);
        let controllers = Controllers::new();
        for _ in 0..10 {
            voice.advance(&patch, &controllers, 48000.0);
        }
        assert!(!voice.is_silent());
    }
}
