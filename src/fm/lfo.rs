//! One low-frequency oscillator per voice, driving amplitude and pitch
//! modulation.
//!
//! Frequency tracks `f_lfo = (lfo_speed/99) * 6 * speed_multiplier`, where
//! `speed_multiplier` responds to the mod wheel. Sine is the only waveform
//! the core voice path depends on; the remaining five exist because the
//! prior art already implements them and a patch can select any of them.

use super::patch::LfoWaveform;

use std::f64::consts::TAU;

/// Per-voice LFO state.
#[derive(Clone, Debug)]
pub struct Lfo {
    /// Normalized phase in `[0, 1)`.
    phase: f64,
    waveform: LfoWaveform,
    /// Seconds elapsed since note-on, used for the fade-in delay.
    elapsed: f64,
    /// Sample-and-hold state, regenerated once per cycle.
    held: f64,
    rand_state: u32,
}

impl Lfo {
    /// Creates an LFO at phase zero.
    pub fn new(waveform: LfoWaveform) -> Self {
        Self {
            phase: 0.0,
            waveform,
            elapsed: 0.0,
            held: 0.0,
            rand_state: 0x1234_5678,
        }
    }

    /// Resets phase to zero; called on note-on when `lfo_sync` is set.
    pub fn reset_phase(&mut self) {
        self.phase = 0.0;
        self.elapsed = 0.0;
    }

    /// Advances the LFO by one sample and returns `(raw, fade)`:
    /// `raw` is the waveform output in `[-1, 1]`, `fade` is the delay
    /// envelope in `[0, 1]` (0 while still delaying, ramping to 1).
    ///
    /// `mod_wheel` is `0.0..=1.0`; `speed_multiplier` is `1.0` when no
    /// controller is active, matching the spec's "else 1" fallback.
    pub fn advance(
        &mut self,
        lfo_speed: u8,
        lfo_delay: u8,
        mod_wheel: Option<f64>,
        sample_rate: f64,
    ) -> (f64, f64) {
        let speed_multiplier = match mod_wheel {
            Some(mw) => 0.1 + mw * 2.9,
            None => 1.0,
        };
        let f_lfo = (lfo_speed as f64 / 99.0) * 6.0 * speed_multiplier;

        let prev_phase = self.phase;
        self.phase += f_lfo / sample_rate;
        self.phase -= self.phase.floor();
        self.elapsed += 1.0 / sample_rate;

        if self.waveform == LfoWaveform::SampleAndHold && self.phase < prev_phase {
            self.rand_state = self.rand_state.wrapping_mul(1664525).wrapping_add(1013904223);
            self.held = (self.rand_state >> 8) as f64 / (1u32 << 24) as f64 * 2.0 - 1.0;
        }

        let raw = self.raw_output();
        let fade = self.delay_fade(lfo_delay, sample_rate);
        (raw, fade)
    }

    fn raw_output(&self) -> f64 {
        match self.waveform {
            LfoWaveform::Sine => (TAU * self.phase).sin(),
            LfoWaveform::Triangle => {
                // Up ramp in [0, 0.5), down ramp in [0.5, 1), mapped to [-1, 1].
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
            LfoWaveform::SawUp => 2.0 * self.phase - 1.0,
            LfoWaveform::SawDown => 1.0 - 2.0 * self.phase,
            LfoWaveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoWaveform::SampleAndHold => self.held,
        }
    }

    /// `lfo_delay == 0` means no delay; full fade-in takes about one second
    /// at `lfo_delay == 99`, matching the DX7's audibly long maximum delay.
    fn delay_fade(&self, lfo_delay: u8, _sample_rate: f64) -> f64 {
        if lfo_delay == 0 {
            return 1.0;
        }
        let delay_seconds = lfo_delay as f64 / 99.0 * 4.0;
        (self.elapsed / delay_seconds).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_output_stays_in_unit_range() {
        let mut lfo = Lfo::new(LfoWaveform::Sine);
        for _ in 0..48000 {
            let (raw, _) = lfo.advance(99, 0, None, 48000.0);
            assert!((-1.0..=1.0).contains(&raw));
        }
    }

    #[test]
    fn zero_delay_is_immediately_full_scale() {
        let mut lfo = Lfo::new(LfoWaveform::Sine);
        let (_, fade) = lfo.advance(50, 0, None, 48000.0);
        assert_eq!(fade, 1.0);
    }

    #[test]
    fn nonzero_delay_starts_at_zero_and_rises() {
        let mut lfo = Lfo::new(LfoWaveform::Sine);
        let (_, fade_first) = lfo.advance(50, 99, None, 48000.0);
        assert!(fade_first < 0.01);
        for _ in 0..48000 * 5 {
            lfo.advance(50, 99, None, 48000.0);
        }
        let (_, fade_later) = lfo.advance(50, 99, None, 48000.0);
        assert!(fade_later > fade_first);
    }

    #[test]
    fn mod_wheel_increases_frequency() {
        let mut slow = Lfo::new(LfoWaveform::SawUp);
        let mut fast = Lfo::new(LfoWaveform::SawUp);
        for _ in 0..100 {
            slow.advance(50, 0, None, 48000.0);
            fast.advance(50, 0, Some(1.0), 48000.0);
        }
        assert!(fast.phase > slow.phase);
    }

    #[test]
    fn triangle_is_continuous_and_bounded() {
        let mut lfo = Lfo::new(LfoWaveform::Triangle);
        for _ in 0..48000 {
            let (raw, _) = lfo.advance(99, 0, None, 48000.0);
            assert!((-1.0..=1.0).contains(&raw));
        }
    }
}
