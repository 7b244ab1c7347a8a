//! Per-operator amplitude envelope: a four-stage piecewise-linear generator
//! with rate/level tables and key-rate scaling.

/// Envelope stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Ramping toward the attack target.
    Attack,
    /// Ramping toward the first decay target.
    Decay1,
    /// Ramping toward the sustain target; never advances on its own.
    Decay2,
    /// Ramping toward silence after note-off.
    Release,
}

impl Stage {
    fn index(self) -> usize {
        match self {
            Stage::Attack => 0,
            Stage::Decay1 => 1,
            Stage::Decay2 => 2,
            Stage::Release => 3,
        }
    }
}

/// Nominal full-scale stage time in seconds, indexed by rate `0..=99`.
/// Monotonically decreasing from 30s at rate 0 to 0.4ms at rate 99.
#[rustfmt::skip]
pub const RATE_TABLE: [f64; 100] = [
    30.0, 26.7842, 23.9131, 21.3497, 19.0611,
    17.0179, 15.1937, 13.565, 12.1109, 10.8127,
    9.65363, 8.61882, 7.69493, 6.87008, 6.13365,
    5.47615, 4.88914, 4.36505, 3.89714, 3.47939,
    3.10642, 2.77343, 2.47613, 2.21071, 1.97373,
    1.76216, 1.57327, 1.40462, 1.25405, 1.11963,
    0.999609, 0.892456, 0.79679, 0.711379, 0.635123,
    0.567041, 0.506258, 0.45199, 0.403539, 0.360282,
    0.321662, 0.287182, 0.256397, 0.228913, 0.204375,
    0.182467, 0.162908, 0.145445, 0.129854, 0.115934,
    0.103507, 0.0924115, 0.0825055, 0.0736614, 0.0657653,
    0.0587157, 0.0524217, 0.0468024, 0.0417854, 0.0373063,
    0.0333072, 0.0297369, 0.0265493, 0.0237033, 0.0211625,
    0.018894, 0.0168687, 0.0150604, 0.013446, 0.0120047,
    0.0107179, 0.00956897, 0.00854323, 0.00762745, 0.00680983,
    0.00607985, 0.00542813, 0.00484626, 0.00432677, 0.00386297,
    0.00344888, 0.00307918, 0.00274911, 0.00245442, 0.00219132,
    0.00195642, 0.0017467, 0.00155947, 0.0013923, 0.00124306,
    0.00110981, 0.000990842, 0.000884629, 0.000789802, 0.00070514,
    0.000629553, 0.000562068, 0.000501818, 0.000448026, 0.0004,
];

/// A single operator's amplitude envelope state.
#[derive(Clone, Copy, Debug)]
pub struct EnvelopeState {
    /// Current stage.
    pub stage: Stage,
    /// Current instantaneous output, always in `[0, 1]`.
    pub level: f64,
    /// Signed per-sample delta applied while in the current stage.
    pub rate: f64,
    /// Level at which the current stage ends.
    pub target: f64,
    /// Diagnostic counter; not used for control flow.
    pub samples_in_stage: u64,

    env_rates: [u8; 4],
    env_levels: [u8; 4],
    rate_scale: f64,
    key_rate_scaling: u8,
}

impl EnvelopeState {
    /// Creates an envelope in the `Attack` stage, as at note-on.
    ///
    /// `rate_scale = (midi_note - 60) / 12 * (key_rate_scaling / 7)`, fixed
    /// for the lifetime of the note.
    pub fn new(
        env_rates: [u8; 4],
        env_levels: [u8; 4],
        midi_note: u8,
        key_rate_scaling: u8,
        sample_rate: f64,
    ) -> Self {
        let rate_scale = (midi_note as f64 - 60.0) / 12.0 * (key_rate_scaling as f64 / 7.0);
        let mut env = Self {
            stage: Stage::Attack,
            level: 0.0,
            rate: 0.0,
            target: 0.0,
            samples_in_stage: 0,
            env_rates,
            env_levels,
            rate_scale,
            key_rate_scaling,
        };
        env.enter_stage(Stage::Attack, sample_rate);
        env
    }

    fn stage_rate(&self, stage: Stage, sample_rate: f64, level_diff: f64) -> f64 {
        let rate_index = self.env_rates[stage.index()];
        let mut time = RATE_TABLE[rate_index as usize] * level_diff.abs().max(0.1);
        time /= 1.0 + self.rate_scale * (self.key_rate_scaling as f64 / 7.0);
        if time <= 0.0 || !time.is_finite() {
            return if level_diff >= 0.0 { f64::INFINITY } else { f64::NEG_INFINITY };
        }
        level_diff / (time * sample_rate)
    }

    fn enter_stage(&mut self, stage: Stage, sample_rate: f64) {
        self.stage = stage;
        self.samples_in_stage = 0;
        self.target = self.env_levels[stage.index()] as f64 / 99.0;
        let level_diff = self.target - self.level;
        let rate = self.stage_rate(stage, sample_rate, level_diff);
        self.rate = if rate.is_finite() { rate } else { 0.0 };
        if rate.is_infinite() {
            // Zero-time stage: snap immediately.
            self.level = self.target;
        }
    }

    /// Advances the envelope by one sample and returns the new level.
    pub fn advance(&mut self, sample_rate: f64) -> f64 {
        self.samples_in_stage += 1;
        self.level = (self.level + self.rate).clamp(0.0, 1.0);

        let rate_at_99 = self.env_rates[self.stage.index()] == 99;
        match self.stage {
            Stage::Attack => {
                if self.level >= self.target || rate_at_99 {
                    self.level = self.target;
                    self.enter_stage(Stage::Decay1, sample_rate);
                }
            }
            Stage::Decay1 => {
                if self.level <= self.target || rate_at_99 {
                    self.level = self.target;
                    self.enter_stage(Stage::Decay2, sample_rate);
                }
            }
            Stage::Decay2 => {
                // Sustain stage: drifts toward target but never auto-advances.
                if (self.level - self.target).abs() < 1e-9 {
                    self.rate = 0.0;
                }
            }
            Stage::Release => {}
        }

        self.level
    }

    /// Triggers the release stage (note-off, not deferred by sustain pedal).
    pub fn release(&mut self, sample_rate: f64) {
        self.stage = Stage::Release;
        self.samples_in_stage = 0;
        self.target = self.env_levels[Stage::Release.index()] as f64 / 99.0;
        let level_diff = self.target - self.level;
        if level_diff == 0.0 {
            self.rate = -0.1;
        } else {
            let rate = self.stage_rate(Stage::Release, sample_rate, level_diff);
            self.rate = if rate.is_finite() { rate } else { 0.0 };
            if rate.is_infinite() {
                self.level = self.target;
            }
        }
    }

    /// True once the envelope has decayed below the deactivation threshold.
    pub fn is_silent(&self) -> bool {
        self.level < 0.001
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_table_is_monotonically_decreasing() {
        for i in 1..RATE_TABLE.len() {
            assert!(RATE_TABLE[i] < RATE_TABLE[i - 1], "index {}", i);
        }
        assert!((RATE_TABLE[0] - 30.0).abs() < 1.0);
        assert!(RATE_TABLE[99] < 0.001);
    }

    #[test]
    fn level_stays_in_unit_range() {
        let mut env = EnvelopeState::new([99, 50, 50, 99], [99, 80, 60, 0], 60, 0, 48000.0);
        for _ in 0..48000 * 2 {
            let l = env.advance(48000.0);
            assert!((0.0..=1.0).contains(&l));
        }
    }

    #[test]
    fn instant_attack_reaches_target_quickly() {
        let mut env = EnvelopeState::new([99, 99, 99, 99], [99, 99, 99, 0], 60, 0, 48000.0);
        let mut reached = false;
        for _ in 0..100 {
            if env.advance(48000.0) >= 0.99 {
                reached = true;
                break;
            }
        }
        assert!(reached);
    }

    #[test]
    fn release_moves_toward_zero() {
        let mut env = EnvelopeState::new([99, 99, 99, 99], [99, 99, 99, 0], 60, 0, 48000.0);
        for _ in 0..10 {
            env.advance(48000.0);
        }
        env.release(48000.0);
        let before = env.level;
        for _ in 0..1000 {
            env.advance(48000.0);
        }
        assert!(env.level <= before);
    }
}
