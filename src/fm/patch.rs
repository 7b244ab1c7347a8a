//! Patch data structures: the immutable timbre description a [`crate::engine::Engine`]
//! plays back.

use super::algorithms::FeedbackMode;
use serde::{Deserialize, Serialize};

/// Number of operators in a patch.
pub const NUM_OPERATORS: usize = 6;

/// Number of selectable FM algorithms.
pub const NUM_ALGORITHMS: usize = 32;

/// Four envelope stages: Attack, Decay1, Decay2, Release.
pub const NUM_ENV_STAGES: usize = 4;

/// Per-operator keyboard level scaling curve shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingCurve {
    /// Linear decrease moving away from the break point.
    LinearDown,
    /// Exponential decrease moving away from the break point.
    ExpDown,
    /// Exponential increase moving away from the break point.
    ExpUp,
    /// Linear increase moving away from the break point.
    LinearUp,
}

impl ScalingCurve {
    /// Decodes a curve selector in `0..=3` as packed in SysEx data.
    pub fn from_u8(v: u8) -> Self {
        match v & 0x03 {
            0 => ScalingCurve::LinearDown,
            1 => ScalingCurve::ExpDown,
            2 => ScalingCurve::ExpUp,
            _ => ScalingCurve::LinearUp,
        }
    }

    /// Encodes back to the `0..=3` selector used in SysEx data.
    pub fn to_u8(self) -> u8 {
        match self {
            ScalingCurve::LinearDown => 0,
            ScalingCurve::ExpDown => 1,
            ScalingCurve::ExpUp => 2,
            ScalingCurve::LinearUp => 3,
        }
    }
}

/// LFO waveform selector. Sine is the only waveform the core spec requires;
/// the rest are implemented here since the prior art already has them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LfoWaveform {
    /// Smooth sine.
    Sine,
    /// Symmetric up/down ramp.
    Triangle,
    /// Ramps up then snaps down.
    SawUp,
    /// Ramps down then snaps up.
    SawDown,
    /// Hard two-level square wave.
    Square,
    /// Stepped random value, updated once per cycle.
    SampleAndHold,
}

impl LfoWaveform {
    /// Decodes the `lfo_wave` patch field (`0..=5`).
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LfoWaveform::Triangle,
            1 => LfoWaveform::SawDown,
            2 => LfoWaveform::SawUp,
            3 => LfoWaveform::Square,
            4 => LfoWaveform::Sine,
            _ => LfoWaveform::SampleAndHold,
        }
    }

    /// Encodes back to the `0..=5` selector used in SysEx data.
    pub fn to_u8(self) -> u8 {
        match self {
            LfoWaveform::Triangle => 0,
            LfoWaveform::SawDown => 1,
            LfoWaveform::SawUp => 2,
            LfoWaveform::Square => 3,
            LfoWaveform::Sine => 4,
            LfoWaveform::SampleAndHold => 5,
        }
    }
}

/// Per-operator keyboard level scaling: attenuates/boosts output level as a
/// function of distance from a break-point key.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyboardScaling {
    /// MIDI note the scaling curves pivot around.
    pub break_point: u8,
    /// Depth of scaling below the break point, `0..=99`.
    pub left_depth: u8,
    /// Depth of scaling above the break point, `0..=99`.
    pub right_depth: u8,
    /// Curve shape below the break point.
    pub left_curve: ScalingCurve,
    /// Curve shape above the break point.
    pub right_curve: ScalingCurve,
}

impl Default for KeyboardScaling {
    fn default() -> Self {
        Self {
            break_point: 60,
            left_depth: 0,
            right_depth: 0,
            left_curve: ScalingCurve::LinearDown,
            right_curve: ScalingCurve::LinearDown,
        }
    }
}

/// Immutable per-operator parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperatorParams {
    /// Frequency ratio relative to the voice's base frequency, `[0.5, 31.99]`.
    pub freq_ratio: f64,
    /// Fine detune in `[-7, 7]`; one unit is roughly a 1% frequency shift.
    pub detune: i8,
    /// Envelope rates per stage (Attack, Decay1, Decay2, Release), each `0..=99`.
    pub env_rates: [u8; NUM_ENV_STAGES],
    /// Envelope target levels per stage, each `0..=99`.
    pub env_levels: [u8; NUM_ENV_STAGES],
    /// Output level, `0..=99`.
    pub output_level: u8,
    /// Velocity sensitivity, `0..=7`.
    pub key_vel_sens: u8,
    /// Keyboard level scaling.
    pub scaling: KeyboardScaling,
    /// Keyboard rate scaling, `0..=7`.
    pub key_rate_scaling: u8,
    /// Advisory oscillator sync flag; the core does not act on it.
    pub osc_sync: bool,
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self {
            freq_ratio: 1.0,
            detune: 0,
            env_rates: [99, 99, 99, 99],
            env_levels: [99, 99, 99, 0],
            output_level: 99,
            key_vel_sens: 0,
            scaling: KeyboardScaling::default(),
            key_rate_scaling: 0,
            osc_sync: false,
        }
    }
}

/// A complete, immutable timbre: six operators, an algorithm, and shared
/// LFO/pitch-envelope parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Display name, conventionally 10 characters.
    pub name: String,
    /// The six FM operators.
    pub operators: [OperatorParams; NUM_OPERATORS],
    /// Algorithm number, `1..=32`.
    pub algorithm: u8,
    /// Self-modulation feedback depth for operator 0, `0..=7`.
    pub feedback: u8,
    /// Which feedback formula operator 0's self-modulation uses.
    pub feedback_mode: FeedbackMode,
    /// LFO speed, `0..=99`.
    pub lfo_speed: u8,
    /// LFO fade-in delay, `0..=99`.
    pub lfo_delay: u8,
    /// LFO pitch modulation depth, `0..=99`.
    pub lfo_pmd: u8,
    /// LFO amplitude modulation depth, `0..=99`.
    pub lfo_amd: u8,
    /// Whether the LFO phase resets on note-on.
    pub lfo_sync: bool,
    /// LFO waveform.
    pub lfo_wave: LfoWaveform,
    /// LFO-to-pitch sensitivity, `0..=7`.
    pub lfo_pitch_mod_sens: u8,
    /// Pitch envelope rates, `0..=99` each.
    pub pitch_env_rates: [u8; NUM_ENV_STAGES],
    /// Pitch envelope levels, `0..=50` each.
    pub pitch_env_levels: [u8; NUM_ENV_STAGES],
    /// Transpose in semitones, `[-24, 24]`.
    pub transpose: i8,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            name: "INIT VOICE".to_string(),
            operators: [OperatorParams::default(); NUM_OPERATORS],
            algorithm: 1,
            feedback: 0,
            feedback_mode: FeedbackMode::Plaits,
            lfo_speed: 35,
            lfo_delay: 0,
            lfo_pmd: 0,
            lfo_amd: 0,
            lfo_sync: true,
            lfo_wave: LfoWaveform::Triangle,
            lfo_pitch_mod_sens: 3,
            pitch_env_rates: [99, 99, 99, 99],
            pitch_env_levels: [50, 50, 50, 50],
            transpose: 0,
        }
    }
}

/// A bank of 32 patches, as carried by a bulk SysEx dump.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchBank {
    /// The 32 patches in bank order.
    pub patches: Vec<Patch>,
}

impl PatchBank {
    /// Number of patches in a standard DX7 bank.
    pub const SIZE: usize = 32;
}
