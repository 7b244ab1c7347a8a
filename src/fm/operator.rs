//! Per-operator oscillator: phase accumulator, sine generator, and keyboard
//! level scaling.

use super::envelope::EnvelopeState;
use super::patch::{KeyboardScaling, OperatorParams, ScalingCurve};

use std::f64::consts::TAU;

/// Runtime, per-voice state for a single operator.
pub struct OperatorState {
    /// Normalized phase in `[0, 1)`.
    pub phase: f64,
    /// Current frequency in Hz, after ratio, detune, and pitch bend.
    pub freq: f64,
    /// Last emitted post-level sample, used as a feedback source.
    pub output: f64,
    /// Amplitude envelope.
    pub env: EnvelopeState,
    /// Keyboard level scaling constant, computed once at note-on.
    pub level_scale: f64,
}

impl OperatorState {
    /// Creates operator state at note-on: phase reset, envelope in Attack,
    /// level scaling computed from the patch and the triggering note.
    pub fn new(params: &OperatorParams, midi_note: u8, sample_rate: f64) -> Self {
        let level_scale = keyboard_level_scale(&params.scaling, midi_note);
        Self {
            phase: 0.0,
            freq: 0.0,
            output: 0.0,
            env: EnvelopeState::new(
                params.env_rates,
                params.env_levels,
                midi_note,
                params.key_rate_scaling,
                sample_rate,
            ),
            level_scale,
        }
    }
}

/// Result of advancing one operator by one sample: the raw (pre-level) sine
/// and the total applied level, both needed by the algorithm router.
#[derive(Clone, Copy, Debug, Default)]
pub struct OperatorSample {
    /// Raw sine `sin(2*pi*phase)`, before level scaling.
    pub raw: f64,
    /// Total applied level for this sample.
    pub level: f64,
}

/// Advances one operator by one sample.
///
/// `lfo_value` is the shared voice LFO output in `[-1, 1]`.
#[allow(clippy::too_many_arguments)]
pub fn advance_operator(
    state: &mut OperatorState,
    params: &OperatorParams,
    velocity: f64,
    lfo_value: f64,
    lfo_amd: u8,
    lfo_pmd: u8,
    lfo_pitch_mod_sens: u8,
    sample_rate: f64,
) -> OperatorSample {
    let env_level = state.env.advance(sample_rate);

    let vel_factor = 1.0 - (1.0 - velocity) * (params.key_vel_sens as f64 / 7.0);
    let total = (params.output_level as f64 / 99.0)
        * env_level
        * vel_factor
        * state.level_scale
        * (1.0 + lfo_value * (lfo_amd as f64 / 99.0) * 0.5);

    let raw = (TAU * state.phase).sin();

    let freq_with_lfo = state.freq
        * 2f64.powf(lfo_value * (lfo_pmd as f64 / 99.0) * (lfo_pitch_mod_sens as f64 / 7.0) * 0.1);

    state.phase += freq_with_lfo / sample_rate;
    state.phase -= state.phase.floor();

    state.output = raw * total;

    OperatorSample { raw, level: total }
}

/// Computes the keyboard level scaling factor for a note, given an
/// operator's scaling curve settings. Result is clamped to `[0, 2]`.
pub fn keyboard_level_scale(scaling: &KeyboardScaling, note: u8) -> f64 {
    let bp = scaling.break_point as i32;
    let n = note as i32;

    if n < bp {
        let d = (bp - n) as f64 / 127.0;
        let dp = scaling.left_depth as f64 / 99.0;
        apply_curve(scaling.left_curve, d, dp)
    } else if n > bp {
        let d = (n - bp) as f64 / 127.0;
        let dp = scaling.right_depth as f64 / 99.0;
        apply_curve(scaling.right_curve, d, dp)
    } else {
        1.0
    }
    .clamp(0.0, 2.0)
}

fn apply_curve(curve: ScalingCurve, d: f64, dp: f64) -> f64 {
    match curve {
        ScalingCurve::LinearDown => 1.0 - d * dp,
        ScalingCurve::ExpDown => 1.0 - dp * (1.0 - (-3.0 * d).exp()),
        ScalingCurve::ExpUp => 1.0 + dp * (1.0 - (-3.0 * d).exp()),
        ScalingCurve::LinearUp => 1.0 + d * dp,
    }
}
