//! The 32 fixed FM algorithms: which operators sum into the voice output
//! (carriers) and which operators modulate which (the routing matrix).
//!
//! The table below mirrors the classic DX7 algorithm chart: for each
//! algorithm, `matrix[m][c] == 1` means operator `m`'s output phase-modulates
//! operator `c`. Operators are numbered `0..=5` for OP1..OP6. Feedback is a
//! separate, global mechanism applied in [`route`] and never appears in the
//! matrix itself.

use super::operator::OperatorSample;
use serde::{Deserialize, Serialize};

/// One fixed algorithm topology.
pub struct Algorithm {
    /// Operator indices summed (and normalized by `1/sqrt(len)`) into the output.
    pub carriers: &'static [usize],
    /// `matrix[modulator][destination]`: nonzero if `modulator` feeds `destination`.
    pub matrix: [[u8; 6]; 6],
}

/// How operator 0's self-feedback is computed. The spec's literal formula
/// (`sin(2π*p + p*fb*0.1)`) feeds back the operator's own already-scaled
/// output sample, which differs from the DX7's hardware behavior of using
/// the average of the last two raw output samples as a phase offset. Both
/// are implemented; `Plaits` is the default, matching the spec's contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeedbackMode {
    /// The spec's literal formula: feedback is a function of the current sample.
    #[default]
    Plaits,
    /// DX7-style: feedback is a function of the previous output sample.
    Classic,
}

/// All 32 algorithms, indexed `0..=31` for algorithm numbers `1..=32`.
#[rustfmt::skip]
pub const ALGORITHMS: [Algorithm; 32] = [
    Algorithm { carriers: &[0, 2], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 2], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 3], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 1, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 3], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 1, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 2, 4], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 2, 4], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 2], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 2], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 2], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 3], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 1, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 1, 0, 0],
    ]},
    Algorithm { carriers: &[0, 3], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 1, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 1, 0, 0],
    ]},
    Algorithm { carriers: &[0, 2], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 1, 0, 0, 0], [0, 0, 1, 0, 0, 0],
    ]},
    Algorithm { carriers: &[0, 2], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 1, 0, 0, 0], [0, 0, 1, 0, 0, 0],
    ]},
    Algorithm { carriers: &[0, 2], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 1, 0, 0],
    ]},
    Algorithm { carriers: &[0, 2], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 1, 0, 0],
    ]},
    Algorithm { carriers: &[0], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0],
        [1, 0, 0, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 3, 4], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 1, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 1, 0],
    ]},
    Algorithm { carriers: &[0, 1, 3], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [1, 1, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 1, 0, 0],
    ]},
    Algorithm { carriers: &[0, 1, 3, 4], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [1, 1, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 1, 0],
    ]},
    Algorithm { carriers: &[0, 2, 3, 4], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 1, 1, 1, 0],
    ]},
    Algorithm { carriers: &[0, 1, 3, 4], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 1, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 1, 0],
    ]},
    Algorithm { carriers: &[0, 1, 2, 3, 4], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 1, 1, 1, 0],
    ]},
    Algorithm { carriers: &[0, 1, 2, 3, 4], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 1, 0],
    ]},
    Algorithm { carriers: &[0, 1, 3], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 1, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 1, 0, 0],
    ]},
    Algorithm { carriers: &[0, 1, 3], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 1, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 1, 0, 0],
    ]},
    Algorithm { carriers: &[0, 2, 5], matrix: [
        [0, 0, 0, 0, 0, 0], [1, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 0, 0, 0],
    ]},
    Algorithm { carriers: &[0, 1, 2, 4], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 1, 2, 5], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 1, 0, 0, 0], [0, 0, 0, 1, 0, 0], [0, 0, 0, 0, 0, 0],
    ]},
    Algorithm { carriers: &[0, 1, 2, 3, 4], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 1, 0],
    ]},
    Algorithm { carriers: &[0, 1, 2, 3, 4, 5], matrix: [
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
        [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0],
    ]},
];

/// Mixes six operator samples through the given algorithm, applying feedback
/// self-modulation on operator 0 and the modulation matrix, and returns the
/// normalized voice-level sample, nominally in `[-1, 1]`.
///
/// `feedback` is `0..=7`, matching [`crate::fm::patch::Patch::feedback`].
/// `prev_feedback` carries operator 0's feedback term across samples; under
/// [`FeedbackMode::Classic`] it is read before this call and overwritten
/// with the new value, under [`FeedbackMode::Plaits`] it is left untouched.
pub fn route(
    algorithm: &Algorithm,
    samples: &[OperatorSample; 6],
    feedback: u8,
    mode: FeedbackMode,
    prev_feedback: &mut f64,
) -> f64 {
    use std::f64::consts::TAU;

    let mut p = [0.0f64; 6];
    for i in 0..6 {
        p[i] = samples[i].raw * samples[i].level;
    }

    if feedback > 0 {
        let fb_depth = feedback as f64 / 7.0;
        p[0] = match mode {
            FeedbackMode::Plaits => (TAU * p[0] + p[0] * fb_depth * 0.1).sin(),
            FeedbackMode::Classic => {
                let out = (TAU * p[0] + *prev_feedback * fb_depth * std::f64::consts::PI).sin();
                *prev_feedback = out;
                out
            }
        };
    }

    // Destinations are processed high-to-low: every modulator in this table
    // has a strictly higher index than the operator it feeds, so by the time
    // a slot is read as a modulator its own incoming modulation (if any) has
    // already been applied.
    for c in (0..6).rev() {
        for (m, row) in algorithm.matrix.iter().enumerate() {
            if row[c] > 0 {
                p[c] = (TAU + p[m] * row[c] as f64 * samples[m].level * 2.0).sin();
            }
        }
    }

    let sum: f64 = algorithm.carriers.iter().map(|&c| p[c]).sum();
    sum / (algorithm.carriers.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_algorithm_has_at_least_one_carrier() {
        for (i, alg) in ALGORITHMS.iter().enumerate() {
            assert!(!alg.carriers.is_empty(), "algorithm {} has no carriers", i + 1);
        }
    }

    #[test]
    fn algorithm_32_is_all_carriers_no_modulation() {
        let alg = &ALGORITHMS[31];
        assert_eq!(alg.carriers, &[0, 1, 2, 3, 4, 5]);
        for row in alg.matrix.iter() {
            assert!(row.iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn route_is_finite_for_silence() {
        let silent = [OperatorSample::default(); 6];
        for alg in ALGORITHMS.iter() {
            let mut prev = 0.0;
            let out = route(alg, &silent, 0, FeedbackMode::Plaits, &mut prev);
            assert!(out.is_finite());
        }
    }

    #[test]
    fn route_is_finite_with_feedback_and_full_drive() {
        let driven = [OperatorSample { raw: 1.0, level: 1.0 }; 6];
        for alg in ALGORITHMS.iter() {
            for fb in 0..=7u8 {
                let mut prev = 0.0;
                let out = route(alg, &driven, fb, FeedbackMode::Plaits, &mut prev);
                assert!(out.is_finite());
                let mut prev_classic = 0.0;
                let out_classic = route(alg, &driven, fb, FeedbackMode::Classic, &mut prev_classic);
                assert!(out_classic.is_finite());
            }
        }
    }
}
