//! Error types for engine setup and patch decoding.
//!
//! The audio render path never returns an error (see [`crate::engine::Engine::render_block`]);
//! these types cover the structured, synchronous failures that setup and SysEx
//! decoding can raise.

use thiserror::Error;

/// Errors returned from engine initialization and patch decoding.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// `channel` must be in `1..=16`.
    #[error("MIDI channel {0} out of range (expected 1..=16)")]
    InvalidChannel(u8),

    /// `algorithm` must be in `1..=32`.
    #[error("algorithm {0} out of range (expected 1..=32)")]
    InvalidAlgorithm(u8),

    /// `sample_rate` must be a positive, plausible audio rate.
    #[error("sample rate {0} out of range")]
    InvalidSampleRate(u32),

    /// SysEx frame did not start/end with the expected header/footer bytes.
    #[error("invalid SysEx header")]
    BadSysExHeader,

    /// SysEx frame was not the expected length.
    #[error("invalid SysEx length: expected {expected}, got {actual}")]
    BadSysExLength {
        /// Expected payload length in bytes.
        expected: usize,
        /// Actual payload length in bytes.
        actual: usize,
    },

    /// The trailing checksum byte did not match the computed value.
    #[error("SysEx checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum computed from the payload.
        expected: u8,
        /// Checksum byte found in the frame.
        actual: u8,
    },
}
