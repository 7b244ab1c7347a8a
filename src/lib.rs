//! Six-operator FM synthesis engine: a DX7-style voice architecture (32
//! fixed algorithms, 4-stage envelopes, per-voice LFO, keyboard scaling)
//! driven by a byte-level MIDI parser and exposed through a lock-free,
//! two-thread [`engine::Engine`].

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod fm;
pub mod patch_file;
pub mod sysex;
pub mod wav_writer;
