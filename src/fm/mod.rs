//! The synthesis core: patches, envelopes, operators, algorithm routing,
//! the LFO, MIDI controller state, voices, the voice pool, and the
//! byte-level MIDI parser.

pub mod algorithms;
pub mod controllers;
pub mod envelope;
pub mod lfo;
pub mod midi;
pub mod operator;
pub mod patch;
pub mod voice;
pub mod voice_pool;
