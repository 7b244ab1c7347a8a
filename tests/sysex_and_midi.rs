//! SysEx round-trip and MIDI-parser invariants (spec section 8: P6, P7, P8,
//! S6) exercised through the public API.

use hexafm::fm::algorithms::FeedbackMode;
use hexafm::fm::midi::{MidiEvent, MidiParser};
use hexafm::fm::patch::Patch;
use hexafm::sysex;

/// S6: a named patch with a non-default algorithm and feedback round-trips
/// through SysEx encode/decode.
#[test]
fn sysex_round_trip_preserves_named_algorithm_and_feedback() {
    let mut patch = Patch::default();
    patch.name = "BRASS 1   ".to_string();
    patch.algorithm = 4;
    patch.feedback = 7;

    let frame = sysex::encode_voice(&patch, 3);
    let (decoded, channel) = sysex::decode_voice(&frame).expect("valid frame decodes");

    assert_eq!(channel, 3);
    assert_eq!(decoded.name, patch.name);
    assert_eq!(decoded.algorithm, patch.algorithm);
    assert_eq!(decoded.feedback, patch.feedback);
}

/// P7: round-tripping twice is stable (freq-ratio quantization only loses
/// information on the first pass).
#[test]
fn sysex_round_trip_is_stable_after_first_pass() {
    let mut patch = Patch::default();
    patch.operators[0].freq_ratio = 3.33;

    let once = sysex::decode_voice(&sysex::encode_voice(&patch, 1)).unwrap().0;
    let twice = sysex::decode_voice(&sysex::encode_voice(&once, 1)).unwrap().0;

    assert_eq!(once.operators[0].freq_ratio, twice.operators[0].freq_ratio);
}

/// P8: the checksum byte always makes payload-plus-checksum sum to zero
/// modulo 128.
#[test]
fn checksum_satisfies_spec_invariant() {
    let patch = Patch::default();
    let frame = sysex::encode_voice(&patch, 1);
    let payload = &frame[6..frame.len() - 2];
    let checksum = frame[frame.len() - 2];
    let sum: u32 = payload.iter().map(|&b| b as u32).sum::<u32>() + checksum as u32;
    assert_eq!(sum & 0x7F, 0);
}

/// A frame with a flipped checksum byte is rejected rather than silently
/// accepted.
#[test]
fn corrupted_checksum_round_trip_fails_decode() {
    let patch = Patch::default();
    let mut frame = sysex::encode_voice(&patch, 1);
    let checksum_idx = frame.len() - 2;
    frame[checksum_idx] ^= 0x7F;
    assert!(sysex::decode_voice(&frame).is_err());
}

/// Feedback mode survives the patch round-trip at the in-memory level (the
/// wire format itself is mode-agnostic, so both default to Plaits on
/// decode); this documents that choice rather than asserting a false
/// round-trip guarantee on the wire.
#[test]
fn decoded_patch_defaults_to_plaits_feedback_mode() {
    let mut patch = Patch::default();
    patch.feedback_mode = FeedbackMode::Classic;
    let frame = sysex::encode_voice(&patch, 1);
    let (decoded, _) = sysex::decode_voice(&frame).unwrap();
    assert_eq!(decoded.feedback_mode, FeedbackMode::Plaits);
}

/// P6: running status lets a run of note-on pairs dispatch without
/// repeating the status byte.
#[test]
fn running_status_repeats_across_note_on_stream() {
    let mut parser = MidiParser::new();
    let bytes = [0x90u8, 60, 100, 61, 110, 62, 120];
    let mut events = Vec::new();
    for byte in bytes {
        if let Some(event) = parser.feed_byte(byte) {
            events.push(event);
        }
    }
    assert_eq!(events.len(), 3);
    for (event, expected_note) in events.iter().zip([60u8, 61, 62]) {
        match event {
            MidiEvent::NoteOn { note, .. } => assert_eq!(*note, expected_note),
            other => panic!("expected NoteOn, got {other:?}"),
        }
    }
}

/// A SysEx frame interleaved between other status bytes does not disturb
/// running status once it completes.
#[test]
fn sysex_does_not_disturb_surrounding_running_status() {
    let mut parser = MidiParser::new();
    let mut events = Vec::new();
    let bytes = [
        0x90u8, 60, 100, // note on via explicit status
        0xF0, 0x43, 0x00, 0xF7, // tiny sysex blob
        61, 110, // running status repeats the note-on
    ];
    for byte in bytes {
        if let Some(event) = parser.feed_byte(byte) {
            events.push(event);
        }
    }
    assert!(matches!(events[0], MidiEvent::NoteOn { note: 60, .. }));
    assert!(matches!(events[1], MidiEvent::SysEx(_)));
    assert!(matches!(events[2], MidiEvent::NoteOn { note: 61, .. }));
}
