//! Patch SysEx codec: bidirectional encoding between in-memory [`Patch`] /
//! [`PatchBank`] values and the MIDI wire frames a real synthesizer would
//! send and receive (§4.7).
//!
//! The single-voice format is exact to the 155-byte payload layout
//! documented in the spec. The 32-voice bulk-dump format is an addition:
//! the distilled spec only implies "a SysEx codec" without naming the bulk
//! variant, so its field packing is this crate's own (internally
//! consistent, round-trip-correct) design rather than a byte-exact
//! reproduction of the hardware's bulk format.

use crate::error::EngineError;
use crate::fm::algorithms::FeedbackMode;
use crate::fm::patch::{KeyboardScaling, LfoWaveform, OperatorParams, Patch, PatchBank, ScalingCurve};

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;
const YAMAHA_ID: u8 = 0x43;
const FORMAT_SINGLE_VOICE: u8 = 0x00;
const FORMAT_BULK_BANK: u8 = 0x09;

/// Payload length of a single-voice packet, not counting header/checksum/`F7`.
pub const VOICE_PAYLOAD_LEN: usize = 155;
/// Total wire length of a single-voice packet, header through `F7`.
pub const VOICE_FRAME_LEN: usize = 163;
/// Payload length of a bulk 32-voice packet.
pub const BANK_PAYLOAD_LEN: usize = PatchBank::SIZE * 128;
/// Total wire length of a bulk 32-voice packet.
pub const BANK_FRAME_LEN: usize = BANK_PAYLOAD_LEN + 8;

fn checksum(payload: &[u8]) -> u8 {
    let sum: u32 = payload.iter().map(|&b| b as u32).sum();
    ((128 - (sum & 0x7F)) & 0x7F) as u8
}

/// Converts a frequency ratio to its `(coarse, fine)` SysEx encoding.
/// Lossy: `coarse == 0` represents the sub-harmonic ratio 0.5.
fn ratio_to_coarse_fine(ratio: f64) -> (u8, u8) {
    let ratio = ratio.clamp(0.5, 31.99);
    if ratio < 1.0 {
        let fine = ((ratio / 0.5 - 1.0) * 100.0).round().clamp(0.0, 99.0) as u8;
        (0, fine)
    } else {
        let coarse = ratio.floor().clamp(1.0, 31.0);
        let fine = ((ratio / coarse - 1.0) * 100.0).round().clamp(0.0, 99.0) as u8;
        (coarse as u8, fine)
    }
}

fn coarse_fine_to_ratio(coarse: u8, fine: u8) -> f64 {
    let base = if coarse == 0 { 0.5 } else { coarse as f64 };
    base * (1.0 + fine as f64 / 100.0)
}

fn pack_operator_21(op: &OperatorParams, out: &mut [u8]) {
    out[0..4].copy_from_slice(&op.env_rates);
    out[4..8].copy_from_slice(&op.env_levels);
    out[8] = op.scaling.break_point;
    out[9] = op.scaling.left_depth;
    out[10] = op.scaling.right_depth;
    out[11] = op.scaling.left_curve.to_u8() & 0x03;
    out[12] = (op.scaling.right_curve.to_u8() & 0x03) | ((op.key_rate_scaling & 0x07) << 2);
    out[13] = (op.key_vel_sens & 0x07) << 2;
    out[14] = op.output_level;
    let (coarse, fine) = ratio_to_coarse_fine(op.freq_ratio);
    out[15] = (op.osc_sync as u8) | (coarse << 1);
    out[16] = fine;
    let detune_field = (op.detune + 7).clamp(0, 14) as u8;
    out[17] = (op.osc_sync as u8) | (detune_field << 1);
    out[18] = 0;
    out[19] = 0;
    out[20] = 0;
}

fn unpack_operator_21(bytes: &[u8]) -> OperatorParams {
    let env_rates = [bytes[0], bytes[1], bytes[2], bytes[3]];
    let env_levels = [bytes[4], bytes[5], bytes[6], bytes[7]];
    let break_point = bytes[8];
    let left_depth = bytes[9];
    let right_depth = bytes[10];
    let left_curve = ScalingCurve::from_u8(bytes[11]);
    let right_curve = ScalingCurve::from_u8(bytes[12]);
    let key_rate_scaling = (bytes[12] >> 2) & 0x07;
    let key_vel_sens = (bytes[13] >> 2) & 0x07;
    let output_level = bytes[14];
    let coarse = (bytes[15] >> 1) & 0x1F;
    let fine = bytes[16];
    let freq_ratio = coarse_fine_to_ratio(coarse, fine);
    let osc_sync = bytes[17] & 0x01 != 0;
    let detune = ((bytes[17] >> 1) & 0x0F) as i8 - 7;

    OperatorParams {
        freq_ratio,
        detune,
        env_rates,
        env_levels,
        output_level,
        key_vel_sens,
        scaling: KeyboardScaling { break_point, left_depth, right_depth, left_curve, right_curve },
        key_rate_scaling,
        osc_sync,
    }
}

fn pack_name(name: &str, out: &mut [u8]) {
    let bytes = name.as_bytes();
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = *bytes.get(i).unwrap_or(&b' ');
    }
}

fn unpack_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}

/// Encodes `patch` as a 163-byte single-voice SysEx frame addressed to
/// `channel` (1-based).
pub fn encode_voice(patch: &Patch, channel: u8) -> Vec<u8> {
    let mut payload = [0u8; VOICE_PAYLOAD_LEN];

    for slot in 0..6 {
        let op_index = 5 - slot;
        let base = slot * 21;
        pack_operator_21(&patch.operators[op_index], &mut payload[base..base + 21]);
    }

    payload[126..130].copy_from_slice(&patch.pitch_env_rates);
    payload[130..134].copy_from_slice(&patch.pitch_env_levels);
    payload[134] = patch.algorithm.saturating_sub(1).min(31);
    payload[135] = patch.feedback & 0x07;
    payload[136] = patch.lfo_speed;
    payload[137] = patch.lfo_delay;
    payload[138] = patch.lfo_pmd;
    payload[139] = patch.lfo_amd;
    payload[140] = (patch.lfo_sync as u8)
        | ((patch.lfo_wave.to_u8() & 0x07) << 1)
        | ((patch.lfo_pitch_mod_sens & 0x07) << 4);
    payload[141] = (patch.transpose + 24).clamp(0, 48) as u8;
    pack_name(&patch.name, &mut payload[142..152]);
    payload[152] = 0x3F;
    payload[153] = 0;
    payload[154] = 0;

    let mut frame = Vec::with_capacity(VOICE_FRAME_LEN);
    frame.push(SYSEX_START);
    frame.push(YAMAHA_ID);
    frame.push(FORMAT_SINGLE_VOICE | (channel.saturating_sub(1) & 0x0F));
    frame.push(0x00);
    frame.push(0x01);
    frame.push(0x1B);
    frame.extend_from_slice(&payload);
    frame.push(checksum(&payload));
    frame.push(SYSEX_END);
    frame
}

/// Decodes a 163-byte single-voice SysEx frame, validating header constants
/// and checksum. Returns `(patch, channel)`; `channel` is 1-based.
pub fn decode_voice(frame: &[u8]) -> Result<(Patch, u8), EngineError> {
    if frame.len() != VOICE_FRAME_LEN {
        return Err(EngineError::BadSysExLength { expected: VOICE_FRAME_LEN, actual: frame.len() });
    }
    if frame[0] != SYSEX_START
        || frame[1] != YAMAHA_ID
        || frame[3] != 0x00
        || frame[4] != 0x01
        || frame[5] != 0x1B
        || frame[VOICE_FRAME_LEN - 1] != SYSEX_END
        || frame[2] & 0xF0 != FORMAT_SINGLE_VOICE
    {
        return Err(EngineError::BadSysExHeader);
    }
    let channel = (frame[2] & 0x0F) + 1;
    let payload = &frame[6..6 + VOICE_PAYLOAD_LEN];
    let expected = checksum(payload);
    let actual = frame[6 + VOICE_PAYLOAD_LEN];
    if expected != actual {
        return Err(EngineError::ChecksumMismatch { expected, actual });
    }

    let mut operators = [OperatorParams::default(); 6];
    for slot in 0..6 {
        let op_index = 5 - slot;
        let base = slot * 21;
        operators[op_index] = unpack_operator_21(&payload[base..base + 21]);
    }

    let pitch_env_rates = [payload[126], payload[127], payload[128], payload[129]];
    let pitch_env_levels = [payload[130], payload[131], payload[132], payload[133]];
    let algorithm = (payload[134] & 0x1F) + 1;
    let feedback = payload[135] & 0x07;
    let lfo_speed = payload[136];
    let lfo_delay = payload[137];
    let lfo_pmd = payload[138];
    let lfo_amd = payload[139];
    let lfo_byte = payload[140];
    let lfo_sync = lfo_byte & 0x01 != 0;
    let lfo_wave = LfoWaveform::from_u8((lfo_byte >> 1) & 0x07);
    let lfo_pitch_mod_sens = (lfo_byte >> 4) & 0x07;
    let transpose = payload[141] as i16 - 24;
    let name = unpack_name(&payload[142..152]);

    Ok((
        Patch {
            name,
            operators,
            algorithm,
            feedback,
            feedback_mode: FeedbackMode::Plaits,
            lfo_speed,
            lfo_delay,
            lfo_pmd,
            lfo_amd,
            lfo_sync,
            lfo_wave,
            lfo_pitch_mod_sens,
            pitch_env_rates,
            pitch_env_levels,
            transpose: transpose as i8,
        },
        channel,
    ))
}

fn pack_operator_17(op: &OperatorParams, out: &mut [u8]) {
    out[0..4].copy_from_slice(&op.env_rates);
    out[4..8].copy_from_slice(&op.env_levels);
    out[8] = op.scaling.break_point;
    out[9] = op.scaling.left_depth;
    out[10] = op.scaling.right_depth;
    out[11] = (op.scaling.left_curve.to_u8() & 0x03)
        | ((op.scaling.right_curve.to_u8() & 0x03) << 2)
        | ((op.key_rate_scaling & 0x07) << 4);
    out[12] = op.key_vel_sens & 0x07;
    out[13] = op.output_level;
    let (coarse, fine) = ratio_to_coarse_fine(op.freq_ratio);
    out[14] = (coarse & 0x1F) | ((op.osc_sync as u8) << 5);
    out[15] = fine;
    let detune_field = (op.detune + 7).clamp(0, 14) as u8;
    out[16] = (detune_field & 0x0F) | ((op.osc_sync as u8) << 4);
}

fn unpack_operator_17(bytes: &[u8]) -> OperatorParams {
    let env_rates = [bytes[0], bytes[1], bytes[2], bytes[3]];
    let env_levels = [bytes[4], bytes[5], bytes[6], bytes[7]];
    let break_point = bytes[8];
    let left_depth = bytes[9];
    let right_depth = bytes[10];
    let left_curve = ScalingCurve::from_u8(bytes[11] & 0x03);
    let right_curve = ScalingCurve::from_u8((bytes[11] >> 2) & 0x03);
    let key_rate_scaling = (bytes[11] >> 4) & 0x07;
    let key_vel_sens = bytes[12] & 0x07;
    let output_level = bytes[13];
    let coarse = bytes[14] & 0x1F;
    let osc_sync = bytes[14] & 0x20 != 0;
    let fine = bytes[15];
    let freq_ratio = coarse_fine_to_ratio(coarse, fine);
    let detune = (bytes[16] & 0x0F) as i8 - 7;

    OperatorParams {
        freq_ratio,
        detune,
        env_rates,
        env_levels,
        output_level,
        key_vel_sens,
        scaling: KeyboardScaling { break_point, left_depth, right_depth, left_curve, right_curve },
        key_rate_scaling,
        osc_sync,
    }
}

fn encode_bank_voice(patch: &Patch, out: &mut [u8; 128]) {
    for slot in 0..6 {
        let op_index = 5 - slot;
        let base = slot * 17;
        pack_operator_17(&patch.operators[op_index], &mut out[base..base + 17]);
    }
    let base = 102;
    out[base..base + 4].copy_from_slice(&patch.pitch_env_rates);
    out[base + 4..base + 8].copy_from_slice(&patch.pitch_env_levels);
    out[base + 8] = (patch.algorithm.saturating_sub(1).min(31) & 0x1F) | ((patch.feedback & 0x07) << 5);
    out[base + 9] = patch.lfo_speed;
    out[base + 10] = patch.lfo_delay;
    out[base + 11] = patch.lfo_pmd;
    out[base + 12] = patch.lfo_amd;
    out[base + 13] = (patch.lfo_sync as u8)
        | ((patch.lfo_wave.to_u8() & 0x07) << 1)
        | ((patch.lfo_pitch_mod_sens & 0x07) << 4);
    out[base + 14] = (patch.transpose + 24).clamp(0, 48) as u8;
    pack_name(&patch.name, &mut out[base + 15..base + 25]);
    out[127] = 0;
}

fn decode_bank_voice(bytes: &[u8; 128]) -> Patch {
    let mut operators = [OperatorParams::default(); 6];
    for slot in 0..6 {
        let op_index = 5 - slot;
        let base = slot * 17;
        operators[op_index] = unpack_operator_17(&bytes[base..base + 17]);
    }
    let base = 102;
    let pitch_env_rates = [bytes[base], bytes[base + 1], bytes[base + 2], bytes[base + 3]];
    let pitch_env_levels = [bytes[base + 4], bytes[base + 5], bytes[base + 6], bytes[base + 7]];
    let algorithm = (bytes[base + 8] & 0x1F) + 1;
    let feedback = (bytes[base + 8] >> 5) & 0x07;
    let lfo_speed = bytes[base + 9];
    let lfo_delay = bytes[base + 10];
    let lfo_pmd = bytes[base + 11];
    let lfo_amd = bytes[base + 12];
    let lfo_byte = bytes[base + 13];
    let lfo_sync = lfo_byte & 0x01 != 0;
    let lfo_wave = LfoWaveform::from_u8((lfo_byte >> 1) & 0x07);
    let lfo_pitch_mod_sens = (lfo_byte >> 4) & 0x07;
    let transpose = bytes[base + 14] as i16 - 24;
    let name = unpack_name(&bytes[base + 15..base + 25]);

    Patch {
        name,
        operators,
        algorithm,
        feedback,
        feedback_mode: FeedbackMode::Plaits,
        lfo_speed,
        lfo_delay,
        lfo_pmd,
        lfo_amd,
        lfo_sync,
        lfo_wave,
        lfo_pitch_mod_sens,
        pitch_env_rates,
        pitch_env_levels,
        transpose: transpose as i8,
    }
}

/// Encodes a 32-voice bank as a bulk SysEx dump addressed to `channel`.
pub fn encode_bank(bank: &PatchBank, channel: u8) -> Vec<u8> {
    let mut payload = vec![0u8; BANK_PAYLOAD_LEN];
    for (i, patch) in bank.patches.iter().take(PatchBank::SIZE).enumerate() {
        let mut voice = [0u8; 128];
        encode_bank_voice(patch, &mut voice);
        payload[i * 128..(i + 1) * 128].copy_from_slice(&voice);
    }

    let mut frame = Vec::with_capacity(BANK_FRAME_LEN);
    frame.push(SYSEX_START);
    frame.push(YAMAHA_ID);
    frame.push(FORMAT_BULK_BANK | (channel.saturating_sub(1) & 0x0F));
    frame.push(0x20);
    frame.push(0x00);
    frame.push(0x09);
    frame.extend_from_slice(&payload);
    frame.push(checksum(&payload));
    frame.push(SYSEX_END);
    frame
}

/// Decodes a bulk 32-voice SysEx dump.
pub fn decode_bank(frame: &[u8]) -> Result<(PatchBank, u8), EngineError> {
    if frame.len() != BANK_FRAME_LEN {
        return Err(EngineError::BadSysExLength { expected: BANK_FRAME_LEN, actual: frame.len() });
    }
    if frame[0] != SYSEX_START
        || frame[1] != YAMAHA_ID
        || frame[frame.len() - 1] != SYSEX_END
        || frame[2] & 0xF0 != FORMAT_BULK_BANK
    {
        return Err(EngineError::BadSysExHeader);
    }
    let channel = (frame[2] & 0x0F) + 1;
    let payload = &frame[6..6 + BANK_PAYLOAD_LEN];
    let expected = checksum(payload);
    let actual = frame[6 + BANK_PAYLOAD_LEN];
    if expected != actual {
        return Err(EngineError::ChecksumMismatch { expected, actual });
    }

    let mut patches = Vec::with_capacity(PatchBank::SIZE);
    for i in 0..PatchBank::SIZE {
        let mut voice = [0u8; 128];
        voice.copy_from_slice(&payload[i * 128..(i + 1) * 128]);
        patches.push(decode_bank_voice(&voice));
    }
    Ok((PatchBank { patches }, channel))
}
