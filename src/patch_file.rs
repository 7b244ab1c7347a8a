//! Plain-text patch file format: `KEY = VALUE` pairs with `#` comments and
//! `[OP1]`..`[OP6]` sections (§6). An external-collaborator format, not a
//! core engine responsibility — loaded here for the CLI demo only.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::fm::algorithms::FeedbackMode;
use crate::fm::patch::{KeyboardScaling, LfoWaveform, OperatorParams, Patch, ScalingCurve};

/// Parses a patch file at `path` into a [`Patch`].
pub fn load(path: &Path) -> Result<Patch> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading patch file {}", path.display()))?;
    parse(&text)
}

/// Parses patch file text into a [`Patch`].
pub fn parse(text: &str) -> Result<Patch> {
    let mut global: HashMap<String, String> = HashMap::new();
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current_section: Option<String> = None;

    for raw_line in text.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_uppercase();
            sections.entry(name.clone()).or_default();
            current_section = Some(name);
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("malformed line (expected KEY = VALUE): {raw_line}"))?;
        let key = key.trim().to_uppercase();
        let value = value.trim().to_string();
        match &current_section {
            Some(section) => {
                sections.entry(section.clone()).or_default().insert(key, value);
            }
            None => {
                global.insert(key, value);
            }
        }
    }

    let mut patch = Patch::default();
    if let Some(name) = global.get("NAME") {
        patch.name = name.clone();
    }
    if let Some(v) = global.get("ALGORITHM") {
        patch.algorithm = v.parse().context("ALGORITHM")?;
    }
    if let Some(v) = global.get("FEEDBACK") {
        patch.feedback = v.parse().context("FEEDBACK")?;
    }
    if let Some(v) = global.get("LFO_SPEED") {
        patch.lfo_speed = v.parse().context("LFO_SPEED")?;
    }
    if let Some(v) = global.get("LFO_DELAY") {
        patch.lfo_delay = v.parse().context("LFO_DELAY")?;
    }
    if let Some(v) = global.get("LFO_PMD") {
        patch.lfo_pmd = v.parse().context("LFO_PMD")?;
    }
    if let Some(v) = global.get("LFO_AMD") {
        patch.lfo_amd = v.parse().context("LFO_AMD")?;
    }
    if let Some(v) = global.get("LFO_SYNC") {
        patch.lfo_sync = parse_bool(v)?;
    }
    if let Some(v) = global.get("LFO_WAVE") {
        patch.lfo_wave = LfoWaveform::from_u8(v.parse().context("LFO_WAVE")?);
    }
    if let Some(v) = global.get("LFO_PITCH_MOD_SENS") {
        patch.lfo_pitch_mod_sens = v.parse().context("LFO_PITCH_MOD_SENS")?;
    }
    if let Some(v) = global.get("TRANSPOSE") {
        patch.transpose = v.parse().context("TRANSPOSE")?;
    }
    patch.feedback_mode = FeedbackMode::Plaits;

    for (i, op_name) in ["OP1", "OP2", "OP3", "OP4", "OP5", "OP6"].iter().enumerate() {
        if let Some(section) = sections.get(*op_name) {
            patch.operators[i] = parse_operator(section, &patch.operators[i])?;
        }
    }

    Ok(patch)
}

fn parse_bool(v: &str) -> Result<bool> {
    match v.to_uppercase().as_str() {
        "1" | "TRUE" | "YES" | "ON" => Ok(true),
        "0" | "FALSE" | "NO" | "OFF" => Ok(false),
        other => Err(anyhow!("expected a boolean, got '{other}'")),
    }
}

fn parse_operator(section: &HashMap<String, String>, base: &OperatorParams) -> Result<OperatorParams> {
    let mut op = *base;
    if let Some(v) = section.get("FREQ_RATIO") {
        op.freq_ratio = v.parse().context("FREQ_RATIO")?;
    }
    if let Some(v) = section.get("DETUNE") {
        op.detune = v.parse().context("DETUNE")?;
    }
    if let Some(v) = section.get("OUTPUT_LEVEL") {
        op.output_level = v.parse().context("OUTPUT_LEVEL")?;
    }
    if let Some(v) = section.get("KEY_VEL_SENS") {
        op.key_vel_sens = v.parse().context("KEY_VEL_SENS")?;
    }
    if let Some(v) = section.get("ENV_ATTACK") {
        op.env_rates[0] = v.parse().context("ENV_ATTACK")?;
    }
    if let Some(v) = section.get("ENV_DECAY1") {
        op.env_rates[1] = v.parse().context("ENV_DECAY1")?;
    }
    if let Some(v) = section.get("ENV_DECAY2") {
        op.env_rates[2] = v.parse().context("ENV_DECAY2")?;
    }
    if let Some(v) = section.get("ENV_RELEASE") {
        op.env_rates[3] = v.parse().context("ENV_RELEASE")?;
    }
    for (idx, key) in ["ENV_LEVEL1", "ENV_LEVEL2", "ENV_LEVEL3", "ENV_LEVEL4"].iter().enumerate() {
        if let Some(v) = section.get(*key) {
            op.env_levels[idx] = v.parse().with_context(|| key.to_string())?;
        }
    }
    let mut scaling: KeyboardScaling = op.scaling;
    if let Some(v) = section.get("KEY_LEVEL_SCALE_BREAK_POINT") {
        scaling.break_point = v.parse().context("KEY_LEVEL_SCALE_BREAK_POINT")?;
    }
    if let Some(v) = section.get("KEY_LEVEL_SCALE_LEFT_DEPTH") {
        scaling.left_depth = v.parse().context("KEY_LEVEL_SCALE_LEFT_DEPTH")?;
    }
    if let Some(v) = section.get("KEY_LEVEL_SCALE_RIGHT_DEPTH") {
        scaling.right_depth = v.parse().context("KEY_LEVEL_SCALE_RIGHT_DEPTH")?;
    }
    if let Some(v) = section.get("KEY_LEVEL_SCALE_LEFT_CURVE") {
        scaling.left_curve = parse_curve(v)?;
    }
    if let Some(v) = section.get("KEY_LEVEL_SCALE_RIGHT_CURVE") {
        scaling.right_curve = parse_curve(v)?;
    }
    op.scaling = scaling;
    if let Some(v) = section.get("KEY_RATE_SCALING") {
        op.key_rate_scaling = v.parse().context("KEY_RATE_SCALING")?;
    }
    if let Some(v) = section.get("OSC_SYNC") {
        op.osc_sync = parse_bool(v)?;
    }
    Ok(op)
}

fn parse_curve(v: &str) -> Result<ScalingCurve> {
    match v.to_uppercase().as_str() {
        "LINEAR_DOWN" | "LIN_DOWN" => Ok(ScalingCurve::LinearDown),
        "EXP_DOWN" => Ok(ScalingCurve::ExpDown),
        "EXP_UP" => Ok(ScalingCurve::ExpUp),
        "LINEAR_UP" | "LIN_UP" => Ok(ScalingCurve::LinearUp),
        other => Err(anyhow!("unknown scaling curve '{other}'")),
    }
}
