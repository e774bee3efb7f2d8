//! Deadzone clipping and rescaling
//!
//! Input is the merged value in the canonical -1..1 range. Output range
//! depends on the mode:
//! - `Centered`: -1..1, the center band maps to exactly 0.0
//! - `EndOnly`: 0..1, throttle-style
//!
//! [`project_unit`] turns either form into the 0..1 domain the curves use.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::profile::{DeadzoneMode, DeadzoneSpec};

/// Spans narrower than this collapse to a hard switch
const SPAN_EPSILON: f32 = 1e-6;

/// Virtual axis indices that default to throttle-style handling
pub const VIRTUAL_AXIS_Z: u32 = 2;
pub const VIRTUAL_AXIS_SLIDER1: u32 = 6;
pub const VIRTUAL_AXIS_SLIDER2: u32 = 7;

/// Apply `spec` under the already-resolved `mode`
pub fn apply(v: f32, mode: DeadzoneMode, spec: &DeadzoneSpec) -> f32 {
    match mode {
        DeadzoneMode::EndOnly => end_only(v, spec.min, spec.max),
        DeadzoneMode::Centered => centered(v, spec),
    }
}

fn end_only(v: f32, min: f32, max: f32) -> f32 {
    let span = max - min;
    if span < SPAN_EPSILON {
        return if v >= max { 1.0 } else { 0.0 };
    }
    (v.clamp(min, max) - min) / span
}

fn centered(v: f32, spec: &DeadzoneSpec) -> f32 {
    let v = v.clamp(spec.min, spec.max);

    if v < spec.center_min {
        let span = spec.center_min - spec.min;
        if span < SPAN_EPSILON {
            return -1.0;
        }
        -((spec.center_min - v) / span)
    } else if v > spec.center_max {
        let span = spec.max - spec.center_max;
        if span < SPAN_EPSILON {
            return 1.0;
        }
        (v - spec.center_max) / span
    } else {
        0.0
    }
}

/// Map a deadzone result onto the curve's 0..1 domain
pub fn project_unit(d: f32, mode: DeadzoneMode) -> f32 {
    match mode {
        DeadzoneMode::Centered => (d + 1.0) * 0.5,
        DeadzoneMode::EndOnly => d,
    }
}

/// Per-output-axis default for mappings that leave the mode unset.
///
/// Physical axis order is device dependent, so the built-in table
/// (Z and both sliders throttle-style, everything else centered) can be
/// overridden per virtual axis index from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisModeDefaults {
    overrides: HashMap<u32, DeadzoneMode>,
}

impl AxisModeDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, axis_index: u32, mode: DeadzoneMode) -> Self {
        self.overrides.insert(axis_index, mode);
        self
    }

    /// Default mode for a virtual axis index
    pub fn default_for(&self, axis_index: u32) -> DeadzoneMode {
        if let Some(mode) = self.overrides.get(&axis_index) {
            return *mode;
        }
        match axis_index {
            VIRTUAL_AXIS_Z | VIRTUAL_AXIS_SLIDER1 | VIRTUAL_AXIS_SLIDER2 => DeadzoneMode::EndOnly,
            _ => DeadzoneMode::Centered,
        }
    }

    /// Effective mode: explicit configuration always wins
    pub fn resolve(&self, spec: &DeadzoneSpec, axis_index: u32) -> DeadzoneMode {
        spec.mode.unwrap_or_else(|| self.default_for(axis_index))
    }
}
