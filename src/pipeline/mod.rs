//! Per-tick axis signal pipeline
//!
//! merge → deadzone → project to 0..1 → curve → invert → scale to -1..1
//!
//! Mappings are compiled once (resolving the deadzone mode against the
//! per-axis defaults) so the tick path is a straight run of arithmetic.

pub mod buttons;
pub mod curve;
pub mod deadzone;
pub mod merge;

use crate::device::InputFrame;
use crate::profile::{AxisMapping, CurveDefinition, DeadzoneMode, DeadzoneSpec};

pub use buttons::{hat_pressed, DigitalOutput};
pub use deadzone::AxisModeDefaults;

/// Axis mapping with its deadzone mode resolved
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAxis {
    pub mapping: AxisMapping,
    pub mode: DeadzoneMode,
}

impl CompiledAxis {
    pub fn compile(mapping: AxisMapping, defaults: &AxisModeDefaults) -> Self {
        let mode = defaults.resolve(&mapping.deadzone, mapping.output.index);
        Self { mapping, mode }
    }

    /// Evaluate against this tick's samples.
    ///
    /// Inputs whose device or axis is missing from the frame are skipped;
    /// returns `None` when no input could be sampled at all.
    pub fn evaluate(&self, frame: &InputFrame, scratch: &mut Vec<f32>) -> Option<f32> {
        scratch.clear();
        scratch.extend(self.mapping.inputs.iter().filter_map(|src| frame.axis(src)));
        if scratch.is_empty() {
            return None;
        }
        let merged = merge::combine(self.mapping.merge_op, scratch);
        Some(transform(
            merged,
            self.mode,
            &self.mapping.deadzone,
            &self.mapping.curve,
            self.mapping.inverted,
        ))
    }
}

/// Evaluate one mapping against sampled inputs
pub fn evaluate_axis(mapping: &AxisMapping, defaults: &AxisModeDefaults, frame: &InputFrame) -> Option<f32> {
    let mode = defaults.resolve(&mapping.deadzone, mapping.output.index);
    let mut scratch = Vec::with_capacity(mapping.inputs.len());
    scratch.extend(mapping.inputs.iter().filter_map(|src| frame.axis(src)));
    if scratch.is_empty() {
        return None;
    }
    let merged = merge::combine(mapping.merge_op, &mut scratch);
    Some(transform(merged, mode, &mapping.deadzone, &mapping.curve, mapping.inverted))
}

/// Everything after the merge: deadzone, curve, inversion, output scaling
pub fn transform(
    merged: f32,
    mode: DeadzoneMode,
    deadzone: &DeadzoneSpec,
    curve: &CurveDefinition,
    inverted: bool,
) -> f32 {
    let zoned = deadzone::apply(merged, mode, deadzone);
    let unit = deadzone::project_unit(zoned, mode).clamp(0.0, 1.0);
    let shaped = curve::evaluate(curve, unit, inverted);
    shaped * 2.0 - 1.0
}
