//! Mapping profile data model
//!
//! A profile owns the axis, button and hat mappings that drive the virtual
//! devices. Profiles are validated when they are installed or edited so the
//! per-tick pipeline can trust the numbers it reads.

pub mod loader;
pub mod watcher;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::device::HatDirection;
use crate::error::ProfileError;
use crate::pipeline::AxisModeDefaults;

pub use loader::ProfileLoader;
pub use watcher::ProfileWatcher;

/// Opaque identity of a physical device (backend UUID or similar).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of physical control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Axis,
    Button,
    Hat,
}

/// One physical control on one device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSource {
    pub device: DeviceId,
    pub index: u32,
    pub kind: InputKind,
}

impl InputSource {
    pub fn axis(device: impl Into<String>, index: u32) -> Self {
        Self { device: DeviceId::new(device), index, kind: InputKind::Axis }
    }

    pub fn button(device: impl Into<String>, index: u32) -> Self {
        Self { device: DeviceId::new(device), index, kind: InputKind::Button }
    }

    pub fn hat(device: impl Into<String>, index: u32) -> Self {
        Self { device: DeviceId::new(device), index, kind: InputKind::Hat }
    }
}

/// Kind of virtual output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    VirtualAxis,
    VirtualButton,
    Keyboard,
}

/// Destination of a mapping.
///
/// Keyboard targets are identified by `key_name` + the set of `modifiers`;
/// `device`, `index` and modifier order are ignored for them, including by
/// `==` and `Hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputTarget {
    pub kind: OutputKind,
    #[serde(default)]
    pub device: u32,
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
}

impl OutputTarget {
    pub fn virtual_axis(device: u32, index: u32) -> Self {
        Self { kind: OutputKind::VirtualAxis, device, index, key_name: None, modifiers: Vec::new() }
    }

    pub fn virtual_button(device: u32, index: u32) -> Self {
        Self { kind: OutputKind::VirtualButton, device, index, key_name: None, modifiers: Vec::new() }
    }

    pub fn keyboard(key_name: impl Into<String>, mut modifiers: Vec<String>) -> Self {
        modifiers.sort();
        modifiers.dedup();
        Self {
            kind: OutputKind::Keyboard,
            device: 0,
            index: 0,
            key_name: Some(key_name.into()),
            modifiers,
        }
    }
}

/// What makes two outputs the same physical destination
#[derive(PartialEq, Eq, Hash)]
enum OutputIdentity<'a> {
    Device { kind: OutputKind, device: u32, index: u32 },
    Key { key_name: Option<&'a str>, modifiers: BTreeSet<&'a str> },
}

impl OutputTarget {
    fn identity(&self) -> OutputIdentity<'_> {
        match self.kind {
            OutputKind::Keyboard => OutputIdentity::Key {
                key_name: self.key_name.as_deref(),
                modifiers: self.modifiers.iter().map(String::as_str).collect(),
            },
            kind => OutputIdentity::Device { kind, device: self.device, index: self.index },
        }
    }
}

impl PartialEq for OutputTarget {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for OutputTarget {}

impl Hash for OutputTarget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OutputKind::VirtualAxis => write!(f, "vjoy{}.axis{}", self.device, self.index),
            OutputKind::VirtualButton => write!(f, "vjoy{}.button{}", self.device, self.index),
            OutputKind::Keyboard => {
                f.write_str("key ")?;
                for m in &self.modifiers {
                    write!(f, "{}+", m)?;
                }
                f.write_str(self.key_name.as_deref().unwrap_or("?"))
            }
        }
    }
}

/// Response curve family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    #[default]
    Linear,
    SCurve,
    Exponential,
    Custom,
}

/// Control point of a custom curve, both coordinates in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f32,
    pub y: f32,
}

impl CurvePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Curve definition; `points` is only read for [`CurveKind::Custom`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CurveDefinition {
    #[serde(default)]
    pub kind: CurveKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<CurvePoint>,
}

impl CurveDefinition {
    pub fn linear() -> Self {
        Self::default()
    }

    pub fn of(kind: CurveKind) -> Self {
        Self { kind, points: Vec::new() }
    }

    pub fn custom(points: Vec<CurvePoint>) -> Self {
        Self { kind: CurveKind::Custom, points }
    }
}

/// How the deadzone bounds are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadzoneMode {
    /// Stick-style: a center band maps to zero, both halves rescale
    Centered,
    /// Throttle-style: only the ends clip, the whole span rescales to 0..1
    EndOnly,
}

/// Deadzone boundaries in the canonical -1..1 input range.
///
/// `mode: None` lets the output axis index pick the interpretation
/// (see [`crate::pipeline::deadzone::AxisModeDefaults`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeadzoneSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DeadzoneMode>,
    #[serde(default = "default_min")]
    pub min: f32,
    #[serde(default)]
    pub center_min: f32,
    #[serde(default)]
    pub center_max: f32,
    #[serde(default = "default_max")]
    pub max: f32,
}

impl Default for DeadzoneSpec {
    fn default() -> Self {
        Self { mode: None, min: -1.0, center_min: 0.0, center_max: 0.0, max: 1.0 }
    }
}

impl DeadzoneSpec {
    pub fn centered(min: f32, center_min: f32, center_max: f32, max: f32) -> Self {
        Self { mode: Some(DeadzoneMode::Centered), min, center_min, center_max, max }
    }

    pub fn end_only(min: f32, max: f32) -> Self {
        Self { mode: Some(DeadzoneMode::EndOnly), min, center_min: 0.0, center_max: 0.0, max }
    }
}

fn default_min() -> f32 { -1.0 }
fn default_max() -> f32 { 1.0 }

/// Operator combining several physical axes into one output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOp {
    #[default]
    Average,
    Maximum,
    Minimum,
    Sum,
}

/// Virtual axis driven by zero or more physical axes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisMapping {
    pub output: OutputTarget,
    #[serde(default)]
    pub inputs: Vec<InputSource>,
    #[serde(default)]
    pub curve: CurveDefinition,
    #[serde(default)]
    pub deadzone: DeadzoneSpec,
    #[serde(default)]
    pub merge_op: MergeOp,
    #[serde(default)]
    pub inverted: bool,
}

impl AxisMapping {
    pub fn new(output: OutputTarget, inputs: Vec<InputSource>) -> Self {
        Self {
            output,
            inputs,
            curve: CurveDefinition::default(),
            deadzone: DeadzoneSpec::default(),
            merge_op: MergeOp::default(),
            inverted: false,
        }
    }
}

/// Behaviour of a digital output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonMode {
    #[default]
    Normal,
    Toggle,
    Pulse,
    HoldToActivate,
}

/// Virtual button or key driven by physical buttons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonMapping {
    pub output: OutputTarget,
    #[serde(default)]
    pub inputs: Vec<InputSource>,
    #[serde(default)]
    pub mode: ButtonMode,
    #[serde(default = "default_pulse_ms")]
    pub pulse_duration_ms: u64,
    #[serde(default = "default_hold_ms")]
    pub hold_duration_ms: u64,
}

impl ButtonMapping {
    pub fn new(output: OutputTarget, inputs: Vec<InputSource>, mode: ButtonMode) -> Self {
        Self {
            output,
            inputs,
            mode,
            pulse_duration_ms: default_pulse_ms(),
            hold_duration_ms: default_hold_ms(),
        }
    }
}

/// Virtual button or key driven by hat switch positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatMapping {
    pub output: OutputTarget,
    #[serde(default)]
    pub inputs: Vec<InputSource>,
    /// Direction that counts as pressed; `None` accepts any off-center position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<HatDirection>,
    #[serde(default)]
    pub mode: ButtonMode,
    #[serde(default = "default_pulse_ms")]
    pub pulse_duration_ms: u64,
    #[serde(default = "default_hold_ms")]
    pub hold_duration_ms: u64,
}

fn default_pulse_ms() -> u64 { 100 }
fn default_hold_ms() -> u64 { 500 }

/// Complete set of mappings for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub axes: Vec<AxisMapping>,
    #[serde(default)]
    pub buttons: Vec<ButtonMapping>,
    #[serde(default)]
    pub hats: Vec<HatMapping>,
}

impl MappingProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Parse a profile from YAML text and validate it against the
    /// built-in axis mode table
    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        Self::from_yaml_str_with(text, &AxisModeDefaults::new())
    }

    pub fn from_yaml_str_with(text: &str, defaults: &AxisModeDefaults) -> anyhow::Result<Self> {
        let profile: MappingProfile = serde_yaml::from_str(text)?;
        profile.validate_with(defaults)?;
        Ok(profile)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Insert or replace the axis mapping for `mapping.output`.
    ///
    /// Validates the mapping first; returns the replaced mapping if any.
    /// A center band under an unset mode is checked once the profile is
    /// validated against the axis mode table.
    pub fn upsert_axis(&mut self, mapping: AxisMapping) -> Result<Option<AxisMapping>, ProfileError> {
        validate_axis(&mapping, None)?;
        self.ensure_output_free(&mapping.output, Slot::Axis)?;
        Ok(replace_or_push(&mut self.axes, mapping, |m| &m.output))
    }

    pub fn upsert_button(&mut self, mapping: ButtonMapping) -> Result<Option<ButtonMapping>, ProfileError> {
        validate_digital(&mapping.output, &mapping.inputs, InputKind::Button, "button")?;
        self.ensure_output_free(&mapping.output, Slot::Button)?;
        Ok(replace_or_push(&mut self.buttons, mapping, |m| &m.output))
    }

    pub fn upsert_hat(&mut self, mapping: HatMapping) -> Result<Option<HatMapping>, ProfileError> {
        validate_digital(&mapping.output, &mapping.inputs, InputKind::Hat, "hat")?;
        self.ensure_output_free(&mapping.output, Slot::Hat)?;
        Ok(replace_or_push(&mut self.hats, mapping, |m| &m.output))
    }

    /// Remove whatever mapping drives `output`
    pub fn remove_output(&mut self, output: &OutputTarget) -> bool {
        let before = self.axes.len() + self.buttons.len() + self.hats.len();
        self.axes.retain(|m| &m.output != output);
        self.buttons.retain(|m| &m.output != output);
        self.hats.retain(|m| &m.output != output);
        before != self.axes.len() + self.buttons.len() + self.hats.len()
    }

    pub fn axis_for(&self, output: &OutputTarget) -> Option<&AxisMapping> {
        self.axes.iter().find(|m| &m.output == output)
    }

    pub fn axis_for_mut(&mut self, output: &OutputTarget) -> Option<&mut AxisMapping> {
        self.axes.iter_mut().find(|m| &m.output == output)
    }

    /// Validate every mapping and the one-mapping-per-output invariant,
    /// resolving unset deadzone modes with the built-in axis table
    pub fn validate(&self) -> Result<(), ProfileError> {
        self.validate_with(&AxisModeDefaults::new())
    }

    pub fn validate_with(&self, defaults: &AxisModeDefaults) -> Result<(), ProfileError> {
        let mut seen = HashSet::new();
        let outputs = self
            .axes
            .iter()
            .map(|m| &m.output)
            .chain(self.buttons.iter().map(|m| &m.output))
            .chain(self.hats.iter().map(|m| &m.output));
        for output in outputs {
            if !seen.insert(output) {
                return Err(ProfileError::DuplicateOutput { output: output.to_string() });
            }
        }

        for m in &self.axes {
            validate_axis(m, Some(defaults))?;
        }
        for m in &self.buttons {
            validate_digital(&m.output, &m.inputs, InputKind::Button, "button")?;
        }
        for m in &self.hats {
            validate_digital(&m.output, &m.inputs, InputKind::Hat, "hat")?;
        }
        Ok(())
    }

    /// An output may live in only one of the three lists
    fn ensure_output_free(&self, output: &OutputTarget, slot: Slot) -> Result<(), ProfileError> {
        let taken = (slot != Slot::Axis && self.axes.iter().any(|m| &m.output == output))
            || (slot != Slot::Button && self.buttons.iter().any(|m| &m.output == output))
            || (slot != Slot::Hat && self.hats.iter().any(|m| &m.output == output));
        if taken {
            return Err(ProfileError::DuplicateOutput { output: output.to_string() });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Axis,
    Button,
    Hat,
}

fn replace_or_push<T>(list: &mut Vec<T>, item: T, key: impl Fn(&T) -> &OutputTarget) -> Option<T> {
    match list.iter().position(|m| key(m) == key(&item)) {
        Some(idx) => Some(std::mem::replace(&mut list[idx], item)),
        None => {
            list.push(item);
            None
        }
    }
}

/// `defaults: None` skips the center band check for an unset mode
fn validate_axis(m: &AxisMapping, defaults: Option<&AxisModeDefaults>) -> Result<(), ProfileError> {
    let output = || m.output.to_string();

    if m.output.kind != OutputKind::VirtualAxis {
        return Err(ProfileError::WrongOutputKind { output: output(), mapping: "axis" });
    }
    check_inputs(&m.output, &m.inputs, InputKind::Axis)?;

    let dz = &m.deadzone;
    if ![dz.min, dz.center_min, dz.center_max, dz.max].iter().all(|v| v.is_finite()) {
        return Err(ProfileError::NonFinite { output: output() });
    }
    if dz.min > dz.max {
        return Err(ProfileError::InvertedBounds { output: output(), min: dz.min, max: dz.max });
    }
    let centered = match (dz.mode, defaults) {
        (Some(mode), _) => mode == DeadzoneMode::Centered,
        (None, Some(defaults)) => defaults.default_for(m.output.index) == DeadzoneMode::Centered,
        (None, None) => false,
    };
    if centered
        && !(dz.min <= dz.center_min && dz.center_min <= dz.center_max && dz.center_max <= dz.max)
    {
        return Err(ProfileError::InvertedCenter {
            output: output(),
            min: dz.min,
            center_min: dz.center_min,
            center_max: dz.center_max,
            max: dz.max,
        });
    }

    if m.curve.kind == CurveKind::Custom {
        let bad = |reason: &str| ProfileError::BadCurve { output: output(), reason: reason.to_string() };
        for p in &m.curve.points {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(ProfileError::NonFinite { output: output() });
            }
            if !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y) {
                return Err(bad("control points must lie in [0, 1]"));
            }
        }
        if m.curve.points.windows(2).any(|w| w[1].x < w[0].x) {
            return Err(bad("control points must be sorted by x"));
        }
    }
    Ok(())
}

fn validate_digital(
    output: &OutputTarget,
    inputs: &[InputSource],
    expected: InputKind,
    mapping: &'static str,
) -> Result<(), ProfileError> {
    match output.kind {
        OutputKind::VirtualButton => {}
        OutputKind::Keyboard if output.key_name.as_deref().is_some_and(|k| !k.is_empty()) => {}
        _ => return Err(ProfileError::WrongOutputKind { output: output.to_string(), mapping }),
    }
    check_inputs(output, inputs, expected)
}

fn check_inputs(output: &OutputTarget, inputs: &[InputSource], expected: InputKind) -> Result<(), ProfileError> {
    match inputs.iter().position(|i| i.kind != expected) {
        Some(index) => Err(ProfileError::WrongInputKind {
            output: output.to_string(),
            index,
            found: inputs[index].kind,
            expected,
        }),
        None => Ok(()),
    }
}
