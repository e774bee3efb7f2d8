//! Device-facing types and collaborator traits
//!
//! The engine never talks to a driver directly. Physical devices are read
//! through [`DeviceStateProvider`], enumerated through [`DeviceEnumerator`],
//! and virtual devices are written through [`VirtualOutputSink`].
//!
//! All axis values crossing these traits are in the canonical -1.0..1.0
//! range. Providers whose hardware reports 0..1 (triggers, some throttles)
//! convert with `2v - 1` before handing values over.

pub mod gilrs_source;
pub mod sink;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DeviceError, SinkError};
use crate::profile::{DeviceId, InputSource};

pub use gilrs_source::GilrsDevices;
pub use sink::LogSink;

/// Hat value meaning "no direction"
pub const HAT_CENTERED: i32 = -1;

/// Half-width of a cardinal hat sector, in centidegrees (22.5°)
const HAT_SECTOR_HALF_WIDTH: i32 = 2250;

/// Cardinal hat direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HatDirection {
    Up,
    Right,
    Down,
    Left,
}

impl HatDirection {
    pub const ALL: [HatDirection; 4] = [Self::Up, Self::Right, Self::Down, Self::Left];

    /// Center of the sector, in centidegrees clockwise from up
    pub fn center(self) -> i32 {
        match self {
            Self::Up => 0,
            Self::Right => 9000,
            Self::Down => 18000,
            Self::Left => 27000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Right => "right",
            Self::Down => "down",
            Self::Left => "left",
        }
    }

    /// Bucket a hat angle (centidegrees) into a 45°-wide cardinal sector.
    ///
    /// Negative angles are centered; diagonals fall between sectors and
    /// return `None`.
    pub fn from_angle(angle: i32) -> Option<Self> {
        if angle < 0 {
            return None;
        }
        let angle = angle % 36000;
        Self::ALL.into_iter().find(|dir| {
            let diff = (angle - dir.center()).abs();
            diff.min(36000 - diff) <= HAT_SECTOR_HALF_WIDTH
        })
    }
}

impl fmt::Display for HatDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of one physical device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
    /// Hat angles in centidegrees, negative when centered
    pub hats: Vec<i32>,
}

impl DeviceState {
    pub fn new(axes: usize, buttons: usize, hats: usize) -> Self {
        Self {
            axes: vec![0.0; axes],
            buttons: vec![false; buttons],
            hats: vec![HAT_CENTERED; hats],
        }
    }

    /// Overwrite with `other`, reusing this snapshot's allocations
    pub fn copy_from(&mut self, other: &DeviceState) {
        self.axes.clone_from(&other.axes);
        self.buttons.clone_from(&other.buttons);
        self.hats.clone_from(&other.hats);
    }

    pub fn clear(&mut self) {
        self.axes.clear();
        self.buttons.clear();
        self.hats.clear();
    }
}

/// Descriptor produced by device enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
    /// Virtual device slot if this device is one of our virtual joysticks
    pub virtual_slot: Option<u32>,
}

/// Source of physical device snapshots, addressed by session-stable index
pub trait DeviceStateProvider {
    fn device_count(&self) -> usize;

    fn device_id(&self, index: usize) -> Option<&DeviceId>;

    /// Fill `out` with the current state of device `index`.
    ///
    /// Returns `false` if the device is gone; `out` is left untouched then.
    fn read_state(&self, index: usize, out: &mut DeviceState) -> bool;
}

/// Enumerates devices in the order an external consumer (the game) sees them
pub trait DeviceEnumerator {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, DeviceError>;
}

/// Destination for virtual device writes
pub trait VirtualOutputSink {
    /// `value` is in -1.0..1.0; the sink converts to device units
    fn set_axis(&mut self, device: u32, index: u32, value: f32) -> Result<(), SinkError>;

    fn set_button(&mut self, device: u32, index: u32, pressed: bool) -> Result<(), SinkError>;

    fn set_key(&mut self, key: &str, modifiers: &[String], pressed: bool) -> Result<(), SinkError>;
}

/// Device snapshots sampled once per tick.
///
/// Slots are kept between ticks so sampling does not allocate once the
/// device set is stable.
#[derive(Debug, Default)]
pub struct InputFrame {
    slots: Vec<(DeviceId, DeviceState)>,
    len: usize,
}

impl InputFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample every device the provider currently knows
    pub fn capture(&mut self, provider: &dyn DeviceStateProvider) {
        self.len = 0;
        for index in 0..provider.device_count() {
            let Some(id) = provider.device_id(index) else {
                continue;
            };
            if self.len == self.slots.len() {
                self.slots.push((id.clone(), DeviceState::default()));
            }
            let slot = &mut self.slots[self.len];
            if slot.0 != *id {
                slot.0 = id.clone();
            }
            if provider.read_state(index, &mut slot.1) {
                self.len += 1;
            }
        }
    }

    /// Insert or replace a device snapshot directly
    pub fn set(&mut self, id: DeviceId, state: DeviceState) {
        if let Some(slot) = self.slots[..self.len].iter_mut().find(|(d, _)| *d == id) {
            slot.1 = state;
            return;
        }
        if self.len == self.slots.len() {
            self.slots.push((id, state));
        } else {
            self.slots[self.len] = (id, state);
        }
        self.len += 1;
    }

    pub fn state(&self, id: &DeviceId) -> Option<&DeviceState> {
        self.slots[..self.len].iter().find(|(d, _)| d == id).map(|(_, s)| s)
    }

    /// Axis value of `source`, `None` if the device or axis is missing
    pub fn axis(&self, source: &InputSource) -> Option<f32> {
        self.state(&source.device)?.axes.get(source.index as usize).copied()
    }

    pub fn button(&self, source: &InputSource) -> bool {
        self.state(&source.device)
            .and_then(|s| s.buttons.get(source.index as usize).copied())
            .unwrap_or(false)
    }

    pub fn hat(&self, source: &InputSource) -> i32 {
        self.state(&source.device)
            .and_then(|s| s.hats.get(source.index as usize).copied())
            .unwrap_or(HAT_CENTERED)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hat_sectors() {
        assert_eq!(HatDirection::from_angle(HAT_CENTERED), None);
        assert_eq!(HatDirection::from_angle(0), Some(HatDirection::Up));
        assert_eq!(HatDirection::from_angle(35000), Some(HatDirection::Up));
        assert_eq!(HatDirection::from_angle(9000), Some(HatDirection::Right));
        assert_eq!(HatDirection::from_angle(18000), Some(HatDirection::Down));
        assert_eq!(HatDirection::from_angle(27000), Some(HatDirection::Left));

        // Sector edges at +/-22.5 degrees
        assert_eq!(HatDirection::from_angle(6750), Some(HatDirection::Right));
        assert_eq!(HatDirection::from_angle(2250), Some(HatDirection::Up));

        // Diagonals belong to no sector
        assert_eq!(HatDirection::from_angle(4500), None);
        assert_eq!(HatDirection::from_angle(31500), None);
    }

    #[test]
    fn test_copy_from_reuses_shape() {
        let mut a = DeviceState::new(2, 2, 1);
        let b = DeviceState { axes: vec![0.5, -0.5, 0.1], buttons: vec![true], hats: vec![9000] };
        a.copy_from(&b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_frame_lookup() {
        let mut frame = InputFrame::new();
        frame.set(DeviceId::new("stick"), DeviceState { axes: vec![0.25], buttons: vec![false, true], hats: vec![] });

        assert_eq!(frame.axis(&InputSource::axis("stick", 0)), Some(0.25));
        assert_eq!(frame.axis(&InputSource::axis("stick", 3)), None);
        assert_eq!(frame.axis(&InputSource::axis("pedals", 0)), None);
        assert!(frame.button(&InputSource::button("stick", 1)));
        assert_eq!(frame.hat(&InputSource::hat("stick", 0)), HAT_CENTERED);
        assert_eq!(frame.len(), 1);
    }
}
