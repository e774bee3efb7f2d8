//! Physical device provider backed by GilRs
//!
//! Exposes every connected gamepad/joystick as a [`DeviceState`] snapshot.
//! Device indices are stable for the session: a device that disconnects
//! keeps its index (and reads as missing) so reconnects land in the same
//! slot.

use gilrs::{Axis, Button, GamepadId, Gilrs};
use tracing::{debug, info, warn};

use super::{DeviceDescriptor, DeviceEnumerator, DeviceState, DeviceStateProvider, HAT_CENTERED};
use crate::error::DeviceError;
use crate::profile::DeviceId;

/// Axes in the order they appear in a snapshot: x, y, z, rotx, roty, rotz
const AXES: [Axis; 6] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::LeftZ,
    Axis::RightStickX,
    Axis::RightStickY,
    Axis::RightZ,
];

/// Analog triggers reported 0..1 by gilrs, exposed as slider axes
const TRIGGER_AXES: [Button; 2] = [Button::LeftTrigger2, Button::RightTrigger2];

const BUTTONS: [Button; 13] = [
    Button::South,
    Button::East,
    Button::North,
    Button::West,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
];

struct TrackedDevice {
    gilrs_id: GamepadId,
    id: DeviceId,
}

/// GilRs-backed [`DeviceStateProvider`] and [`DeviceEnumerator`]
pub struct GilrsDevices {
    gilrs: Gilrs,
    devices: Vec<TrackedDevice>,
}

impl GilrsDevices {
    pub fn new() -> Result<Self, DeviceError> {
        let gilrs = Gilrs::new().map_err(|e| DeviceError::Unavailable(format!("{:?}", e)))?;
        info!("GilRs initialized");

        let mut devices = Self { gilrs, devices: Vec::new() };
        devices.track_connected();
        Ok(devices)
    }

    /// Drain pending backend events and pick up newly connected devices.
    ///
    /// Call once per tick before reading state.
    pub fn refresh(&mut self) {
        let mut connection_changed = false;
        while let Some(event) = self.gilrs.next_event() {
            if matches!(event.event, gilrs::EventType::Connected | gilrs::EventType::Disconnected) {
                connection_changed = true;
            }
        }
        if connection_changed {
            self.track_connected();
        }
    }

    fn track_connected(&mut self) {
        let connected: Vec<(GamepadId, String, String)> = self
            .gilrs
            .gamepads()
            .map(|(id, pad)| (id, uuid_string(pad.uuid()), pad.name().to_string()))
            .collect();

        for (gilrs_id, uuid, name) in connected {
            if self.devices.iter().any(|d| d.gilrs_id == gilrs_id) {
                continue;
            }
            // Identical hardware shares a UUID; disambiguate by occurrence
            let twins = self.devices.iter().filter(|d| d.id.0.starts_with(&uuid)).count();
            let id = if twins == 0 {
                DeviceId::new(uuid)
            } else {
                DeviceId::new(format!("{}#{}", uuid, twins + 1))
            };
            info!("Tracking device {} \"{}\" at index {}", id, name, self.devices.len());
            self.devices.push(TrackedDevice { gilrs_id, id });
        }
    }
}

impl DeviceStateProvider for GilrsDevices {
    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device_id(&self, index: usize) -> Option<&DeviceId> {
        self.devices.get(index).map(|d| &d.id)
    }

    fn read_state(&self, index: usize, out: &mut DeviceState) -> bool {
        let Some(tracked) = self.devices.get(index) else {
            return false;
        };
        let Some(pad) = self.gilrs.connected_gamepad(tracked.gilrs_id) else {
            return false;
        };

        out.clear();
        out.axes.extend(AXES.iter().map(|&axis| pad.value(axis)));
        out.axes.extend(TRIGGER_AXES.iter().map(|&button| {
            // Canonical range is -1..1
            let v = pad.button_data(button).map(|d| d.value()).unwrap_or(0.0);
            v * 2.0 - 1.0
        }));
        out.buttons.extend(BUTTONS.iter().map(|&button| pad.is_pressed(button)));
        out.hats.push(dpad_angle(
            pad.is_pressed(Button::DPadUp),
            pad.is_pressed(Button::DPadRight),
            pad.is_pressed(Button::DPadDown),
            pad.is_pressed(Button::DPadLeft),
        ));
        true
    }
}

impl DeviceEnumerator for GilrsDevices {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        let named = self
            .devices
            .iter()
            .filter_map(|tracked| {
                let pad = self.gilrs.connected_gamepad(tracked.gilrs_id)?;
                Some((tracked.id.clone(), pad.name().to_string()))
            })
            .collect::<Vec<_>>();

        let names = named.iter().map(|(_, name)| name.as_str()).collect::<Vec<_>>();
        let slots = virtual_slots(&names);
        let virtual_count = slots.iter().flatten().count();

        let descriptors = named
            .into_iter()
            .zip(slots)
            .map(|((id, name), virtual_slot)| DeviceDescriptor { id, name, virtual_slot })
            .collect::<Vec<_>>();

        if descriptors.is_empty() {
            warn!("No connected devices reported by GilRs");
        } else {
            debug!("Enumerated {} devices ({} virtual)", descriptors.len(), virtual_count);
        }
        Ok(descriptors)
    }
}

/// Virtual slot for each device name, `None` for physical devices.
///
/// GilRs exposes neither the vJoy device id nor a distinct product id, and
/// every vJoy device reports the same name unless renamed. A trailing
/// number in the name (`vJoy Device 3`) is taken as the slot; otherwise
/// slots are handed out in enumeration order, skipping numbered ones. With
/// unnumbered names, disabling vJoy 1 makes vJoy 2 appear as slot 1, so
/// auto-detection is only reliable when every configured vJoy device is
/// enabled.
fn virtual_slots(names: &[&str]) -> Vec<Option<u32>> {
    let numbered = names
        .iter()
        .map(|name| {
            if !name.to_lowercase().contains("vjoy") {
                return None;
            }
            let digits = name.trim_end().rsplit(|c: char| !c.is_ascii_digit()).next()?;
            digits.parse::<u32>().ok().filter(|&slot| slot > 0)
        })
        .collect::<Vec<_>>();

    let mut next = 0u32;
    names
        .iter()
        .zip(&numbered)
        .map(|(name, explicit)| {
            if !name.to_lowercase().contains("vjoy") {
                return None;
            }
            if explicit.is_some() {
                return *explicit;
            }
            loop {
                next += 1;
                if !numbered.contains(&Some(next)) {
                    return Some(next);
                }
            }
        })
        .collect()
}

fn uuid_string(uuid: [u8; 16]) -> String {
    uuid.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Convert D-pad buttons into a hat angle in centidegrees
fn dpad_angle(up: bool, right: bool, down: bool, left: bool) -> i32 {
    match (up, right, down, left) {
        (true, false, false, false) => 0,
        (true, true, false, false) => 4500,
        (false, true, false, false) => 9000,
        (false, true, true, false) => 13500,
        (false, false, true, false) => 18000,
        (false, false, true, true) => 22500,
        (false, false, false, true) => 27000,
        (true, false, false, true) => 31500,
        _ => HAT_CENTERED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dpad_angle() {
        assert_eq!(dpad_angle(false, false, false, false), HAT_CENTERED);
        assert_eq!(dpad_angle(true, false, false, false), 0);
        assert_eq!(dpad_angle(false, true, true, false), 13500);
        assert_eq!(dpad_angle(false, false, false, true), 27000);
        // Opposing directions cancel out
        assert_eq!(dpad_angle(true, false, true, false), HAT_CENTERED);
    }

    #[test]
    fn test_virtual_slots_follow_enumeration_order() {
        let names = ["vJoy Device", "Throttle", "vJoy Device", "Stick"];
        assert_eq!(virtual_slots(&names), vec![Some(1), None, Some(2), None]);
    }

    #[test]
    fn test_virtual_slots_use_number_in_name() {
        let names = ["vJoy Device 2", "vJoy Device", "Stick 3", "vJoy Device 1", "vJoy Device"];
        assert_eq!(virtual_slots(&names), vec![Some(2), Some(3), None, Some(1), Some(4)]);
    }

    #[test]
    fn test_uuid_string() {
        let mut uuid = [0u8; 16];
        uuid[0] = 0xab;
        uuid[15] = 0x01;
        let s = uuid_string(uuid);
        assert_eq!(s.len(), 32);
        assert!(s.starts_with("ab"));
        assert!(s.ends_with("01"));
    }
}
