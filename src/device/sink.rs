//! Output sink that records virtual device writes in the log
//!
//! Used by the headless runner when no virtual joystick driver is attached.
//! Like a real device, it only reports values that changed.

use std::collections::HashMap;
use tracing::{debug, info};

use super::VirtualOutputSink;
use crate::error::SinkError;

/// Change-suppressing sink that logs writes
#[derive(Debug, Default)]
pub struct LogSink {
    axes: HashMap<(u32, u32), f32>,
    buttons: HashMap<(u32, u32), bool>,
    keys: HashMap<String, bool>,
    writes: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value written to an axis
    pub fn axis(&self, device: u32, index: u32) -> Option<f32> {
        self.axes.get(&(device, index)).copied()
    }

    pub fn button(&self, device: u32, index: u32) -> Option<bool> {
        self.buttons.get(&(device, index)).copied()
    }

    /// Last state of a key chord such as `lalt+f`
    pub fn key(&self, chord: &str) -> Option<bool> {
        self.keys.get(chord).copied()
    }

    /// Number of writes that actually changed a value
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl VirtualOutputSink for LogSink {
    fn set_axis(&mut self, device: u32, index: u32, value: f32) -> Result<(), SinkError> {
        let clamped = value.clamp(-1.0, 1.0);
        if self.axes.get(&(device, index)) == Some(&clamped) {
            return Ok(());
        }
        self.axes.insert((device, index), clamped);
        self.writes += 1;
        debug!("vjoy{} axis{} = {:+.4}", device, index, clamped);
        Ok(())
    }

    fn set_button(&mut self, device: u32, index: u32, pressed: bool) -> Result<(), SinkError> {
        if self.buttons.get(&(device, index)) == Some(&pressed) {
            return Ok(());
        }
        self.buttons.insert((device, index), pressed);
        self.writes += 1;
        info!("vjoy{} button{} {}", device, index, if pressed { "down" } else { "up" });
        Ok(())
    }

    fn set_key(&mut self, key: &str, modifiers: &[String], pressed: bool) -> Result<(), SinkError> {
        let mut chord = modifiers.join("+");
        if !chord.is_empty() {
            chord.push('+');
        }
        chord.push_str(key);

        if self.keys.get(&chord) == Some(&pressed) {
            return Ok(());
        }
        info!("key {} {}", chord, if pressed { "down" } else { "up" });
        self.keys.insert(chord, pressed);
        self.writes += 1;
        Ok(())
    }
}
