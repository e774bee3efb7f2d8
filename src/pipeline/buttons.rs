//! Digital output modes for button and hat mappings

use std::time::{Duration, Instant};

use crate::device::HatDirection;
use crate::profile::{ButtonMapping, ButtonMode, HatMapping};

/// Per-mapping state machine turning a pressed/released input into output
#[derive(Debug, Clone)]
pub struct DigitalOutput {
    mode: ButtonMode,
    pulse: Duration,
    hold: Duration,
    last_input: bool,
    latched: bool,
    pulse_until: Option<Instant>,
    held_since: Option<Instant>,
}

impl DigitalOutput {
    pub fn new(mode: ButtonMode, pulse_ms: u64, hold_ms: u64) -> Self {
        Self {
            mode,
            pulse: Duration::from_millis(pulse_ms),
            hold: Duration::from_millis(hold_ms),
            last_input: false,
            latched: false,
            pulse_until: None,
            held_since: None,
        }
    }

    pub fn for_button(mapping: &ButtonMapping) -> Self {
        Self::new(mapping.mode, mapping.pulse_duration_ms, mapping.hold_duration_ms)
    }

    pub fn for_hat(mapping: &HatMapping) -> Self {
        Self::new(mapping.mode, mapping.pulse_duration_ms, mapping.hold_duration_ms)
    }

    /// Advance one tick with the combined input state
    pub fn step(&mut self, input: bool, now: Instant) -> bool {
        let rising = input && !self.last_input;
        self.last_input = input;

        match self.mode {
            ButtonMode::Normal => input,
            ButtonMode::Toggle => {
                if rising {
                    self.latched = !self.latched;
                }
                self.latched
            }
            ButtonMode::Pulse => {
                if rising {
                    self.pulse_until = Some(now + self.pulse);
                }
                match self.pulse_until {
                    Some(until) if now < until => true,
                    Some(_) => {
                        self.pulse_until = None;
                        false
                    }
                    None => false,
                }
            }
            ButtonMode::HoldToActivate => {
                if !input {
                    self.held_since = None;
                    return false;
                }
                let since = *self.held_since.get_or_insert(now);
                now.duration_since(since) >= self.hold
            }
        }
    }
}

/// Whether a hat angle counts as pressed for `direction`
pub fn hat_pressed(angle: i32, direction: Option<HatDirection>) -> bool {
    match direction {
        None => angle >= 0,
        Some(dir) => HatDirection::from_angle(angle) == Some(dir),
    }
}
