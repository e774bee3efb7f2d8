//! Input change detection for "press the control you want to bind"
//!
//! One [`InputChangeDetector`] per engine session. A listening session goes
//! `Idle → BaselineCapturing → Stabilizing → Armed` and ends in `Committed`,
//! `Cancelled` or `TimedOut`. All transitions happen inside
//! [`InputChangeDetector::poll`] (once per tick) or synchronously in
//! [`InputChangeDetector::cancel_listening`]; there are no timers.

pub mod keys;

use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::device::{DeviceState, DeviceStateProvider, HatDirection};
use crate::profile::{DeviceId, InputKind, InputSource};

pub use keys::{EventQueueKeys, KeyCode, KeyStateSource, NoKeys};

/// Axis names for the first eight axes, DirectInput order
const AXIS_NAMES: [&str; 8] = ["x", "y", "z", "rotx", "roty", "rotz", "slider1", "slider2"];

pub fn axis_name(index: usize) -> String {
    match AXIS_NAMES.get(index) {
        Some(name) => (*name).to_string(),
        None => format!("axis{}", index + 1),
    }
}

pub fn button_name(index: usize) -> String {
    format!("button{}", index + 1)
}

pub fn hat_name(index: usize, direction: HatDirection) -> String {
    format!("hat{}_{}", index + 1, direction)
}

/// Detector tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    /// Minimum |current - baseline| on the -1..1 scale to count as a deflection
    pub axis_threshold: f32,
    pub timeout: Duration,
    /// Polls discarded after the baseline is captured
    pub stabilize_ticks: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            axis_threshold: 0.15,
            timeout: Duration::from_millis(5000),
            stabilize_ticks: 3,
        }
    }
}

/// What kind of input a listening session waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenTarget {
    Joystick,
    Keyboard,
    Mouse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    BaselineCapturing,
    Stabilizing { discarded: u32 },
    Armed { since: Instant },
    Committed,
    Cancelled,
    TimedOut,
}

impl DetectorState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::BaselineCapturing | Self::Stabilizing { .. } | Self::Armed { .. }
        )
    }
}

/// Where a detected input came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectedDevice {
    /// Physical device at provider index `index`
    Joystick { id: DeviceId, index: usize },
    Keyboard,
    Mouse,
}

/// Input reported by a listening session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedInput {
    pub device: DetectedDevice,
    pub kind: InputKind,
    /// Axis/button/hat ordinal, or the key code for keyboard and mouse
    pub index: u32,
    pub direction: Option<HatDirection>,
    /// Symbolic name (`button3`, `rotz`, `hat1_up`, `f`, `mouse1`)
    pub name: String,
    /// Modifiers held at detection time (keyboard and mouse only)
    pub modifiers: Vec<String>,
}

impl DetectedInput {
    /// Physical source for profile mappings (joystick detections only)
    pub fn source(&self) -> Option<InputSource> {
        match &self.device {
            DetectedDevice::Joystick { id, .. } => Some(InputSource {
                device: id.clone(),
                index: self.index,
                kind: self.kind,
            }),
            _ => None,
        }
    }
}

/// Result of one [`InputChangeDetector::poll`]
#[derive(Debug, Clone, PartialEq)]
pub enum ListenOutcome {
    /// No session is running
    Idle,
    /// Still waiting
    Pending,
    Detected(DetectedInput),
    Cancelled,
    TimedOut,
}

impl ListenOutcome {
    pub fn detected(self) -> Option<DetectedInput> {
        match self {
            Self::Detected(input) => Some(input),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Detected(_) | Self::Cancelled | Self::TimedOut)
    }
}

/// Baseline slot for the device at one provider index
#[derive(Debug, Default)]
struct BaselineSlot {
    id: Option<DeviceId>,
    state: DeviceState,
}

#[derive(Debug)]
pub struct InputChangeDetector {
    settings: DetectorSettings,
    state: DetectorState,
    target: ListenTarget,
    session: u64,
    /// Indexed by provider device index; kept across sessions so later
    /// sessions reuse the allocations
    baseline: Vec<BaselineSlot>,
    baseline_len: usize,
    current: DeviceState,
}

impl InputChangeDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            state: DetectorState::Idle,
            target: ListenTarget::Joystick,
            session: 0,
            baseline: Vec::new(),
            baseline_len: 0,
            current: DeviceState::default(),
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: DetectorSettings) {
        self.settings = settings;
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn target(&self) -> ListenTarget {
        self.target
    }

    /// Id of the most recent session
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_listening(&self) -> bool {
        self.state.is_active()
    }

    /// Start a new session, cancelling any session still running.
    ///
    /// The baseline is captured on the next poll. Returns the session id.
    pub fn begin_listening(&mut self, target: ListenTarget) -> u64 {
        if self.state.is_active() {
            debug!("Listening session {} superseded", self.session);
            self.discard_baseline();
        }
        self.session += 1;
        self.target = target;
        self.state = DetectorState::BaselineCapturing;
        info!("Listening for {:?} input (session {})", target, self.session);
        self.session
    }

    /// Cancel the running session. Returns `false` if nothing was running.
    pub fn cancel_listening(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }
        info!("Listening session {} cancelled", self.session);
        self.finish(DetectorState::Cancelled);
        true
    }

    /// Advance the running session by one tick
    pub fn poll(
        &mut self,
        devices: &dyn DeviceStateProvider,
        keys: &mut dyn KeyStateSource,
        now: Instant,
    ) -> ListenOutcome {
        match self.state {
            DetectorState::BaselineCapturing => {
                if self.target == ListenTarget::Joystick {
                    self.capture_baseline(devices);
                }
                keys.clear_edge_state();
                self.state = if self.settings.stabilize_ticks == 0 {
                    DetectorState::Armed { since: now }
                } else {
                    DetectorState::Stabilizing { discarded: 0 }
                };
                trace!("Baseline captured for {} device(s)", self.baseline_len);
                return ListenOutcome::Pending;
            }
            DetectorState::Stabilizing { .. } | DetectorState::Armed { .. } => {}
            _ => return ListenOutcome::Idle,
        }

        if keys.is_pressed(KeyCode::ESCAPE) {
            info!("Listening session {} cancelled by Escape", self.session);
            self.finish(DetectorState::Cancelled);
            return ListenOutcome::Cancelled;
        }

        let since = match self.state {
            DetectorState::Stabilizing { discarded } => {
                let discarded = discarded + 1;
                self.state = if discarded >= self.settings.stabilize_ticks {
                    keys.clear_edge_state();
                    DetectorState::Armed { since: now }
                } else {
                    DetectorState::Stabilizing { discarded }
                };
                return ListenOutcome::Pending;
            }
            DetectorState::Armed { since } => since,
            _ => return ListenOutcome::Idle,
        };

        if now.saturating_duration_since(since) > self.settings.timeout {
            info!("Listening session {} timed out", self.session);
            self.finish(DetectorState::TimedOut);
            return ListenOutcome::TimedOut;
        }

        let detected = match self.target {
            ListenTarget::Joystick => self.scan_devices(devices),
            ListenTarget::Keyboard => scan_keys(keys, KeyCode::keyboard_scan(), DetectedDevice::Keyboard),
            ListenTarget::Mouse => scan_keys(keys, KeyCode::MOUSE_BUTTONS.into_iter(), DetectedDevice::Mouse),
        };

        match detected {
            Some(input) => {
                info!("Detected {} (session {})", input.name, self.session);
                self.finish(DetectorState::Committed);
                ListenOutcome::Detected(input)
            }
            None => ListenOutcome::Pending,
        }
    }

    fn finish(&mut self, state: DetectorState) {
        self.state = state;
        self.discard_baseline();
    }

    fn discard_baseline(&mut self) {
        for slot in &mut self.baseline[..self.baseline_len] {
            slot.id = None;
            slot.state.clear();
        }
        self.baseline_len = 0;
    }

    fn capture_baseline(&mut self, devices: &dyn DeviceStateProvider) {
        let count = devices.device_count();
        if self.baseline.len() < count {
            self.baseline.resize_with(count, BaselineSlot::default);
        }
        for index in 0..count {
            let slot = &mut self.baseline[index];
            slot.id = None;
            if let Some(id) = devices.device_id(index) {
                if devices.read_state(index, &mut slot.state) {
                    slot.id = Some(id.clone());
                }
            }
        }
        self.baseline_len = count;
    }

    /// Devices in provider order; per device buttons, then axes, then hats
    fn scan_devices(&mut self, devices: &dyn DeviceStateProvider) -> Option<DetectedInput> {
        let count = devices.device_count().min(self.baseline_len);
        for index in 0..count {
            let slot = &self.baseline[index];
            let (Some(base_id), Some(id)) = (slot.id.as_ref(), devices.device_id(index)) else {
                continue;
            };
            // A different device now sits at this index: no baseline for it
            if base_id != id {
                continue;
            }
            if !devices.read_state(index, &mut self.current) {
                continue;
            }
            if let Some(change) = first_change(&slot.state, &self.current, self.settings.axis_threshold) {
                return Some(change.into_detected(id.clone(), index));
            }
        }
        None
    }
}

impl Default for InputChangeDetector {
    fn default() -> Self {
        Self::new(DetectorSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Change {
    Button(usize),
    Axis(usize),
    Hat(usize, HatDirection),
}

impl Change {
    fn into_detected(self, id: DeviceId, device_index: usize) -> DetectedInput {
        let (kind, index, direction, name) = match self {
            Change::Button(i) => (InputKind::Button, i, None, button_name(i)),
            Change::Axis(i) => (InputKind::Axis, i, None, axis_name(i)),
            Change::Hat(i, dir) => (InputKind::Hat, i, Some(dir), hat_name(i, dir)),
        };
        DetectedInput {
            device: DetectedDevice::Joystick { id, index: device_index },
            kind,
            index: index as u32,
            direction,
            name,
            modifiers: Vec::new(),
        }
    }
}

fn first_change(base: &DeviceState, current: &DeviceState, threshold: f32) -> Option<Change> {
    let pressed = current
        .buttons
        .iter()
        .zip(&base.buttons)
        .position(|(now, before)| *now && !*before);
    if let Some(i) = pressed {
        return Some(Change::Button(i));
    }

    let deflected = current
        .axes
        .iter()
        .zip(&base.axes)
        .position(|(now, before)| (now - before).abs() > threshold);
    if let Some(i) = deflected {
        return Some(Change::Axis(i));
    }

    current
        .hats
        .iter()
        .zip(&base.hats)
        .enumerate()
        .find_map(|(i, (now, before))| {
            if *before >= 0 {
                return None;
            }
            HatDirection::from_angle(*now).map(|dir| Change::Hat(i, dir))
        })
}

fn scan_keys(
    keys: &mut dyn KeyStateSource,
    codes: impl Iterator<Item = KeyCode>,
    device: DetectedDevice,
) -> Option<DetectedInput> {
    // Consume every edge this tick so leftovers don't leak into later sessions
    let mut hit = None;
    for code in codes {
        if keys.is_pressed(code) && hit.is_none() {
            hit = Some(code);
        }
    }
    let code = hit?;
    let name = code.name()?;
    Some(DetectedInput {
        device,
        kind: InputKind::Button,
        index: code.0,
        direction: None,
        name,
        modifiers: keys::held_modifiers(keys),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted provider: one device per entry, mutable between polls
    struct FakeDevices {
        ids: Vec<DeviceId>,
        states: Vec<DeviceState>,
    }

    impl FakeDevices {
        fn one(state: DeviceState) -> Self {
            Self { ids: vec![DeviceId::new("stick")], states: vec![state] }
        }
    }

    impl DeviceStateProvider for FakeDevices {
        fn device_count(&self) -> usize {
            self.ids.len()
        }

        fn device_id(&self, index: usize) -> Option<&DeviceId> {
            self.ids.get(index)
        }

        fn read_state(&self, index: usize, out: &mut DeviceState) -> bool {
            match self.states.get(index) {
                Some(state) => {
                    out.copy_from(state);
                    true
                }
                None => false,
            }
        }
    }

    fn ms(base: Instant, n: u64) -> Instant {
        base + Duration::from_millis(n)
    }

    /// Runs the baseline and stabilize polls; returns the time armed
    fn arm(det: &mut InputChangeDetector, devices: &FakeDevices, keys: &mut dyn KeyStateSource, t0: Instant) -> Instant {
        for i in 0..=det.settings().stabilize_ticks as u64 {
            assert_eq!(det.poll(devices, keys, ms(t0, i * 10)), ListenOutcome::Pending);
        }
        let armed_at = ms(t0, det.settings().stabilize_ticks as u64 * 10);
        assert_eq!(det.state(), DetectorState::Armed { since: armed_at });
        armed_at
    }

    #[test]
    fn test_idle_poll() {
        let mut det = InputChangeDetector::default();
        let devices = FakeDevices::one(DeviceState::new(2, 2, 1));
        assert_eq!(det.poll(&devices, &mut NoKeys, Instant::now()), ListenOutcome::Idle);
    }

    #[test]
    fn test_button_press_detected() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let mut devices = FakeDevices::one(DeviceState::new(2, 4, 1));

        det.begin_listening(ListenTarget::Joystick);
        let armed = arm(&mut det, &devices, &mut NoKeys, t0);

        devices.states[0].buttons[2] = true;
        let input = det.poll(&devices, &mut NoKeys, ms(armed, 10)).detected().unwrap();
        assert_eq!(input.name, "button3");
        assert_eq!(input.kind, InputKind::Button);
        assert_eq!(input.index, 2);
        assert_eq!(input.source(), Some(InputSource::button("stick", 2)));
        assert_eq!(det.state(), DetectorState::Committed);
        assert!(!det.is_listening());
    }

    #[test]
    fn test_stabilizing_ignores_changes() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let mut devices = FakeDevices::one(DeviceState::new(2, 2, 0));

        det.begin_listening(ListenTarget::Joystick);
        assert_eq!(det.poll(&devices, &mut NoKeys, t0), ListenOutcome::Pending);
        devices.states[0].buttons[0] = true;
        assert_eq!(det.poll(&devices, &mut NoKeys, ms(t0, 10)), ListenOutcome::Pending);
        assert_eq!(det.state(), DetectorState::Stabilizing { discarded: 1 });
    }

    #[test]
    fn test_button_beats_axis() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let mut devices = FakeDevices::one(DeviceState::new(3, 2, 1));

        det.begin_listening(ListenTarget::Joystick);
        let armed = arm(&mut det, &devices, &mut NoKeys, t0);

        devices.states[0].axes[0] = 0.9;
        devices.states[0].buttons[1] = true;
        let input = det.poll(&devices, &mut NoKeys, ms(armed, 10)).detected().unwrap();
        assert_eq!(input.name, "button2");
    }

    #[test]
    fn test_axis_threshold() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let mut devices = FakeDevices::one(DeviceState::new(8, 0, 0));
        devices.states[0].axes[5] = -0.2;

        det.begin_listening(ListenTarget::Joystick);
        let armed = arm(&mut det, &devices, &mut NoKeys, t0);

        devices.states[0].axes[5] = -0.3;
        assert_eq!(det.poll(&devices, &mut NoKeys, ms(armed, 10)), ListenOutcome::Pending);

        devices.states[0].axes[5] = -0.4;
        let input = det.poll(&devices, &mut NoKeys, ms(armed, 20)).detected().unwrap();
        assert_eq!(input.name, "rotz");
        assert_eq!(input.kind, InputKind::Axis);
    }

    #[test]
    fn test_hat_direction() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let mut devices = FakeDevices::one(DeviceState::new(0, 0, 2));

        det.begin_listening(ListenTarget::Joystick);
        let armed = arm(&mut det, &devices, &mut NoKeys, t0);

        // Diagonal is not reported
        devices.states[0].hats[1] = 4500;
        assert_eq!(det.poll(&devices, &mut NoKeys, ms(armed, 10)), ListenOutcome::Pending);

        devices.states[0].hats[1] = 27000;
        let input = det.poll(&devices, &mut NoKeys, ms(armed, 20)).detected().unwrap();
        assert_eq!(input.name, "hat2_left");
        assert_eq!(input.direction, Some(HatDirection::Left));
    }

    #[test]
    fn test_held_at_baseline_is_ignored() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let mut devices = FakeDevices::one(DeviceState::new(0, 2, 1));
        devices.states[0].buttons[0] = true;
        devices.states[0].hats[0] = 0;

        det.begin_listening(ListenTarget::Joystick);
        let armed = arm(&mut det, &devices, &mut NoKeys, t0);
        devices.states[0].hats[0] = 9000;
        assert_eq!(det.poll(&devices, &mut NoKeys, ms(armed, 10)), ListenOutcome::Pending);
    }

    #[test]
    fn test_timeout() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let devices = FakeDevices::one(DeviceState::new(2, 2, 0));

        det.begin_listening(ListenTarget::Joystick);
        let armed = arm(&mut det, &devices, &mut NoKeys, t0);

        assert_eq!(det.poll(&devices, &mut NoKeys, ms(armed, 5000)), ListenOutcome::Pending);
        assert_eq!(det.poll(&devices, &mut NoKeys, ms(armed, 5001)), ListenOutcome::TimedOut);
        assert_eq!(det.state(), DetectorState::TimedOut);
        assert_eq!(det.baseline_len, 0);
        assert_eq!(det.poll(&devices, &mut NoKeys, ms(armed, 5010)), ListenOutcome::Idle);
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let devices = FakeDevices::one(DeviceState::new(1, 1, 0));

        assert!(!det.cancel_listening());
        det.begin_listening(ListenTarget::Joystick);
        arm(&mut det, &devices, &mut NoKeys, t0);
        assert!(det.cancel_listening());
        assert_eq!(det.state(), DetectorState::Cancelled);
        assert_eq!(det.poll(&devices, &mut NoKeys, ms(t0, 100)), ListenOutcome::Idle);
    }

    #[test]
    fn test_escape_cancels() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let devices = FakeDevices::one(DeviceState::new(1, 1, 0));
        let mut keys = EventQueueKeys::new();

        det.begin_listening(ListenTarget::Joystick);
        let armed = arm(&mut det, &devices, &mut keys, t0);
        keys.tap(KeyCode::ESCAPE);
        assert_eq!(det.poll(&devices, &mut keys, ms(armed, 10)), ListenOutcome::Cancelled);
    }

    #[test]
    fn test_new_session_supersedes() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let devices = FakeDevices::one(DeviceState::new(1, 1, 0));

        let first = det.begin_listening(ListenTarget::Joystick);
        arm(&mut det, &devices, &mut NoKeys, t0);
        let second = det.begin_listening(ListenTarget::Keyboard);
        assert!(second > first);
        assert_eq!(det.state(), DetectorState::BaselineCapturing);
        assert_eq!(det.target(), ListenTarget::Keyboard);
    }

    #[test]
    fn test_stale_keys_cleared_at_arm() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let devices = FakeDevices::one(DeviceState::default());
        let mut keys = EventQueueKeys::new();

        // Typed into a text field just before listening started
        keys.tap(KeyCode::from_char('q').unwrap());
        det.begin_listening(ListenTarget::Keyboard);
        let armed = arm(&mut det, &devices, &mut keys, t0);
        assert_eq!(det.poll(&devices, &mut keys, ms(armed, 10)), ListenOutcome::Pending);

        keys.push_event(KeyCode::LALT, true);
        keys.tap(KeyCode::from_char('f').unwrap());
        let input = det.poll(&devices, &mut keys, ms(armed, 20)).detected().unwrap();
        assert_eq!(input.device, DetectedDevice::Keyboard);
        assert_eq!(input.name, "f");
        assert_eq!(input.modifiers, vec!["lalt".to_string()]);
        assert_eq!(input.source(), None);
    }

    #[test]
    fn test_mouse_target() {
        let t0 = Instant::now();
        let mut det = InputChangeDetector::default();
        let devices = FakeDevices::one(DeviceState::default());
        let mut keys = EventQueueKeys::new();

        det.begin_listening(ListenTarget::Mouse);
        let armed = arm(&mut det, &devices, &mut keys, t0);
        keys.tap(KeyCode::from_char('a').unwrap());
        assert_eq!(det.poll(&devices, &mut keys, ms(armed, 10)), ListenOutcome::Pending);
        keys.tap(KeyCode::MOUSE3);
        let input = det.poll(&devices, &mut keys, ms(armed, 20)).detected().unwrap();
        assert_eq!(input.name, "mouse3");
        assert_eq!(input.device, DetectedDevice::Mouse);
    }

    #[test]
    fn test_names() {
        assert_eq!(axis_name(0), "x");
        assert_eq!(axis_name(7), "slider2");
        assert_eq!(axis_name(8), "axis9");
        assert_eq!(button_name(0), "button1");
        assert_eq!(hat_name(0, HatDirection::Up), "hat1_up");
    }
}
