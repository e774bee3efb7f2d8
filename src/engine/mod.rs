//! Engine session
//!
//! Owns everything the tick thread mutates: the compiled profile, per-mapping
//! button state, the binding table, the device order and the detector. One
//! [`Engine::tick`] call samples devices once, writes every output and
//! advances the listening session.

use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::binding::{self, ActionBinding, ActionKey, BindingTable, CommitOutcome, ConflictReport, DeviceOrderMapper, DeviceType, Resolution};
use crate::binding::device_order::AutoDetectOutcome;
use crate::config::EngineConfig;
use crate::detect::{DetectedDevice, DetectedInput, InputChangeDetector, KeyStateSource, ListenOutcome, ListenTarget};
use crate::device::{DeviceDescriptor, DeviceEnumerator, DeviceStateProvider, HatDirection, InputFrame, VirtualOutputSink};
use crate::error::{ProfileError, SinkError};
use crate::pipeline::{hat_pressed, AxisModeDefaults, CompiledAxis, DigitalOutput};
use crate::profile::{DeviceId, InputSource, MappingProfile, OutputKind, OutputTarget};

/// What a listening session is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenRequest {
    pub action: ActionKey,
    pub target: ListenTarget,
    /// Virtual device a joystick detection is bound to when the detected
    /// device is not itself one of ours
    pub virtual_device: u32,
}

/// Listening results surfaced by [`Engine::tick`]
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// An input was detected. Nothing is committed yet: pass `proposal` to
    /// [`Engine::commit_binding`] with a resolution if `conflicts` is
    /// non-empty.
    Detected {
        request: ListenRequest,
        input: DetectedInput,
        proposal: ActionBinding,
        conflicts: Vec<ActionBinding>,
    },
    Cancelled { request: ListenRequest },
    TimedOut { request: ListenRequest },
}

/// Button or hat mapping flattened for the tick path
#[derive(Debug)]
struct DigitalSlot {
    output: OutputTarget,
    inputs: Vec<InputSource>,
    /// Hat mappings only; `Some(None)` accepts any direction
    hat_direction: Option<Option<HatDirection>>,
    state: DigitalOutput,
    /// Last value written, `None` before the first write
    written: Option<bool>,
}

impl DigitalSlot {
    fn pressed(&self, frame: &InputFrame) -> bool {
        match self.hat_direction {
            None => self.inputs.iter().any(|src| frame.button(src)),
            Some(direction) => self.inputs.iter().any(|src| hat_pressed(frame.hat(src), direction)),
        }
    }
}

pub struct Engine {
    profile: MappingProfile,
    axis_defaults: AxisModeDefaults,
    axes: Vec<CompiledAxis>,
    digital: Vec<DigitalSlot>,
    /// Outputs left pressed by a replaced profile, released next tick
    release_queue: Vec<OutputTarget>,
    bindings: BindingTable,
    order: DeviceOrderMapper,
    virtual_slots: Vec<u32>,
    /// Physical devices that are our own virtual devices
    device_slots: HashMap<DeviceId, u32>,
    detector: InputChangeDetector,
    request: Option<ListenRequest>,
    frame: InputFrame,
    scratch: Vec<f32>,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            profile: MappingProfile::default(),
            axis_defaults: config.axis_defaults.clone(),
            axes: Vec::new(),
            digital: Vec::new(),
            release_queue: Vec::new(),
            bindings: BindingTable::new(),
            order: DeviceOrderMapper::identity(&config.virtual_slots),
            virtual_slots: config.virtual_slots.clone(),
            device_slots: HashMap::new(),
            detector: InputChangeDetector::new(config.listening.detector_settings()),
            request: None,
            frame: InputFrame::new(),
            scratch: Vec::new(),
        }
    }

    // --- Profile ---

    pub fn profile(&self) -> &MappingProfile {
        &self.profile
    }

    /// Validate and install a profile; the old one stays on error
    pub fn set_profile(&mut self, profile: MappingProfile) -> Result<(), ProfileError> {
        profile.validate_with(&self.axis_defaults)?;
        // A slot whose last write failed may still be held on the device
        for slot in self.digital.iter().filter(|slot| slot.written != Some(false)) {
            if !self.release_queue.contains(&slot.output) {
                self.release_queue.push(slot.output.clone());
            }
        }
        self.profile = profile;
        self.compile();
        // Outputs the new profile drives are written by their own slot
        let digital = &self.digital;
        self.release_queue.retain(|output| !digital.iter().any(|slot| &slot.output == output));
        info!(
            "Profile '{}' active: {} axes, {} buttons, {} hats",
            self.profile.name,
            self.profile.axes.len(),
            self.profile.buttons.len(),
            self.profile.hats.len()
        );
        Ok(())
    }

    /// Edit a copy of the profile and install it if the edit and the
    /// resulting profile are both valid
    pub fn update_profile<F>(&mut self, edit: F) -> Result<(), ProfileError>
    where
        F: FnOnce(&mut MappingProfile) -> Result<(), ProfileError>,
    {
        let mut profile = self.profile.clone();
        edit(&mut profile)?;
        self.set_profile(profile)
    }

    /// Swap the axis mode table; rejected if the active profile would no
    /// longer validate under it
    pub fn set_axis_defaults(&mut self, defaults: AxisModeDefaults) -> Result<(), ProfileError> {
        self.profile.validate_with(&defaults)?;
        self.axis_defaults = defaults;
        self.compile();
        Ok(())
    }

    fn compile(&mut self) {
        self.axes = self
            .profile
            .axes
            .iter()
            .map(|m| CompiledAxis::compile(m.clone(), &self.axis_defaults))
            .collect();

        let buttons = self.profile.buttons.iter().map(|m| DigitalSlot {
            output: m.output.clone(),
            inputs: m.inputs.clone(),
            hat_direction: None,
            state: DigitalOutput::for_button(m),
            written: None,
        });
        let hats = self.profile.hats.iter().map(|m| DigitalSlot {
            output: m.output.clone(),
            inputs: m.inputs.clone(),
            hat_direction: Some(m.direction),
            state: DigitalOutput::for_hat(m),
            written: None,
        });
        self.digital = buttons.chain(hats).collect();
    }

    // --- Tick ---

    /// Sample devices, write all outputs, advance listening
    pub fn tick(
        &mut self,
        devices: &dyn DeviceStateProvider,
        keys: &mut dyn KeyStateSource,
        sink: &mut dyn VirtualOutputSink,
        now: Instant,
    ) -> Option<EngineEvent> {
        self.frame.capture(devices);

        // Failed releases stay queued for the next tick
        let releases = std::mem::take(&mut self.release_queue);
        for output in releases {
            if !report(write_digital(sink, &output, false), &output) {
                self.release_queue.push(output);
            }
        }

        for axis in &self.axes {
            let Some(value) = axis.evaluate(&self.frame, &mut self.scratch) else {
                continue;
            };
            let output = &axis.mapping.output;
            report(sink.set_axis(output.device, output.index, value), output);
        }

        for slot in &mut self.digital {
            let pressed = slot.pressed(&self.frame);
            let value = slot.state.step(pressed, now);
            if slot.written != Some(value) {
                let ok = report(write_digital(sink, &slot.output, value), &slot.output);
                // Unknown device state after a failure; rewrite next tick
                slot.written = if ok { Some(value) } else { None };
            }
        }

        let outcome = self.detector.poll(devices, keys, now);
        self.listen_event(outcome)
    }

    fn listen_event(&mut self, outcome: ListenOutcome) -> Option<EngineEvent> {
        if !outcome.is_finished() {
            return None;
        }
        let request = self.request.take()?;
        match outcome {
            ListenOutcome::Detected(input) => {
                let proposal = self.proposal(&request, &input);
                let conflicts = self.find_conflicts(&proposal);
                if !conflicts.is_empty() {
                    info!("{} on {} conflicts with {} binding(s)", input.name, request.action, conflicts.len());
                }
                Some(EngineEvent::Detected { request, input, proposal, conflicts })
            }
            ListenOutcome::Cancelled => Some(EngineEvent::Cancelled { request }),
            ListenOutcome::TimedOut => Some(EngineEvent::TimedOut { request }),
            ListenOutcome::Idle | ListenOutcome::Pending => None,
        }
    }

    // --- Listening ---

    /// Start listening for `request`, superseding any running session
    pub fn begin_listening(&mut self, request: ListenRequest) -> u64 {
        if let Some(prev) = self.request.take() {
            debug!("Listening for {} superseded by {}", prev.action, request.action);
        }
        let session = self.detector.begin_listening(request.target);
        self.request = Some(request);
        session
    }

    /// Cancel the running session; returns its request
    pub fn cancel_listening(&mut self) -> Option<ListenRequest> {
        self.detector.cancel_listening();
        self.request.take()
    }

    pub fn is_listening(&self) -> bool {
        self.detector.is_listening()
    }

    pub fn detector(&self) -> &InputChangeDetector {
        &self.detector
    }

    /// Binding the detected input would create for the request
    pub fn proposal(&self, request: &ListenRequest, input: &DetectedInput) -> ActionBinding {
        let (device_type, virtual_device_id) = match &input.device {
            DetectedDevice::Joystick { id, .. } => (
                DeviceType::Joystick,
                self.device_slots.get(id).copied().unwrap_or(request.virtual_device),
            ),
            DetectedDevice::Keyboard => (DeviceType::Keyboard, 0),
            DetectedDevice::Mouse => (DeviceType::Mouse, 0),
        };
        ActionBinding {
            action: request.action.clone(),
            device_type,
            input_name: input.name.clone(),
            input_type: input.kind,
            modifiers: input.modifiers.iter().cloned().collect(),
            virtual_device_id,
        }
    }

    // --- Bindings ---

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn set_bindings(&mut self, table: BindingTable) {
        self.bindings = table;
    }

    pub fn remove_binding(&mut self, key: &binding::BindingKey) -> Option<ActionBinding> {
        self.bindings.remove(key)
    }

    pub fn find_conflicts(&self, proposal: &ActionBinding) -> Vec<ActionBinding> {
        binding::find_conflicts(&self.bindings, &self.order, proposal)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn commit_binding(&mut self, proposal: ActionBinding, resolution: Resolution) -> CommitOutcome {
        binding::commit(&mut self.bindings, &self.order, proposal, resolution)
    }

    pub fn conflict_report(&self) -> ConflictReport {
        binding::conflict_report(&self.bindings, &self.order)
    }

    // --- Device order ---

    pub fn device_order(&self) -> &DeviceOrderMapper {
        &self.order
    }

    pub fn assign_slot(&mut self, target_instance: u32, virtual_device: u32) {
        self.order.assign_slot(target_instance, virtual_device);
    }

    /// Re-detect game instance numbers and remember which enumerated
    /// devices are our virtual ones
    pub fn auto_detect_order(&mut self, enumerator: &dyn DeviceEnumerator) -> AutoDetectOutcome {
        let enumeration = enumerator.enumerate();
        if let Ok(devices) = &enumeration {
            self.set_device_slots(devices);
        }
        self.order.apply_enumeration(enumeration, &self.virtual_slots)
    }

    pub fn set_device_slots(&mut self, devices: &[DeviceDescriptor]) {
        self.device_slots = devices
            .iter()
            .filter_map(|d| Some((d.id.clone(), d.virtual_slot?)))
            .collect();
    }
}

fn write_digital(sink: &mut dyn VirtualOutputSink, output: &OutputTarget, value: bool) -> Result<(), SinkError> {
    match output.kind {
        OutputKind::VirtualButton => sink.set_button(output.device, output.index, value),
        OutputKind::Keyboard => match output.key_name.as_deref() {
            Some(key) => sink.set_key(key, &output.modifiers, value),
            None => Ok(()),
        },
        // Rejected by profile validation
        OutputKind::VirtualAxis => Ok(()),
    }
}

/// Log a failed write; returns whether the write went through
fn report(result: Result<(), SinkError>, output: &OutputTarget) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Write to {} failed: {}", output, e);
            false
        }
    }
}
