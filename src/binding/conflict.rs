//! Binding conflict detection and resolution
//!
//! Two bindings conflict when they fire from the same physical input: same
//! device (external instance for joysticks), same input name and same
//! modifier set, but different actions. Conflicts are a decision point for
//! the caller, not an error.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::info;

use super::{ActionBinding, BindingKey, BindingTable, DeviceOrderMapper, DeviceType};

/// What to do when a new binding collides with existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Abort; the table is left untouched
    Cancel,
    /// Remove every conflicting binding, then commit
    ReplaceAll,
    /// Commit and keep the conflicting bindings
    ApplyAnyway,
}

/// Device side of a conflict identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputDevice {
    /// External joystick instance, or the virtual id when unassigned
    Joystick(u32),
    Keyboard,
    Mouse,
}

/// Bindings with equal keys fire from the same input
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConflictKey {
    pub device: InputDevice,
    pub input_name: String,
    pub modifiers: BTreeSet<String>,
}

impl ConflictKey {
    pub fn of(binding: &ActionBinding, order: &DeviceOrderMapper) -> Self {
        let device = match binding.device_type {
            DeviceType::Joystick => InputDevice::Joystick(
                order
                    .instance_of(binding.virtual_device_id)
                    .unwrap_or(binding.virtual_device_id),
            ),
            DeviceType::Keyboard => InputDevice::Keyboard,
            DeviceType::Mouse => InputDevice::Mouse,
        };
        Self {
            device,
            input_name: binding.input_name.clone(),
            modifiers: binding.modifiers.clone(),
        }
    }
}

/// Existing bindings of other actions that share `proposed`'s input
pub fn find_conflicts<'a>(
    table: &'a BindingTable,
    order: &DeviceOrderMapper,
    proposed: &ActionBinding,
) -> Vec<&'a ActionBinding> {
    let key = ConflictKey::of(proposed, order);
    table
        .iter()
        .filter(|b| b.action != proposed.action && ConflictKey::of(b, order) == key)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed {
        /// Binding this one replaced under the same action and device type
        replaced: Option<ActionBinding>,
        /// Conflicting bindings removed by `ReplaceAll`
        removed: Vec<ActionBinding>,
        /// Conflicting bindings left in place by `ApplyAnyway`
        kept_conflicts: usize,
    },
    Cancelled {
        conflicts: usize,
    },
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Commit `binding`, applying `resolution` if it conflicts.
///
/// Without conflicts the binding is committed whatever `resolution` says.
pub fn commit(
    table: &mut BindingTable,
    order: &DeviceOrderMapper,
    binding: ActionBinding,
    resolution: Resolution,
) -> CommitOutcome {
    let conflicts: Vec<BindingKey> = find_conflicts(table, order, &binding)
        .into_iter()
        .map(ActionBinding::key)
        .collect();

    let mut removed = Vec::new();
    let mut kept_conflicts = 0;
    if !conflicts.is_empty() {
        match resolution {
            Resolution::Cancel => {
                info!("Binding {} -> {} cancelled ({} conflicts)", binding.action, binding.input_name, conflicts.len());
                return CommitOutcome::Cancelled { conflicts: conflicts.len() };
            }
            Resolution::ReplaceAll => {
                removed = conflicts.iter().filter_map(|key| table.remove(key)).collect();
                info!("Binding {} -> {} replaced {} binding(s)", binding.action, binding.input_name, removed.len());
            }
            Resolution::ApplyAnyway => {
                kept_conflicts = conflicts.len();
                info!("Binding {} -> {} kept {} conflict(s)", binding.action, binding.input_name, kept_conflicts);
            }
        }
    }

    let replaced = table.upsert(binding);
    CommitOutcome::Committed { replaced, removed, kept_conflicts }
}

/// Standing conflict check over the whole table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    /// Groups of two or more bindings sharing one input
    pub groups: Vec<(ConflictKey, Vec<BindingKey>)>,
    conflicting: HashSet<BindingKey>,
}

impl ConflictReport {
    pub fn is_conflicting(&self, key: &BindingKey) -> bool {
        self.conflicting.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn conflicting_count(&self) -> usize {
        self.conflicting.len()
    }
}

pub fn conflict_report(table: &BindingTable, order: &DeviceOrderMapper) -> ConflictReport {
    let mut by_input: BTreeMap<ConflictKey, Vec<BindingKey>> = BTreeMap::new();
    for binding in table.iter() {
        by_input
            .entry(ConflictKey::of(binding, order))
            .or_default()
            .push(binding.key());
    }

    let groups: Vec<_> = by_input.into_iter().filter(|(_, members)| members.len() > 1).collect();
    let conflicting = groups
        .iter()
        .flat_map(|(_, members)| members.iter().cloned())
        .collect();
    ConflictReport { groups, conflicting }
}
