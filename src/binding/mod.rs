//! Action → input binding table for the game's keybinding schema
//!
//! Each [`ActionBinding`] says which input fires one game action for one
//! device type. The table is keyed by (action map, action name, device
//! type), so an action can have one keyboard, one mouse and one joystick
//! binding at the same time.
//!
//! The table round-trips through a flat CSV file:
//!
//! ```text
//! action_map,action_name,device_type,input_name,input_type,modifiers,virtual_device_id
//! spaceship_weapons,v_attack1,joystick,button1,button,,1
//! spaceship_general,v_toggle_mining_mode,keyboard,m,button,lalt,0
//! ```

pub mod conflict;
pub mod device_order;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::error::BindingError;
use crate::profile::InputKind;

pub use conflict::{commit, conflict_report, find_conflicts, CommitOutcome, ConflictReport, Resolution};
pub use device_order::{AutoDetectOutcome, DeviceOrderMapper};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Keyboard,
    Mouse,
    Joystick,
}

impl DeviceType {
    /// Prefix of the game's input strings (`kb1_`, `mo1_`, `js2_`)
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Keyboard => "kb",
            Self::Mouse => "mo",
            Self::Joystick => "js",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Keyboard => "keyboard",
            Self::Mouse => "mouse",
            Self::Joystick => "joystick",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceType {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyboard" | "kb" => Ok(Self::Keyboard),
            "mouse" | "mo" => Ok(Self::Mouse),
            "joystick" | "js" => Ok(Self::Joystick),
            _ => Err(BindingError::UnknownName { field: "device type", value: s.to_string() }),
        }
    }
}

/// Game action identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKey {
    pub action_map: String,
    pub action_name: String,
}

impl ActionKey {
    pub fn new(action_map: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self { action_map: action_map.into(), action_name: action_name.into() }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.action_map, self.action_name)
    }
}

/// Table key: one binding per action and device type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey {
    pub action: ActionKey,
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBinding {
    pub action: ActionKey,
    pub device_type: DeviceType,
    pub input_name: String,
    pub input_type: InputKind,
    pub modifiers: BTreeSet<String>,
    /// Virtual device the input belongs to (joystick bindings)
    pub virtual_device_id: u32,
}

impl ActionBinding {
    pub fn joystick(action: ActionKey, virtual_device_id: u32, input_name: impl Into<String>, input_type: InputKind) -> Self {
        Self {
            action,
            device_type: DeviceType::Joystick,
            input_name: input_name.into(),
            input_type,
            modifiers: BTreeSet::new(),
            virtual_device_id,
        }
    }

    pub fn keyboard(action: ActionKey, key: impl Into<String>, modifiers: &[&str]) -> Self {
        Self {
            action,
            device_type: DeviceType::Keyboard,
            input_name: key.into(),
            input_type: InputKind::Button,
            modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
            virtual_device_id: 0,
        }
    }

    pub fn mouse(action: ActionKey, button: impl Into<String>) -> Self {
        Self {
            action,
            device_type: DeviceType::Mouse,
            input_name: button.into(),
            input_type: InputKind::Button,
            modifiers: BTreeSet::new(),
            virtual_device_id: 0,
        }
    }

    pub fn key(&self) -> BindingKey {
        BindingKey { action: self.action.clone(), device_type: self.device_type }
    }

    /// Game-schema input string, e.g. `js2_button3` or `kb1_lalt+f`.
    ///
    /// Joystick bindings use the instance `order` assigns to their virtual
    /// device, or the virtual id itself when unassigned.
    pub fn input_string(&self, order: &DeviceOrderMapper) -> String {
        let instance = match self.device_type {
            DeviceType::Joystick => order.instance_of(self.virtual_device_id).unwrap_or(self.virtual_device_id),
            DeviceType::Keyboard | DeviceType::Mouse => 1,
        };
        let mut s = format!("{}{}_", self.device_type.prefix(), instance);
        for modifier in &self.modifiers {
            s.push_str(modifier);
            s.push('+');
        }
        s.push_str(&self.input_name);
        s
    }
}

/// Flat CSV row
#[derive(Debug, Serialize, Deserialize)]
struct BindingRecord {
    action_map: String,
    action_name: String,
    device_type: DeviceType,
    input_name: String,
    input_type: InputKind,
    #[serde(default)]
    modifiers: String,
    #[serde(default)]
    virtual_device_id: u32,
}

impl From<BindingRecord> for ActionBinding {
    fn from(r: BindingRecord) -> Self {
        Self {
            action: ActionKey::new(r.action_map, r.action_name),
            device_type: r.device_type,
            input_name: r.input_name.trim().to_ascii_lowercase(),
            input_type: r.input_type,
            modifiers: parse_modifiers(&r.modifiers),
            virtual_device_id: r.virtual_device_id,
        }
    }
}

impl From<&ActionBinding> for BindingRecord {
    fn from(b: &ActionBinding) -> Self {
        Self {
            action_map: b.action.action_map.clone(),
            action_name: b.action.action_name.clone(),
            device_type: b.device_type,
            input_name: b.input_name.clone(),
            input_type: b.input_type,
            modifiers: b.modifiers.iter().map(String::as_str).collect::<Vec<_>>().join("+"),
            virtual_device_id: b.virtual_device_id,
        }
    }
}

/// `lalt+lctrl` → {lalt, lctrl}
pub fn parse_modifiers(s: &str) -> BTreeSet<String> {
    s.split('+')
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}

/// In-memory binding table; mutated only from the tick thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    bindings: BTreeMap<BindingKey, ActionBinding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn get(&self, key: &BindingKey) -> Option<&ActionBinding> {
        self.bindings.get(key)
    }

    /// Insert or replace; returns the binding previously under the same key
    pub fn upsert(&mut self, binding: ActionBinding) -> Option<ActionBinding> {
        self.bindings.insert(binding.key(), binding)
    }

    pub fn remove(&mut self, key: &BindingKey) -> Option<ActionBinding> {
        self.bindings.remove(key)
    }

    /// Bindings in key order
    pub fn iter(&self) -> impl Iterator<Item = &ActionBinding> {
        self.bindings.values()
    }

    /// All bindings of one action, across device types
    pub fn for_action<'a>(&'a self, action: &'a ActionKey) -> impl Iterator<Item = &'a ActionBinding> + 'a {
        self.bindings.values().filter(move |b| b.action == *action)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, BindingError> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut table = Self::new();
        for row in csv.deserialize() {
            let record: BindingRecord = row?;
            table.upsert(record.into());
        }
        Ok(table)
    }

    pub fn from_csv_str(text: &str) -> Result<Self, BindingError> {
        Self::from_reader(text.as_bytes())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BindingError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        info!("Loaded {} bindings from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), BindingError> {
        let mut csv = csv::Writer::from_writer(writer);
        for binding in self.iter() {
            csv.serialize(BindingRecord::from(binding))?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, BindingError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        String::from_utf8(buf).map_err(|e| BindingError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BindingError> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_to(io::BufWriter::new(file))
    }
}
