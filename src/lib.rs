//! joybind - physical controller remapping and game action binding
//!
//! Physical axes, buttons and hats are read each tick, shaped by a
//! [`profile::MappingProfile`] (deadzones, response curves, merges, button
//! modes) and written to virtual devices. Alongside that, an
//! [`detect::InputChangeDetector`] captures "press the control you want"
//! input for game action bindings, which are checked for conflicts and kept
//! in a [`binding::BindingTable`].

pub mod binding;
pub mod config;
pub mod detect;
pub mod device;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod profile;

pub use config::EngineConfig;
pub use engine::{Engine, EngineEvent, ListenRequest};
