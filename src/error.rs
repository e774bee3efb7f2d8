//! Typed errors for the library surface
//!
//! Application plumbing (config files, CLI) wraps these in `anyhow`.

use thiserror::Error;

/// Problems found while validating a mapping profile.
///
/// Raised at edit/load time only; the per-tick path trusts validated data.
#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("deadzone for {output} has min {min} > max {max}")]
    InvertedBounds { output: String, min: f32, max: f32 },

    #[error("deadzone for {output} has center band {center_min}..{center_max} outside or inverted within {min}..{max}")]
    InvertedCenter {
        output: String,
        min: f32,
        center_min: f32,
        center_max: f32,
        max: f32,
    },

    #[error("{output} is mapped more than once")]
    DuplicateOutput { output: String },

    #[error("{output} cannot be driven by a {mapping} mapping")]
    WrongOutputKind { output: String, mapping: &'static str },

    #[error("input {index} of {output} is a {found:?} source, expected {expected:?}")]
    WrongInputKind {
        output: String,
        index: usize,
        found: crate::profile::InputKind,
        expected: crate::profile::InputKind,
    },

    #[error("custom curve for {output}: {reason}")]
    BadCurve { output: String, reason: String },

    #[error("non-finite value in {output}")]
    NonFinite { output: String },
}

/// Failures of the physical device backend.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device backend unavailable: {0}")]
    Unavailable(String),

    #[error("device enumeration failed: {0}")]
    Enumeration(String),
}

/// Failures writing to the virtual device output.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("virtual device {device} is not acquired")]
    NotAcquired { device: u32 },

    #[error("virtual device {device} rejected write to index {index}: {reason}")]
    Rejected { device: u32, index: u32, reason: String },
}

/// Problems reading or interpreting an action binding table.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("failed to parse binding row: {0}")]
    Csv(#[from] csv::Error),

    #[error("unknown {field} '{value}'")]
    UnknownName { field: &'static str, value: String },

    #[error("failed to write binding table: {0}")]
    Io(#[from] std::io::Error),
}
