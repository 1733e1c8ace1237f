//! Error types and handling for Solarmap
//!
//! This module defines the error types used throughout the engine. Load-time
//! table errors, codec errors, setting validation and write failures share
//! one enum; per-descriptor read failures and transport failures get their
//! own small types because they travel inside other results.

use thiserror::Error;

/// Result type alias for Solarmap operations
pub type Result<T> = std::result::Result<T, SolarmapError>;

/// Error returned by a single-register write
pub type WriteError = SolarmapError;

/// Error returned by a composite setting write
pub type CompositeWriteError = SolarmapError;

/// Failure reported by the transport collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No connection has been established
    #[error("Not connected to Modbus server")]
    NotConnected,

    /// The operation did not complete within the transport timeout
    #[error("Timeout during {operation}")]
    Timeout { operation: String },

    /// Socket or framing failure
    #[error("I/O failure: {message}")]
    Io { message: String },

    /// The device answered with a Modbus exception
    #[error("Modbus exception: {code}")]
    Exception { code: String },

    /// The device returned fewer registers than requested
    #[error("Short response: expected {expected} registers, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    /// The endpoint address could not be used
    #[error("Invalid address: {message}")]
    Address { message: String },
}

impl TransportError {
    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        TransportError::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        TransportError::Timeout {
            operation: operation.into(),
        }
    }
}

/// A descriptor could not be produced in this read cycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unavailable: {reason}")]
pub struct Unavailable {
    pub reason: String,
}

impl Unavailable {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Main error type for Solarmap
#[derive(Debug, Error)]
pub enum SolarmapError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Configuration field validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Name not present in the register table (or not for this model)
    #[error("Unknown register: {name}")]
    UnknownRegister { name: String },

    /// Name not present in the composite settings table
    #[error("Unknown setting: {name}")]
    UnknownSetting { name: String },

    /// Register or settings table failed load-time validation
    #[error("Invalid descriptor table: {}", .entries.join("; "))]
    InvalidDescriptor { entries: Vec<String> },

    /// Value cannot be represented in the register width
    #[error("Value out of range: {message}")]
    ValueOutOfRange { message: String },

    /// Value does not fit the encoding (wrong type, scale mismatch, bad words)
    #[error("Invalid encoding input: {message}")]
    InvalidEncodingInput { message: String },

    /// Composite value rejected by a setting rule; nothing was written
    #[error("Invalid setting {setting}: {message}")]
    InvalidSetting { setting: String, message: String },

    /// Write attempted on a read-only register
    #[error("Register {name} is read-only")]
    ReadOnly { name: String },

    /// A value needed by the operation could not be read
    #[error(transparent)]
    Unavailable(#[from] Unavailable),

    /// Transport failure passed through untouched
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Some writes of a composite setting were applied before one failed.
    /// The device is in an indeterminate state and must be re-read.
    #[error("Partial write of {setting}: {failed} failed after {succeeded:?}: {source}")]
    PartialWrite {
        setting: String,
        succeeded: Vec<String>,
        failed: String,
        source: TransportError,
    },
}

impl SolarmapError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        SolarmapError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        SolarmapError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        SolarmapError::Io {
            message: message.into(),
        }
    }

    pub fn unknown_register<S: Into<String>>(name: S) -> Self {
        SolarmapError::UnknownRegister { name: name.into() }
    }

    pub fn out_of_range<S: Into<String>>(message: S) -> Self {
        SolarmapError::ValueOutOfRange {
            message: message.into(),
        }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        SolarmapError::InvalidEncodingInput {
            message: message.into(),
        }
    }

    pub fn invalid_setting<S: Into<String>, M: Into<String>>(setting: S, message: M) -> Self {
        SolarmapError::InvalidSetting {
            setting: setting.into(),
            message: message.into(),
        }
    }

    /// True when device state may have been partially changed
    pub fn is_partial_write(&self) -> bool {
        matches!(self, SolarmapError::PartialWrite { .. })
    }

    /// True when the failure happened before any device I/O
    pub fn is_side_effect_free(&self) -> bool {
        !matches!(
            self,
            SolarmapError::PartialWrite { .. } | SolarmapError::Transport(_)
        )
    }
}

impl From<std::io::Error> for SolarmapError {
    fn from(err: std::io::Error) -> Self {
        SolarmapError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for SolarmapError {
    fn from(err: serde_yaml::Error) -> Self {
        SolarmapError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SolarmapError {
    fn from(err: serde_json::Error) -> Self {
        SolarmapError::Serialization {
            message: err.to_string(),
        }
    }
}
