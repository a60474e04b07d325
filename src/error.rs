use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;

use crate::device::types::{SensorChannel, SessionState};

/// A payload or display pattern that does not match the wire format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Display pattern must have exactly 81 symbols, got {actual}")]
    WrongLength { actual: usize },

    #[error("{channel} payload too short: need {expected} byte(s), got {actual}")]
    Truncated { channel: SensorChannel, expected: usize, actual: usize },

    #[error("{channel} payload must be exactly {expected} byte(s), got {actual}")]
    UnexpectedLength { channel: SensorChannel, expected: usize, actual: usize },

    #[error("Unknown {channel} code: {value}")]
    UnknownCode { channel: SensorChannel, value: u8 },

    #[error("Battery level out of range: {0}")]
    BatteryOutOfRange(u8),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("The bluetooth characteristic for the {0} channel is not available")]
    MissingCharacteristic(SensorChannel),

    #[error("The bluetooth characteristic for the LED matrix is not available")]
    MissingDisplay,
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter available")]
    NoAdapter,

    #[error("Operation took longer than {0}ms")]
    Timeout(u64),

    #[error("Bluetooth host rejected the operation: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session is already {state}")]
    AlreadyBound { state: SessionState },

    #[error("Session is not bound (currently {state})")]
    NotBound { state: SessionState },

    #[error("Neither a device name nor an address is set")]
    MissingIdentity,

    #[error("Failed to find device with {identity}")]
    PeripheralNotFound { identity: String },

    #[error("Failed to bind to device: {source}")]
    Bind { #[from] source: BindError },

    #[error("Failed to subscribe to the {channel} channel: {source}")]
    Subscribe { channel: SensorChannel, source: DeviceError },

    #[error("Device sent malformed data: {source}")]
    Format { #[from] source: FormatError },

    #[error(transparent)]
    Device { #[from] source: DeviceError },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (runtime): {source}")]
    Runtime { #[from] source: io::Error },

    #[error("{source}")]
    Session { #[from] source: SessionError },

    #[error("Invalid display pattern: {source}")]
    Pattern { #[from] source: FormatError },
}
