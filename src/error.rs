//! Error types for the library.

use crate::device::{DeviceId, DeviceStatus};
use crate::assignment::{ActuatorId, AssignmentId};
use crate::frame::FrameError;
use thiserror::Error;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Device table errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Every device slot is occupied.
    #[error("device table full ({0} slots in use)")]
    Capacity(usize),

    /// No live device with this id.
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    /// Descriptor layout cannot be addressed with one-byte ids.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(&'static str),

    /// The connection state machine only moves forward.
    #[error("device {device_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        device_id: DeviceId,
        from: DeviceStatus,
        to: DeviceStatus,
    },
}

/// Assignment engine errors. Every variant leaves the tables untouched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    #[error("device {device_id} has no actuator {actuator_id}")]
    InvalidActuator {
        device_id: DeviceId,
        actuator_id: ActuatorId,
    },

    #[error("actuator {actuator_id} on device {device_id} is at its assignment limit")]
    ActuatorCapacityExceeded {
        device_id: DeviceId,
        actuator_id: ActuatorId,
    },

    #[error("list of {count} items for device {device_id} exceeds 255")]
    ListTooLong { device_id: DeviceId, count: usize },

    #[error("{field} of {len} bytes for device {device_id} exceeds 255")]
    StringTooLong {
        device_id: DeviceId,
        field: &'static str,
        len: usize,
    },

    #[error("assignment table of device {0} is full")]
    AssignmentCapacityExceeded(DeviceId),

    #[error("device {device_id} has no assignment {assignment_id}")]
    NotFound {
        device_id: DeviceId,
        assignment_id: AssignmentId,
    },
}

/// Top-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("assignment error: {0}")]
    Assignment(#[from] AssignmentError),

    /// Frame addressed to a device that is not (or not yet) registered.
    #[error("frame for unregistered address {address} ({command})")]
    UnknownAddress { address: u8, command: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("transport error: {0}")]
    Transport(String),
}
