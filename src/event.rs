//! Events delivered to the application.
//!
//! Two kinds of event leave the engine:
//! - [`DeviceStatusEvent`] when a device finishes connecting or goes away.
//! - [`DataUpdate`] when a device reports new values for its assignments.
//!
//! ## Value conventions
//! `UpdateItem::value` is the parameter value. For list assignments the device
//! reports the selected *index*; by the time the event is delivered it has been
//! resolved to the selected item's value and the enumeration frame has moved.

use crate::assignment::AssignmentId;
use crate::device::{DeviceId, DeviceStatus};
use crate::metadata::DeviceDescriptor;

/// A device connected or disconnected.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceStatusEvent {
    pub device_id: DeviceId,
    pub status: DeviceStatus,
    /// Populated descriptor for `Connected`; last known layout for `Disconnected`.
    pub descriptor: Option<DeviceDescriptor>,
}

/// One `(assignment, value)` pair from a data update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateItem {
    pub assignment_id: AssignmentId,
    pub value: f32,
}

/// A batch of updates from one device, in wire order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataUpdate {
    pub device_id: DeviceId,
    pub updates: Vec<UpdateItem>,
}

impl DataUpdate {
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}
