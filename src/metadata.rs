//! Device descriptor snapshot.
//!
//! [`DeviceDescriptor`] is a cloneable, read-only description of a device for UI
//! display and logging. It is what the device-status callback receives, and
//! [`DeviceDescriptor::to_json`] renders it for consumers that want JSON.
//!
//! # JSON shape
//! ```json
//! {
//!   "label": "Footex",
//!   "uri": "https://example.org/footex",
//!   "version": "1.0.2",
//!   "protocol": "0.6",
//!   "amount_of_pages": 1,
//!   "actuators": [{ "id": 0, "name": "Foot #1", "supported_modes": 3, "max_assignments": 1 }],
//!   "actuatorgroups": [{ "id": 0, "name": "Foot #1 + #2", "actuator1": 0, "actuator2": 1 }]
//! }
//! ```
//! - `chain_id` appears only when non-zero.
//! - `label`/`uri` are `null` until known.
//! - Actuators and groups cover every page, in page order.

use crate::device::{Device, DeviceId, DeviceStatus};
use serde::{Deserialize, Serialize};

/// Actuator as rendered for inspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorMeta {
    pub id: u8,
    pub name: String,
    /// Raw mode bits.
    pub supported_modes: u32,
    pub max_assignments: u8,
}

/// Actuator group as rendered for inspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorGroupMeta {
    pub id: u8,
    pub name: String,
    pub actuator1: u8,
    pub actuator2: u8,
}

/// Snapshot of a device's identity and layout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    #[serde(skip)]
    pub id: DeviceId,

    #[serde(skip)]
    pub status: DeviceStatus,

    pub label: Option<String>,

    /// Model URI, either from a legacy handshake or from the descriptor.
    pub uri: Option<String>,

    /// Firmware version, `major.minor.micro`.
    pub version: String,

    /// Protocol version, `major.minor`.
    pub protocol: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub chain_id: u8,

    pub amount_of_pages: u8,

    #[serde(skip)]
    pub enumeration_frame_item_count: u8,

    pub actuators: Vec<ActuatorMeta>,

    #[serde(rename = "actuatorgroups")]
    pub actuator_groups: Vec<ActuatorGroupMeta>,
}

fn is_zero(v: &u8) -> bool {
    *v == 0
}

impl From<&Device> for DeviceDescriptor {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id,
            status: device.status,
            label: device.label.clone(),
            uri: device.uri.clone(),
            version: device.firmware.to_string(),
            protocol: format!("{}.{}", device.protocol.major, device.protocol.minor),
            chain_id: device.chain_id,
            amount_of_pages: device.amount_of_pages,
            enumeration_frame_item_count: device.enumeration_frame_item_count,
            actuators: device
                .actuators
                .iter()
                .map(|a| ActuatorMeta {
                    id: a.id,
                    name: a.name.clone(),
                    supported_modes: a.supported_modes.bits(),
                    max_assignments: a.max_assignments,
                })
                .collect(),
            actuator_groups: device
                .actuator_groups
                .iter()
                .map(|g| ActuatorGroupMeta {
                    id: g.id,
                    name: g.name.clone(),
                    actuator1: g.actuators_in_group[0],
                    actuator2: g.actuators_in_group[1],
                })
                .collect(),
        }
    }
}

impl DeviceDescriptor {
    /// Render as compact JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
