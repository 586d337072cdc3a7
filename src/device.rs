//! Device model.
//!
//! A [`Device`] is one control surface on the chain. It is created when its
//! handshake arrives, filled in when its descriptor arrives, and discarded as a
//! whole (actuators, groups and assignments included) when it goes away.
//!
//! ## Paging
//! Devices with more logical controls than physical ones expose *pages*. The
//! descriptor only lists the base page; the registry repeats that layout
//! `amount_of_pages` times, so actuator `n` on page `p` has id
//! `n + p * actuators_count` and the flat actuator array has
//! `actuators_count * amount_of_pages` entries.

use crate::assignment::{ActuatorId, AssignmentTable};
use crate::error::RegistryError;
use crate::metadata::DeviceDescriptor;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device id on the bus. `0` is never a live device.
pub type DeviceId = u8;

/// Number of device slots on one chain.
pub const CC_MAX_DEVICES: usize = 8;

bitflags! {
    /// Actuator/assignment mode bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Mode: u32 {
        const TOGGLE = 0x001;
        const TRIGGER = 0x002;
        const OPTIONS = 0x004;
        const TAP_TEMPO = 0x008;
        const REAL = 0x010;
        const INTEGER = 0x020;
        const LOGARITHMIC = 0x040;
        const MOMENTARY = 0x080;
        const COLOURED = 0x100;
        const REVERSE = 0x200;
        const GROUP = 0x400;
    }
}

/// Connection state. Only ever moves forward; a disconnect discards the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeviceStatus {
    #[default]
    Disconnected,
    WaitingHandshake,
    WaitingDescriptor,
    Connected,
}

/// Filter for [`DeviceRegistry::list`](crate::registry::DeviceRegistry::list).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFilter {
    All,
    /// Descriptor received (device has a label).
    Registered,
    /// Handshaken but still waiting for its descriptor.
    Unregistered,
}

/// `major.minor.micro`; protocol versions leave `micro` at zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub micro: u8,
}

impl Version {
    pub fn new(major: u8, minor: u8, micro: u8) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Identity announced in a handshake.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// Device-chosen nonce, echoed back in the ack.
    pub random: u16,
    pub protocol: Version,
    pub firmware: Version,
    /// Only sent by legacy (pre-descriptor-URI) firmware.
    pub uri: Option<String>,
}

/// A physical control element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actuator {
    pub id: ActuatorId,
    pub name: String,
    pub supported_modes: Mode,
    pub max_assignments: u8,
    /// Live assignments bound to this actuator.
    #[serde(skip)]
    pub assignments_count: u8,
}

impl Actuator {
    pub fn is_full(&self) -> bool {
        self.assignments_count >= self.max_assignments
    }
}

/// Two actuators acting as one control (e.g. increment/decrement).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorGroup {
    pub id: u8,
    pub name: String,
    pub actuators_in_group: [ActuatorId; 2],
}

/// Base-page layout as sent by the device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DescriptorInfo {
    pub label: String,
    pub actuators: Vec<Actuator>,
    pub actuator_groups: Vec<ActuatorGroup>,
    pub amount_of_pages: u8,
    pub enumeration_frame_item_count: u8,
    /// Newer firmware carries the URI here rather than in the handshake.
    pub uri: Option<String>,
}

impl DescriptorInfo {
    /// Every page-expanded id must fit in a byte and groups must name real actuators.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let pages = self.amount_of_pages.max(1) as usize;
        if self.actuators.len() * pages > u8::MAX as usize + 1 {
            return Err(RegistryError::InvalidDescriptor("too many paged actuators"));
        }
        if self.actuator_groups.len() * pages > u8::MAX as usize + 1 {
            return Err(RegistryError::InvalidDescriptor("too many paged actuator groups"));
        }
        let mut members = self.actuator_groups.iter().flat_map(|g| g.actuators_in_group);
        if members.any(|m| m as usize >= self.actuators.len()) {
            return Err(RegistryError::InvalidDescriptor(
                "actuator group references missing actuator",
            ));
        }
        Ok(())
    }
}

/// One device slot's contents.
#[derive(Clone, Debug, Default)]
pub struct Device {
    pub id: DeviceId,
    pub status: DeviceStatus,
    pub protocol: Version,
    pub firmware: Version,
    pub uri: Option<String>,
    pub label: Option<String>,
    pub amount_of_pages: u8,
    pub chain_id: u8,
    pub enumeration_frame_item_count: u8,
    /// Actuators on one page.
    pub actuators_count: usize,
    /// Groups on one page.
    pub actuator_groups_count: usize,
    /// All pages, flattened; index == actuator id.
    pub actuators: Vec<Actuator>,
    pub actuator_groups: Vec<ActuatorGroup>,
    /// Allocated on first assignment.
    pub(crate) assignments: Option<AssignmentTable>,
}

impl Device {
    pub(crate) fn from_handshake(id: DeviceId, handshake: &HandshakeInfo) -> Self {
        Self {
            id,
            status: DeviceStatus::WaitingHandshake,
            protocol: handshake.protocol,
            firmware: handshake.firmware,
            uri: handshake.uri.clone(),
            amount_of_pages: 1,
            ..Self::default()
        }
    }

    /// Move the connection state machine forward.
    pub(crate) fn advance(&mut self, to: DeviceStatus) -> Result<(), RegistryError> {
        if to <= self.status || to == DeviceStatus::Disconnected {
            return Err(RegistryError::InvalidTransition {
                device_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Descriptor received.
    pub fn is_registered(&self) -> bool {
        self.label.is_some()
    }

    /// Size of the flat actuator array across all pages.
    pub fn total_actuators(&self) -> usize {
        self.actuators_count * self.amount_of_pages.max(1) as usize
    }

    pub fn actuator(&self, id: ActuatorId) -> Option<&Actuator> {
        self.actuators.get(id as usize)
    }

    pub fn assignments(&self) -> Option<&AssignmentTable> {
        self.assignments.as_ref()
    }

    /// Install the descriptor, expanding pages.
    ///
    /// Ids come from list positions; the caller has run
    /// [`DescriptorInfo::validate`].
    pub(crate) fn apply_descriptor(&mut self, descriptor: &DescriptorInfo) {
        let pages = descriptor.amount_of_pages.max(1);
        let per_page = descriptor.actuators.len();
        let groups_per_page = descriptor.actuator_groups.len();

        self.label = Some(descriptor.label.clone());
        if descriptor.uri.is_some() {
            self.uri = descriptor.uri.clone();
        }
        self.amount_of_pages = pages;
        self.enumeration_frame_item_count = descriptor.enumeration_frame_item_count;
        self.actuators_count = per_page;
        self.actuator_groups_count = groups_per_page;

        self.actuators = Vec::with_capacity(per_page * pages as usize);
        self.actuator_groups = Vec::with_capacity(groups_per_page * pages as usize);

        for page in 0..pages as usize {
            let actuator_offset = page * per_page;
            let group_offset = page * groups_per_page;

            for (position, actuator) in descriptor.actuators.iter().enumerate() {
                self.actuators.push(Actuator {
                    id: (position + actuator_offset) as ActuatorId,
                    assignments_count: 0,
                    ..actuator.clone()
                });
            }

            for (position, group) in descriptor.actuator_groups.iter().enumerate() {
                let [a, b] = group.actuators_in_group;
                self.actuator_groups.push(ActuatorGroup {
                    id: (position + group_offset) as u8,
                    name: group.name.clone(),
                    actuators_in_group: [
                        (a as usize + actuator_offset) as ActuatorId,
                        (b as usize + actuator_offset) as ActuatorId,
                    ],
                });
            }
        }
    }

    /// Inspection view used by callbacks and JSON rendering.
    pub fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor::from(self)
    }
}
