//! Fixed-capacity device table.
//!
//! Slots are reused: a new device always lands in the lowest free slot and gets
//! `id = slot + 1`. Destroying a device frees its slot and everything it owns,
//! including its assignment table.

use crate::device::{
    DescriptorInfo, Device, DeviceFilter, DeviceId, DeviceStatus, HandshakeInfo, CC_MAX_DEVICES,
};
use crate::error::RegistryError;
use log::debug;

/// Table of attached devices.
#[derive(Clone, Debug)]
pub struct DeviceRegistry {
    slots: Vec<Option<Device>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::with_capacity(CC_MAX_DEVICES)
    }

    /// Registry with a non-default slot count (ids stay `1..=capacity`).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(u8::MAX as usize);
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a freshly handshaken device in the lowest free slot.
    ///
    /// The new device is left in [`DeviceStatus::WaitingDescriptor`].
    pub fn create(&mut self, handshake: &HandshakeInfo) -> Result<DeviceId, RegistryError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RegistryError::Capacity(self.slots.len()))?;

        let id = (slot + 1) as DeviceId;
        let mut device = Device::from_handshake(id, handshake);
        device.advance(DeviceStatus::WaitingDescriptor)?;
        self.slots[slot] = Some(device);

        debug!(
            "device {id} created (protocol {}.{}, firmware {})",
            handshake.protocol.major, handshake.protocol.minor, handshake.firmware
        );
        Ok(id)
    }

    /// Attach the descriptor and mark the device connected.
    pub fn set_descriptor(
        &mut self,
        id: DeviceId,
        descriptor: &DescriptorInfo,
    ) -> Result<&Device, RegistryError> {
        let device = self.get_mut(id).ok_or(RegistryError::UnknownDevice(id))?;
        descriptor.validate()?;
        device.advance(DeviceStatus::Connected)?;
        device.apply_descriptor(descriptor);

        debug!(
            "device {id} connected: {:?}, {} actuator(s) x {} page(s)",
            descriptor.label,
            device.actuators_count,
            device.amount_of_pages
        );
        Ok(device)
    }

    /// Free a device slot. Destroying an unknown id does nothing.
    pub fn destroy(&mut self, id: DeviceId) -> Option<Device> {
        let slot = self.slot_of(id)?;
        let mut device = self.slots[slot].take()?;
        device.status = DeviceStatus::Disconnected;

        let released = device.assignments.as_ref().map_or(0, |t| t.len());
        debug!("device {id} destroyed ({released} assignment(s) released)");
        Some(device)
    }

    /// Drop every device.
    pub fn clear(&mut self) -> Vec<DeviceId> {
        let ids = self.list(DeviceFilter::All);
        for id in &ids {
            self.destroy(*id);
        }
        ids
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.slot_of(id).and_then(|slot| self.slots[slot].as_ref())
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        let slot = self.slot_of(id)?;
        self.slots[slot].as_mut()
    }

    /// Device ids matching `filter`, in slot order.
    pub fn list(&self, filter: DeviceFilter) -> Vec<DeviceId> {
        self.iter()
            .filter(|device| match filter {
                DeviceFilter::All => true,
                DeviceFilter::Registered => device.is_registered(),
                DeviceFilter::Unregistered => !device.is_registered(),
            })
            .map(|device| device.id)
            .collect()
    }

    /// Live devices whose URI equals `uri`.
    pub fn count_by_uri(&self, uri: &str) -> usize {
        self.iter()
            .filter(|device| device.status != DeviceStatus::Disconnected)
            .filter(|device| device.uri.as_deref() == Some(uri))
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.slots.iter().flatten()
    }

    fn slot_of(&self, id: DeviceId) -> Option<usize> {
        if id == 0 || id as usize > self.slots.len() {
            return None;
        }
        Some(id as usize - 1)
    }
}
