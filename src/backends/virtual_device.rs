use crate::device::{DescriptorInfo, DeviceId, HandshakeInfo};
use crate::event::UpdateItem;
use crate::frame::{self, Command, FrameError, BROADCAST_ADDRESS};
use crate::message::{self, HandshakeStatus};

/// Simulated control-chain device.
///
/// Produces the device half of the conversation as encoded frames, and
/// learns its id from the host's handshake ack.
#[derive(Clone, Debug, Default)]
pub struct VirtualDevice {
    handshake: HandshakeInfo,
    descriptor: DescriptorInfo,
    id: Option<DeviceId>,
}

impl VirtualDevice {
    pub fn new(handshake: HandshakeInfo, descriptor: DescriptorInfo) -> Self {
        Self {
            handshake,
            descriptor,
            id: None,
        }
    }

    /// Id granted by the host, once acked.
    pub fn id(&self) -> Option<DeviceId> {
        self.id
    }

    /// Fails if the URI does not fit its string field.
    pub fn handshake(&self) -> Result<Vec<u8>, FrameError> {
        let payload = message::encode_handshake(&self.handshake)?;
        frame::encode(BROADCAST_ADDRESS, Command::Handshake, &payload)
    }

    /// Feed the host's ack; returns the granted id if it was for us.
    pub fn accept_ack(&mut self, bytes: &[u8]) -> Result<Option<DeviceId>, FrameError> {
        let (frame, _) = frame::decode(bytes)?;
        if frame.command != Command::Handshake {
            return Ok(None);
        }
        let ack = message::parse_handshake_ack(&frame.payload)?;
        if ack.random != self.handshake.random || ack.status != HandshakeStatus::Ok {
            return Ok(None);
        }
        self.id = Some(ack.device_id);
        Ok(self.id)
    }

    /// Fails if a name or count does not fit its field.
    pub fn descriptor(&self) -> Result<Vec<u8>, FrameError> {
        let payload = message::encode_descriptor(&self.descriptor)?;
        frame::encode(self.address(), Command::DevDescriptor, &payload)
    }

    pub fn data_update(&self, updates: &[UpdateItem]) -> Vec<u8> {
        encode(self.address(), Command::DataUpdate, &message::encode_data_update(updates))
    }

    pub fn chain_sync(&self, chain_id: u8) -> Vec<u8> {
        encode(self.address(), Command::ChainSync, &[chain_id])
    }

    fn address(&self) -> u8 {
        self.id.unwrap_or(BROADCAST_ADDRESS)
    }
}

fn encode(address: u8, command: Command, payload: &[u8]) -> Vec<u8> {
    // Data updates hold at most 255 pairs and chain sync one byte; both fit a frame.
    frame::encode(address, command, payload).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{handshake_ack_frame, HandshakeAck};

    fn device(random: u16) -> VirtualDevice {
        VirtualDevice::new(
            HandshakeInfo {
                random,
                ..HandshakeInfo::default()
            },
            DescriptorInfo::default(),
        )
    }

    fn ack(random: u16, status: HandshakeStatus, device_id: DeviceId) -> Vec<u8> {
        handshake_ack_frame(&HandshakeAck {
            random,
            status,
            device_id,
        })
        .unwrap()
        .encode()
    }

    #[test]
    fn learns_id_from_matching_ack() {
        let mut dev = device(0x1234);
        assert_eq!(dev.accept_ack(&ack(0x1234, HandshakeStatus::Ok, 3)).unwrap(), Some(3));
        assert_eq!(dev.id(), Some(3));
        assert_eq!(frame::decode(&dev.chain_sync(1)).unwrap().0.address, 3);
    }

    #[test]
    fn ignores_foreign_or_refused_acks() {
        let mut dev = device(7);
        assert_eq!(dev.accept_ack(&ack(8, HandshakeStatus::Ok, 1)).unwrap(), None);
        assert_eq!(dev.accept_ack(&ack(7, HandshakeStatus::Refused, 0)).unwrap(), None);
        assert_eq!(dev.id(), None);
        assert_eq!(frame::decode(&dev.handshake().unwrap()).unwrap().0.address, BROADCAST_ADDRESS);
    }
}
