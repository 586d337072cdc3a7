//! Payload encoding for each command.
//!
//! All multi-byte fields are little-endian. Strings are length-prefixed:
//! `[len:u8][utf-8 bytes]`.
//!
//! Device → host: handshake, descriptor, data update, chain sync.
//! Host → device: handshake ack, descriptor request, assignment, unassignment,
//! set value, chain sync.
//!
//! Both directions are implemented so the in-process [`VirtualDevice`] can speak
//! the device side of the conversation.
//!
//! [`VirtualDevice`]: crate::backends::VirtualDevice

use crate::assignment::{ActuatorId, Assignment, AssignmentId};
use crate::device::{
    Actuator, ActuatorGroup, DescriptorInfo, DeviceId, HandshakeInfo, Mode, Version,
};
use crate::event::UpdateItem;
use crate::frame::{Command, Frame, FrameError, BROADCAST_ADDRESS};

/// `pair_id` value meaning "not paired".
pub const NO_PAIR: u8 = 0xFF;

/// Handshake ack status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeStatus {
    Ok = 0,
    /// No slot (or model instance limit reached); `device_id` is 0.
    Refused = 1,
}

/// Host's reply to a handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandshakeAck {
    pub random: u16,
    pub status: HandshakeStatus,
    pub device_id: DeviceId,
}

/// Chain sync cycle announced by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncCycle {
    Regular = 0,
    /// Devices without an id may handshake during this cycle.
    Handshake = 1,
}

/// Cursor over a payload.
pub struct PayloadReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        if self.remaining() < n {
            return Err(FrameError::Truncated);
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, FrameError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, FrameError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f32(&mut self) -> Result<f32, FrameError> {
        Ok(f32::from_bits(self.u32()?))
    }

    pub fn string(&mut self) -> Result<String, FrameError> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::Malformed("string is not utf-8"))
    }
}

/// Payload builder.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    bytes: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.bytes.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.u32(v.to_bits())
    }

    /// Fails on strings longer than 255 bytes rather than cutting them.
    pub fn string(&mut self, s: &str) -> Result<&mut Self, FrameError> {
        let len = u8::try_from(s.len()).map_err(|_| FrameError::StringTooLong(s.len()))?;
        self.u8(len);
        self.bytes.extend_from_slice(s.as_bytes());
        Ok(self)
    }

    /// A count or index in a one-byte field.
    pub fn u8_field(&mut self, field: &'static str, value: usize) -> Result<&mut Self, FrameError> {
        let v = u8::try_from(value).map_err(|_| FrameError::FieldOverflow { field, value })?;
        Ok(self.u8(v))
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

// ---- device -> host -------------------------------------------------------

pub fn parse_handshake(payload: &[u8]) -> Result<HandshakeInfo, FrameError> {
    let mut r = PayloadReader::new(payload);
    let random = r.u16()?;
    let protocol = Version::new(r.u8()?, r.u8()?, 0);
    let firmware = Version::new(r.u8()?, r.u8()?, r.u8()?);
    let uri = if r.remaining() > 0 {
        Some(r.string()?)
    } else {
        None
    };
    Ok(HandshakeInfo {
        random,
        protocol,
        firmware,
        uri,
    })
}

pub fn encode_handshake(info: &HandshakeInfo) -> Result<Vec<u8>, FrameError> {
    let mut w = PayloadWriter::new();
    w.u16(info.random)
        .u8(info.protocol.major)
        .u8(info.protocol.minor)
        .u8(info.firmware.major)
        .u8(info.firmware.minor)
        .u8(info.firmware.micro);
    if let Some(uri) = &info.uri {
        w.string(uri)?;
    }
    Ok(w.finish())
}

pub fn parse_descriptor(payload: &[u8]) -> Result<DescriptorInfo, FrameError> {
    let mut r = PayloadReader::new(payload);
    let label = r.string()?;

    let actuators_count = r.u8()?;
    let mut actuators = Vec::with_capacity(actuators_count as usize);
    for position in 0..actuators_count {
        if r.u8()? != position {
            return Err(FrameError::Malformed("actuator ids must follow descriptor order"));
        }
        actuators.push(Actuator {
            id: position,
            name: r.string()?,
            supported_modes: Mode::from_bits_truncate(r.u32()?),
            max_assignments: r.u8()?,
            assignments_count: 0,
        });
    }

    let groups_count = r.u8()?;
    let mut actuator_groups = Vec::with_capacity(groups_count as usize);
    for position in 0..groups_count {
        if r.u8()? != position {
            return Err(FrameError::Malformed("actuator group ids must follow descriptor order"));
        }
        let id = position;
        let name = r.string()?;
        let members = [r.u8()?, r.u8()?];
        if members.iter().any(|m| *m >= actuators_count) {
            return Err(FrameError::Malformed("actuator group references missing actuator"));
        }
        actuator_groups.push(ActuatorGroup {
            id,
            name,
            actuators_in_group: members,
        });
    }

    let amount_of_pages = r.u8()?.max(1);
    let enumeration_frame_item_count = r.u8()?;
    let uri = if r.remaining() > 0 {
        Some(r.string()?)
    } else {
        None
    };

    if actuators_count as usize * amount_of_pages as usize > u8::MAX as usize + 1 {
        return Err(FrameError::Malformed("too many paged actuators"));
    }
    if groups_count as usize * amount_of_pages as usize > u8::MAX as usize + 1 {
        return Err(FrameError::Malformed("too many paged actuator groups"));
    }

    Ok(DescriptorInfo {
        label,
        actuators,
        actuator_groups,
        amount_of_pages,
        enumeration_frame_item_count,
        uri,
    })
}

pub fn encode_descriptor(info: &DescriptorInfo) -> Result<Vec<u8>, FrameError> {
    let mut w = PayloadWriter::new();
    w.string(&info.label)?
        .u8_field("actuator count", info.actuators.len())?;
    for a in &info.actuators {
        w.u8(a.id)
            .string(&a.name)?
            .u32(a.supported_modes.bits())
            .u8(a.max_assignments);
    }
    w.u8_field("actuator group count", info.actuator_groups.len())?;
    for g in &info.actuator_groups {
        w.u8(g.id)
            .string(&g.name)?
            .u8(g.actuators_in_group[0])
            .u8(g.actuators_in_group[1]);
    }
    w.u8(info.amount_of_pages).u8(info.enumeration_frame_item_count);
    if let Some(uri) = &info.uri {
        w.string(uri)?;
    }
    Ok(w.finish())
}

/// Batch of `(assignment_id, value)` pairs, order preserved.
pub fn parse_data_update(payload: &[u8]) -> Result<Vec<UpdateItem>, FrameError> {
    let mut r = PayloadReader::new(payload);
    let count = r.u8()?;
    let mut updates = Vec::with_capacity(count as usize);
    for _ in 0..count {
        updates.push(UpdateItem {
            assignment_id: r.u8()?,
            value: r.f32()?,
        });
    }
    Ok(updates)
}

/// At most 255 pairs fit in one frame; the count always matches what is written.
pub fn encode_data_update(updates: &[UpdateItem]) -> Vec<u8> {
    let count = updates.len().min(u8::MAX as usize);
    let mut w = PayloadWriter::new();
    w.u8(count as u8);
    for u in &updates[..count] {
        w.u8(u.assignment_id).f32(u.value);
    }
    w.finish()
}

/// Device chain sync carries the device's chain position.
pub fn parse_chain_sync(payload: &[u8]) -> Result<u8, FrameError> {
    PayloadReader::new(payload).u8()
}

// ---- host -> device -------------------------------------------------------

pub fn handshake_ack_frame(ack: &HandshakeAck) -> Result<Frame, FrameError> {
    let payload = PayloadWriter::new()
        .u16(ack.random)
        .u8(ack.status as u8)
        .u8(ack.device_id)
        .finish();
    Frame::new(BROADCAST_ADDRESS, Command::Handshake, payload)
}

pub fn parse_handshake_ack(payload: &[u8]) -> Result<HandshakeAck, FrameError> {
    let mut r = PayloadReader::new(payload);
    let random = r.u16()?;
    let status = match r.u8()? {
        0 => HandshakeStatus::Ok,
        1 => HandshakeStatus::Refused,
        _ => return Err(FrameError::Malformed("unknown handshake status")),
    };
    Ok(HandshakeAck {
        random,
        status,
        device_id: r.u8()?,
    })
}

/// Empty descriptor frame: "send me your descriptor".
pub fn descriptor_request_frame(device_id: DeviceId) -> Result<Frame, FrameError> {
    Frame::new(device_id, Command::DevDescriptor, Vec::new())
}

fn write_list_window(w: &mut PayloadWriter, assignment: &Assignment) -> Result<(), FrameError> {
    w.u8_field("list index", assignment.list_index)?
        .u8_field("enumeration frame min", assignment.enumeration_frame_min)?
        .u8_field("enumeration frame max", assignment.enumeration_frame_max)?;
    for item in assignment.visible_items() {
        w.string(&item.label)?.f32(item.value);
    }
    Ok(())
}

pub fn assignment_frame(assignment: &Assignment) -> Result<Frame, FrameError> {
    let mut w = PayloadWriter::new();
    w.u8(assignment.id)
        .u8(assignment.actuator_id)
        .string(&assignment.label)?
        .f32(assignment.value)
        .f32(assignment.min)
        .f32(assignment.max)
        .f32(assignment.default)
        .u32(assignment.mode.bits())
        .u16(assignment.steps)
        .string(&assignment.unit)?
        .u8_field("list count", assignment.list_count())?;
    if assignment.is_list() {
        write_list_window(&mut w, assignment)?;
    }
    w.u8(assignment.assignment_pair_id.unwrap_or(NO_PAIR));
    Frame::new(assignment.device_id, Command::Assignment, w.finish())
}

pub fn unassignment_frame(device_id: DeviceId, id: AssignmentId) -> Result<Frame, FrameError> {
    Frame::new(device_id, Command::Unassignment, vec![id])
}

pub fn set_value_frame(assignment: &Assignment) -> Result<Frame, FrameError> {
    let mut w = PayloadWriter::new();
    w.u8(assignment.id)
        .u8(assignment.actuator_id)
        .f32(assignment.value);
    if assignment.is_list() {
        write_list_window(&mut w, assignment)?;
    }
    Frame::new(assignment.device_id, Command::SetValue, w.finish())
}

pub fn chain_sync_frame(cycle: SyncCycle) -> Result<Frame, FrameError> {
    Frame::new(BROADCAST_ADDRESS, Command::ChainSync, vec![cycle as u8])
}

/// Fields of an assignment frame a device cares about.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignmentHeader {
    pub id: AssignmentId,
    pub actuator_id: ActuatorId,
    pub label: String,
    pub value: f32,
    pub mode: Mode,
    pub list_count: u8,
    pub window: Option<(u8, u8, u8)>,
    pub visible_items: Vec<(String, f32)>,
}

/// Device-side view of an assignment frame.
pub fn parse_assignment(payload: &[u8]) -> Result<AssignmentHeader, FrameError> {
    let mut r = PayloadReader::new(payload);
    let id = r.u8()?;
    let actuator_id = r.u8()?;
    let label = r.string()?;
    let value = r.f32()?;
    let _min = r.f32()?;
    let _max = r.f32()?;
    let _default = r.f32()?;
    let mode = Mode::from_bits_truncate(r.u32()?);
    let _steps = r.u16()?;
    let _unit = r.string()?;
    let list_count = r.u8()?;

    let mut window = None;
    let mut visible_items = Vec::new();
    // A bare pair id is all that follows a non-list assignment.
    if mode.contains(Mode::OPTIONS) && list_count > 0 {
        let (index, min, max) = (r.u8()?, r.u8()?, r.u8()?);
        if min > max || max > list_count {
            return Err(FrameError::Malformed("enumeration frame out of range"));
        }
        for _ in min..max {
            visible_items.push((r.string()?, r.f32()?));
        }
        window = Some((index, min, max));
    }

    Ok(AssignmentHeader {
        id,
        actuator_id,
        label,
        value,
        mode,
        list_count,
        window,
        visible_items,
    })
}
