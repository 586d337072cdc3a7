//! Inbound frame handling.
//!
//! [`Dispatcher`] owns the device registry (and through it every assignment
//! table) plus the application listeners. It handles one frame at a time to
//! completion and returns the frames the host must send in reply.

use crate::device::{DeviceFilter, DeviceId, DeviceStatus};
use crate::error::{Error, Result};
use crate::event::{DataUpdate, DeviceStatusEvent};
use crate::eventbus::EventBus;
use crate::frame::{Command, Frame, FrameError};
use crate::message::{self, HandshakeAck, HandshakeStatus};
use crate::registry::DeviceRegistry;
use log::{debug, warn};
use serde::Serialize;

/// Traffic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub frames_received: u64,
    pub frames_sent: u64,
    /// Checksum/truncation/unknown-command failures.
    pub wire_errors: u64,
    /// Well-formed frames that could not be applied.
    pub dropped: u64,
    pub handshakes_refused: u64,
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    registry: DeviceRegistry,
    events: EventBus,
    stats: Stats,
    max_devices_per_uri: Option<usize>,
}

impl Dispatcher {
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    pub fn with_uri_limit(mut self, limit: Option<usize>) -> Self {
        self.max_devices_per_uri = limit;
        self
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut Stats {
        &mut self.stats
    }

    /// Apply one inbound frame; returns replies to transmit.
    ///
    /// Errors are per-frame and non-fatal: the frame is dropped, counted,
    /// and processing continues with the next one.
    pub fn dispatch(&mut self, frame: &Frame) -> Result<Vec<Frame>> {
        self.stats.frames_received += 1;
        let result = match frame.command {
            Command::ChainSync => self.on_chain_sync(frame),
            Command::Handshake => self.on_handshake(frame),
            Command::DevDescriptor => self.on_descriptor(frame),
            Command::DataUpdate => self.on_data_update(frame),
            Command::Assignment | Command::Unassignment | Command::SetValue => {
                Err(FrameError::Malformed("host-only command received from the bus").into())
            }
        };
        if let Err(err) = &result {
            self.stats.dropped += 1;
            warn!("dropping {:?} frame from address {}: {err}", frame.command, frame.address);
        }
        result
    }

    /// Transport reported the device gone: disconnect, notify, discard.
    pub fn disconnect(&mut self, device_id: DeviceId) -> bool {
        let Some(device) = self.registry.get_mut(device_id) else {
            return false;
        };
        device.status = DeviceStatus::Disconnected;
        let descriptor = device.descriptor();
        self.registry.destroy(device_id);

        self.events.emit_device_status(&DeviceStatusEvent {
            device_id,
            status: DeviceStatus::Disconnected,
            descriptor: Some(descriptor),
        });
        true
    }

    /// Disconnect every device.
    pub fn disconnect_all(&mut self) {
        for id in self.registry.list(DeviceFilter::All) {
            self.disconnect(id);
        }
    }

    fn on_chain_sync(&mut self, frame: &Frame) -> Result<Vec<Frame>> {
        if frame.address == crate::frame::BROADCAST_ADDRESS {
            return Ok(Vec::new());
        }
        let chain_id = message::parse_chain_sync(&frame.payload)?;
        let device = self.registry.get_mut(frame.address).ok_or(Error::UnknownAddress {
            address: frame.address,
            command: "chain sync",
        })?;
        device.chain_id = chain_id;
        Ok(Vec::new())
    }

    fn on_handshake(&mut self, frame: &Frame) -> Result<Vec<Frame>> {
        let handshake = message::parse_handshake(&frame.payload)?;
        let refuse = |stats: &mut Stats| -> Result<Vec<Frame>> {
            stats.handshakes_refused += 1;
            Ok(vec![message::handshake_ack_frame(&HandshakeAck {
                random: handshake.random,
                status: HandshakeStatus::Refused,
                device_id: 0,
            })?])
        };

        if let (Some(limit), Some(uri)) = (self.max_devices_per_uri, handshake.uri.as_deref()) {
            if self.registry.count_by_uri(uri) >= limit {
                warn!("handshake refused: {limit} device(s) of {uri} already connected");
                return refuse(&mut self.stats);
            }
        }

        let device_id = match self.registry.create(&handshake) {
            Ok(id) => id,
            Err(err) => {
                warn!("handshake refused: {err}");
                return refuse(&mut self.stats);
            }
        };

        Ok(vec![
            message::handshake_ack_frame(&HandshakeAck {
                random: handshake.random,
                status: HandshakeStatus::Ok,
                device_id,
            })?,
            message::descriptor_request_frame(device_id)?,
        ])
    }

    fn on_descriptor(&mut self, frame: &Frame) -> Result<Vec<Frame>> {
        if self.registry.get(frame.address).is_none() {
            return Err(Error::UnknownAddress {
                address: frame.address,
                command: "descriptor",
            });
        }
        let info = message::parse_descriptor(&frame.payload)?;
        let descriptor = self.registry.set_descriptor(frame.address, &info)?.descriptor();

        self.events.emit_device_status(&DeviceStatusEvent {
            device_id: frame.address,
            status: DeviceStatus::Connected,
            descriptor: Some(descriptor),
        });
        Ok(Vec::new())
    }

    fn on_data_update(&mut self, frame: &Frame) -> Result<Vec<Frame>> {
        let device_id = frame.address;
        let connected = self
            .registry
            .get(device_id)
            .is_some_and(|d| d.status == DeviceStatus::Connected);
        if !connected {
            return Err(Error::UnknownAddress {
                address: device_id,
                command: "data update",
            });
        }

        let mut updates = message::parse_data_update(&frame.payload)?;
        for item in &mut updates {
            let is_list = match self.registry.assignment(device_id, item.assignment_id) {
                Some(assignment) => assignment.is_list(),
                None => {
                    debug!("device {device_id}: update for unknown assignment {}", item.assignment_id);
                    continue;
                }
            };

            if is_list {
                let index = item.value.max(0.0) as usize;
                let assignment = self.registry.update_list(device_id, item.assignment_id, index)?;
                item.value = assignment.value;
            } else if let Some(assignment) = self.registry.assignment_mut(device_id, item.assignment_id) {
                assignment.value = item.value;
            }
        }

        self.events.emit_data_update(&DataUpdate { device_id, updates });
        Ok(Vec::new())
    }
}
