//! The application-facing handle.
//!
//! [`Host`] ties a [`Transport`] to the [`Dispatcher`]: inbound bytes are
//! framed and dispatched, and the outbound calls (`assign`, `unassign`,
//! `set_value`) mutate the tables and emit exactly one frame each. Nothing
//! waits for the device to acknowledge; data updates are the only feedback.
//!
//! # Locking
//! All state sits behind one mutex, so inbound processing and API calls never
//! interleave on the same tables. Listeners run while that lock is held and
//! must not call back into the `Host`.
//!
//! # Example
//! ```no_run
//! use chainhost::{Host, HostConfig, MemoryTransport, Logger};
//!
//! let host = Host::init(HostConfig::default(), MemoryTransport::new()).expect("init");
//! host.on_device_status(Logger::new());
//! host.on_data_update(Logger::new());
//! loop {
//!     host.poll().ok();
//!     # break;
//! }
//! host.finish();
//! ```

use crate::assignment::{Assignment, AssignmentId, AssignmentKey, SetValue};
use crate::backends::Transport;
use crate::config::HostConfig;
use crate::device::{DeviceFilter, DeviceId};
use crate::dispatcher::{Dispatcher, Stats};
use crate::error::{AssignmentError, Error, Result};
use crate::eventbus::{DataUpdateListener, DeviceStatusListener};
use crate::frame::{Frame, FrameReader};
use crate::message::{self, SyncCycle};
use crate::registry::DeviceRegistry;
use log::{debug, info, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(feature = "debug-log")]
use log::trace;

const READ_CHUNK: usize = 256;

struct Inner {
    config: HostConfig,
    dispatcher: Dispatcher,
    transport: Box<dyn Transport>,
    reader: FrameReader,
}

impl Inner {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode();
        #[cfg(feature = "debug-log")]
        trace!("tx {:?} -> {}: {:02x?}", frame.command, frame.address, bytes);

        self.transport.write(&bytes)?;
        self.dispatcher.stats_mut().frames_sent += 1;
        Ok(())
    }

    /// Dispatch every complete frame in the reader.
    fn drain_frames(&mut self) -> usize {
        let mut handled = 0;
        while let Some(next) = self.reader.next_frame() {
            let frame = match next {
                Ok(frame) => frame,
                Err(err) => {
                    self.dispatcher.stats_mut().wire_errors += 1;
                    warn!("discarding bad frame: {err}");
                    continue;
                }
            };

            #[cfg(feature = "debug-log")]
            trace!("rx {:?} <- {}: {:02x?}", frame.command, frame.address, frame.payload);

            handled += 1;
            let Ok(replies) = self.dispatcher.dispatch(&frame) else {
                continue;
            };
            for reply in replies {
                if let Err(err) = self.send(&reply) {
                    warn!("failed to send {:?} to {}: {err}", reply.command, reply.address);
                }
            }
        }
        handled
    }
}

/// Handle to one control chain.
pub struct Host {
    inner: Mutex<Inner>,
}

impl Host {
    /// Start a host on an already-opened transport.
    pub fn init(config: HostConfig, transport: impl Transport + 'static) -> Result<Self> {
        config.validate()?;
        info!("control chain host on {} @ {} baud", config.port, config.baudrate);

        let dispatcher =
            Dispatcher::new(DeviceRegistry::new()).with_uri_limit(config.max_devices_per_uri);
        Ok(Self {
            inner: Mutex::new(Inner {
                config,
                dispatcher,
                transport: Box::new(transport),
                reader: FrameReader::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Disconnect every device (listeners see each one go) and close the transport.
    pub fn finish(self) {
        let mut inner = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        inner.dispatcher.disconnect_all();
        inner.dispatcher.events_mut().clear();
        inner.reader.clear();
        inner.transport.close();
        info!("control chain host on {} closed", inner.config.port);
    }

    pub fn config(&self) -> HostConfig {
        self.lock().config.clone()
    }

    /// Read whatever the transport has and dispatch complete frames.
    ///
    /// Returns the number of frames handled. Bad frames are logged and
    /// skipped; only a transport read failure is returned as an error.
    pub fn poll(&self) -> Result<usize> {
        let mut inner = self.lock();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = inner.transport.read(&mut buf)?;
            if n == 0 {
                break;
            }
            inner.reader.extend(&buf[..n]);
        }
        Ok(inner.drain_frames())
    }

    /// Dispatch bytes received by some other means.
    pub fn feed(&self, bytes: &[u8]) -> usize {
        let mut inner = self.lock();
        inner.reader.extend(bytes);
        inner.drain_frames()
    }

    /// Bind a parameter to an actuator and send it to the device.
    ///
    /// Nothing is stored if validation fails or the frame cannot be written.
    pub fn assign(&self, assignment: &Assignment) -> Result<AssignmentId> {
        let mut inner = self.lock();
        let device_id = assignment.device_id;
        let id = inner.dispatcher.registry_mut().add_assignment(assignment)?;

        let frame = match inner.dispatcher.registry().assignment(device_id, id) {
            Some(stored) => message::assignment_frame(stored).map_err(Error::from),
            None => Err(AssignmentError::NotFound {
                device_id,
                assignment_id: id,
            }
            .into()),
        };
        let sent = frame.and_then(|frame| inner.send(&frame));

        if let Err(err) = sent {
            inner.dispatcher.registry_mut().remove_assignment(device_id, id).ok();
            return Err(err);
        }
        Ok(id)
    }

    /// Release an assignment and tell the device.
    ///
    /// The assignment stays in place if the frame cannot be written.
    pub fn unassign(&self, key: AssignmentKey) -> Result<AssignmentId> {
        let mut inner = self.lock();
        if !inner.dispatcher.registry().check_assignment(key.device_id, key.id) {
            return Err(AssignmentError::NotFound {
                device_id: key.device_id,
                assignment_id: key.id,
            }
            .into());
        }
        inner.send(&message::unassignment_frame(key.device_id, key.id)?)?;
        let id = inner
            .dispatcher
            .registry_mut()
            .remove_assignment(key.device_id, key.id)?;
        Ok(id)
    }

    /// Change an assignment's value from the host side.
    ///
    /// For list assignments the value selects the matching item (the current
    /// selection is kept when nothing matches) and the window follows it.
    pub fn set_value(&self, update: &SetValue) -> Result<AssignmentId> {
        let mut inner = self.lock();
        let registry = inner.dispatcher.registry_mut();
        let not_found = AssignmentError::NotFound {
            device_id: update.device_id,
            assignment_id: update.assignment_id,
        };

        let assignment = registry
            .assignment_mut(update.device_id, update.assignment_id)
            .ok_or(not_found)?;
        if assignment.actuator_id != update.actuator_id {
            return Err(AssignmentError::InvalidActuator {
                device_id: update.device_id,
                actuator_id: update.actuator_id,
            }
            .into());
        }

        let frame = if assignment.is_list() {
            let index = assignment
                .index_of_value(update.value)
                .unwrap_or(assignment.list_index);
            message::set_value_frame(registry.update_list(update.device_id, update.assignment_id, index)?)?
        } else {
            assignment.value = update.value;
            message::set_value_frame(assignment)?
        };

        inner.send(&frame)?;
        debug!(
            "device {}: assignment {} set to {}",
            update.device_id, update.assignment_id, update.value
        );
        Ok(update.assignment_id)
    }

    /// Link two assignments as one logical control.
    pub fn set_pair(&self, device_id: DeviceId, assignment_id: AssignmentId, pair_id: AssignmentId) -> bool {
        self.lock()
            .dispatcher
            .registry_mut()
            .set_pair_id(device_id, assignment_id, pair_id)
    }

    /// Register the device-status listener (replaces the previous one).
    pub fn on_device_status(&self, listener: impl DeviceStatusListener + 'static) {
        self.lock().dispatcher.events_mut().set_device_status(listener);
    }

    /// Register the data-update listener (replaces the previous one).
    pub fn on_data_update(&self, listener: impl DataUpdateListener + 'static) {
        self.lock().dispatcher.events_mut().set_data_update(listener);
    }

    /// JSON rendering of a device's descriptor.
    pub fn device_descriptor(&self, device_id: DeviceId) -> Option<String> {
        let inner = self.lock();
        let descriptor = inner.dispatcher.registry().get(device_id)?.descriptor();
        match descriptor.to_json() {
            Ok(json) => Some(json),
            Err(err) => {
                warn!("device {device_id}: descriptor rendering failed: {err}");
                None
            }
        }
    }

    pub fn device_list(&self, filter: DeviceFilter) -> Vec<DeviceId> {
        self.lock().dispatcher.registry().list(filter)
    }

    /// Transport noticed the device is gone.
    pub fn disconnect(&self, device_id: DeviceId) -> bool {
        self.lock().dispatcher.disconnect(device_id)
    }

    /// Broadcast a chain sync.
    pub fn sync(&self, cycle: SyncCycle) -> Result<()> {
        self.lock().send(&message::chain_sync_frame(cycle)?)
    }

    pub fn stats(&self) -> Stats {
        self.lock().dispatcher.stats()
    }

    /// Read-only access to the tables, under the host lock.
    pub fn with_registry<R>(&self, f: impl FnOnce(&DeviceRegistry) -> R) -> R {
        f(self.lock().dispatcher.registry())
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Host")
            .field("config", &inner.config)
            .field("devices", &inner.dispatcher.registry().len())
            .field("stats", &inner.dispatcher.stats())
            .finish()
    }
}
