use crate::event::{DataUpdate, DeviceStatusEvent};

/// Reacts to devices connecting and disconnecting.
pub trait DeviceStatusListener: Send {
    fn on_device_status(&mut self, event: &DeviceStatusEvent);
}

/// Reacts to value batches reported by devices.
pub trait DataUpdateListener: Send {
    fn on_data_update(&mut self, update: &DataUpdate);
}

impl<F> DeviceStatusListener for F
where
    F: FnMut(&DeviceStatusEvent) + Send,
{
    fn on_device_status(&mut self, event: &DeviceStatusEvent) {
        self(event)
    }
}

impl<F> DataUpdateListener for F
where
    F: FnMut(&DataUpdate) + Send,
{
    fn on_data_update(&mut self, update: &DataUpdate) {
        self(update)
    }
}

/// Single-slot listener registry: one listener per event kind, last one wins.
///
/// Listeners run synchronously on the dispatching thread while the host's
/// state lock is held, so they must not call back into the host.
#[derive(Default)]
pub struct EventBus {
    device_status: Option<Box<dyn DeviceStatusListener>>,
    data_update: Option<Box<dyn DataUpdateListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the device-status listener, replacing any previous one.
    pub fn set_device_status(&mut self, listener: impl DeviceStatusListener + 'static) {
        self.device_status = Some(Box::new(listener));
    }

    /// Install the data-update listener, replacing any previous one.
    pub fn set_data_update(&mut self, listener: impl DataUpdateListener + 'static) {
        self.data_update = Some(Box::new(listener));
    }

    pub fn clear(&mut self) {
        self.device_status = None;
        self.data_update = None;
    }

    pub(crate) fn emit_device_status(&mut self, event: &DeviceStatusEvent) {
        if let Some(listener) = self.device_status.as_mut() {
            listener.on_device_status(event);
        }
    }

    /// Whole batch in one call.
    pub(crate) fn emit_data_update(&mut self, update: &DataUpdate) {
        if let Some(listener) = self.data_update.as_mut() {
            listener.on_data_update(update);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("device_status", &self.device_status.is_some())
            .field("data_update", &self.data_update.is_some())
            .finish()
    }
}
