use crate::event::{DataUpdate, DeviceStatusEvent};
use crate::eventbus::{DataUpdateListener, DeviceStatusListener};
use log::info;

/// A listener that writes every event to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Logger
    }
}

impl DeviceStatusListener for Logger {
    fn on_device_status(&mut self, event: &DeviceStatusEvent) {
        let label = event
            .descriptor
            .as_ref()
            .and_then(|d| d.label.as_deref())
            .unwrap_or("<unregistered>");
        info!("[device {}] {:?} ({label})", event.device_id, event.status);
    }
}

impl DataUpdateListener for Logger {
    fn on_data_update(&mut self, update: &DataUpdate) {
        for item in &update.updates {
            info!(
                "[device {}] assignment {} = {}",
                update.device_id, item.assignment_id, item.value
            );
        }
    }
}
