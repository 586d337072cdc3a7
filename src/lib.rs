//! chainhost: host side of a control chain bus.
//!
//! A control chain is a serial bus of small control surfaces (footswitches,
//! expression pedals, encoders). The host enumerates the devices on the bus,
//! learns their actuator layout, lets the application bind parameters
//! ("assignments") to actuators, and reports value changes back.
//!
//! Layers, bottom up:
//! - [`frame`]: byte framing and checksums.
//! - [`message`]: payload layout per command.
//! - [`registry`] / [`device`]: the device table and connection state machine.
//! - [`assignment`]: per-device assignment tables and list windowing.
//! - [`dispatcher`]: applies inbound frames and fires listeners.
//! - [`host`]: the [`Host`] handle applications use.

pub mod assignment;
pub mod backends;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod frame;
pub mod host;
pub mod logger;
pub mod message;
pub mod metadata;
pub mod registry;

pub use assignment::*;
pub use backends::*;
pub use config::HostConfig;
pub use device::*;
pub use dispatcher::{Dispatcher, Stats};
pub use error::*;
pub use event::*;
pub use eventbus::*;
pub use frame::{Command, Frame, FrameError, FrameReader};
pub use host::Host;
pub use logger::Logger;
pub use message::SyncCycle;
pub use metadata::DeviceDescriptor;
pub use registry::DeviceRegistry;
