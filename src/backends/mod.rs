//! Transport backends for `chainhost`.
//!
//! The engine never touches a serial port directly; it reads and writes whole
//! byte buffers through [`Transport`]. Opening the port, configuring the baud
//! rate and detecting cable pulls are the transport's business.
//!
//! # Feature flags
//! - **`virtual`** (default): [`MemoryTransport`] and [`VirtualDevice`], an
//!   in-process bus for tests and simulation.

use crate::error::Result;

#[cfg(feature = "virtual")]
#[cfg_attr(docsrs, doc(cfg(feature = "virtual")))]
pub mod memory;

#[cfg(feature = "virtual")]
#[cfg_attr(docsrs, doc(cfg(feature = "virtual")))]
pub mod virtual_device;

#[cfg(feature = "virtual")]
pub use memory::MemoryTransport;
#[cfg(feature = "virtual")]
pub use virtual_device::VirtualDevice;

/// Byte-level link to the bus.
pub trait Transport: Send {
    /// Write one encoded frame.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read whatever is available into `buf`; `Ok(0)` when nothing is pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Release the underlying port.
    fn close(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
