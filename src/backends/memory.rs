use crate::backends::Transport;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Shared {
    inbound: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    closed: bool,
}

/// In-process transport.
///
/// Clones share the same buffers: hand one clone to the host and keep another
/// to inject inbound bytes and inspect what the host wrote.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes for the host to read.
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().inbound.extend(bytes.iter().copied());
    }

    /// Drain every buffer the host has written, one entry per `write` call.
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.lock().written)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Transport for MemoryTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut shared = self.lock();
        if shared.closed {
            return Err(Error::Transport("memory transport closed".into()));
        }
        shared.written.push(bytes.to_vec());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut shared = self.lock();
        let n = buf.len().min(shared.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(shared.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&mut self) {
        self.lock().closed = true;
    }
}
