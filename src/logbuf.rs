//! Reader for the firmware's in-memory debug log ring.
//!
//! The firmware writes console output into the `.debug_mem_logs` region as
//! a single-producer overwrite ring keyed by sentinel bytes rather than
//! indices: a SOH byte marks where the writer started, EOT (or a NUL the
//! writer has not reached yet) marks the current end. The single consumer
//! needs no locking; it polls with a bounded sleep until bytes appear.

use crate::{Error, Result, map::HostPtr};
use std::time::{Duration, Instant};

/// Start of Header, written once the firmware logger is up.
pub const SOH: u8 = 0x01;
/// End of Transmission, trails the most recent output.
pub const EOT: u8 = 0x04;

/// The located `.debug_mem_logs` region.
#[derive(Debug, Clone, Copy)]
pub struct DebugRam {
    host: HostPtr,
    len: usize,
}

impl DebugRam {
    #[must_use]
    pub const fn new(host: HostPtr, len: usize) -> Self {
        Self { host, len }
    }

    fn read(&self, index: usize) -> u8 {
        debug_assert!(index < self.len);
        // SAFETY: index is within the located region, which the platform
        // keeps mapped for the subsystem lifetime. Volatile, the firmware
        // writes concurrently.
        unsafe { self.host.as_ptr().add(index).read_volatile() }
    }
}

/// Streaming reader over a [`DebugRam`] ring.
#[derive(Debug)]
pub struct DebugLogReader {
    ram: DebugRam,
    cursor: usize,
    poll: Duration,
}

impl DebugLogReader {
    /// Attaches to the ring, waiting for the writer's SOH marker.
    ///
    /// ## Errors
    ///
    /// Returns `Error::Timeout` if the firmware logger does not come up
    /// within `timeout`.
    pub fn attach(ram: DebugRam, poll: Duration, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(start) = (0..ram.len).find(|&i| ram.read(i) == SOH) {
                return Ok(Self {
                    ram,
                    cursor: start,
                    poll,
                });
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout("debug log writer start marker"));
            }
            std::thread::sleep(poll);
        }
    }

    /// Reads the next logged byte, blocking up to `timeout` for the writer.
    ///
    /// ## Errors
    ///
    /// Returns `Error::Timeout` when the writer produced nothing new before
    /// the deadline.
    pub fn read_byte(&mut self, timeout: Duration) -> Result<u8> {
        let deadline = Instant::now() + timeout;
        loop {
            let byte = self.ram.read(self.cursor);
            if byte != EOT && byte != 0 {
                self.cursor = (self.cursor + 1) % self.ram.len;
                return Ok(byte);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout("debug log bytes"));
            }
            std::thread::sleep(self.poll);
        }
    }
}
