//! Device-address to host-address mapping table.
//!
//! Firmware segments and shared regions are addressed in the coprocessor's
//! device address space. The platform layer registers each physically
//! reserved memory region it maps for the coprocessor, and every later
//! consumer (segment loader, mailbox, dynamic app memory) resolves device
//! addresses through [`RegionTable::translate`].

use crate::{Error, Result};
use core::ptr::NonNull;

/// Maximum number of load mappings supported.
pub const REGION_CAPACITY: usize = 20;

/// An opaque handle to host-addressable memory backing a device region.
///
/// The pointee is owned by the platform layer and must stay valid and
/// exclusively reserved for the coprocessor subsystem for its whole
/// lifetime. All accesses performed through a `HostPtr` happen after the
/// owning region was registered, so the usual boot-phase ordering
/// (registration happens-before translation) makes sharing sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPtr(NonNull<u8>);

// SAFETY: see the ownership invariant above. The subsystem never aliases
// a region with anything but itself, and writers are confined to the
// single-threaded boot sequence.
unsafe impl Send for HostPtr {}
unsafe impl Sync for HostPtr {}

impl HostPtr {
    #[must_use]
    #[inline]
    pub const fn new(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// Creates a handle covering a host buffer.
    #[must_use]
    #[inline]
    pub const fn from_mut_slice(buf: &mut [u8]) -> Self {
        Self(NonNull::from_mut(buf).cast())
    }

    #[must_use]
    #[inline]
    pub const fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Offsets the handle by `offset` bytes.
    ///
    /// # Safety
    ///
    /// `offset` must stay within the registered region the handle was
    /// derived from.
    #[must_use]
    pub(crate) const unsafe fn byte_add(self, offset: usize) -> Self {
        Self(unsafe { self.0.add(offset) })
    }
}

/// An inclusive device-address range backed by directly accessible RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRange {
    start: u64,
    end: u64,
}

impl DeviceRange {
    /// Creates a range covering `start..=end`.
    #[must_use]
    #[inline]
    pub const fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    #[must_use]
    #[inline]
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr <= self.end
    }
}

/// Identifier of a registered region, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionId(usize);

#[derive(Debug, Clone, Copy)]
struct RegionEntry {
    device_addr: u64,
    host: HostPtr,
    len: u32,
}

impl RegionEntry {
    const fn overlaps(&self, device_addr: u64, len: u32) -> bool {
        let self_end = self.device_addr + self.len as u64;
        let other_end = device_addr + len as u64;
        device_addr < self_end && self.device_addr < other_end
    }
}

/// Append-only table of device-to-host mappings.
///
/// Entries are scanned in registration order and the first entry fully
/// covering a requested range wins. Overlapping registrations are accepted
/// for compatibility with existing firmware images; the earliest entry
/// silently shadows later ones.
#[derive(Debug)]
pub struct RegionTable {
    entries: Vec<RegionEntry>,
    dram: Vec<DeviceRange>,
}

impl RegionTable {
    /// Creates an empty table with the given direct-memory windows.
    ///
    /// The windows classify device addresses for copy-strategy selection
    /// (see [`Self::is_direct_memory`]); they are distinct from the mapping
    /// entries themselves.
    #[must_use]
    pub const fn new(dram: Vec<DeviceRange>) -> Self {
        Self {
            entries: Vec::new(),
            dram,
        }
    }

    /// Registers a mapping from `device_addr` to `host` for `len` bytes.
    ///
    /// ## Errors
    ///
    /// Returns `Error::ResourceExhausted` when the table is full. Previously
    /// registered entries are left untouched.
    pub fn register(&mut self, device_addr: u64, host: HostPtr, len: u32) -> Result<RegionId> {
        debug_assert!(len > 0);
        if self.entries.len() >= REGION_CAPACITY {
            return Err(Error::ResourceExhausted("load mapping table is full"));
        }
        if self
            .entries
            .iter()
            .any(|entry| entry.overlaps(device_addr, len))
        {
            log::warn!(
                "region {device_addr:#x}+{len:#x} overlaps an earlier mapping, first match wins"
            );
        }
        self.entries.push(RegionEntry {
            device_addr,
            host,
            len,
        });
        Ok(RegionId(self.entries.len() - 1))
    }

    /// Resolves a device address range to a host pointer.
    ///
    /// The first entry, in registration order, that fully covers
    /// `device_addr..device_addr + len` wins.
    ///
    /// ## Errors
    ///
    /// Returns `Error::TranslationMiss` when no registered entry covers the
    /// whole range.
    pub fn translate(&self, device_addr: u64, len: u32) -> Result<HostPtr> {
        for entry in &self.entries {
            // try the next carveout if the address is below this one
            let Some(offset) = device_addr.checked_sub(entry.device_addr) else {
                continue;
            };
            // or past its end, including ranges wrapping the address space
            let Some(end) = offset.checked_add(u64::from(len)) else {
                continue;
            };
            if end > u64::from(entry.len) {
                continue;
            }
            let offset = usize::try_from(offset)
                .map_err(|_| Error::MalformedImage("device address offset overflows host"))?;
            // SAFETY: offset + len fits within the registered entry.
            return Ok(unsafe { entry.host.byte_add(offset) });
        }
        Err(Error::TranslationMiss { device_addr, len })
    }

    /// Whether `addr` falls inside a direct-memory (DRAM) window.
    ///
    /// Direct-memory destinations tolerate ordinary bulk byte copies;
    /// everything else is register/IO space and requires width-respecting
    /// ordered stores.
    #[must_use]
    pub fn is_direct_memory(&self, addr: u64) -> bool {
        self.dram.iter().any(|range| range.contains(addr))
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
