//! Coprocessor OS boot orchestration.
//!
//! Sequences firmware fetch, symbol table construction, carveout
//! allocation, segment loading and core start, and recovers from
//! watchdog-reported crashes by re-running the whole sequence. All
//! subsystem state lives in an explicit [`CoprocOs`] context threaded
//! through every operation; there is no process-wide instance.

use crate::{
    Error, Result,
    image::{DEBUG_LOG_SECTION, FirmwareImage, MAILBOX_SECTION},
    loader,
    logbuf::DebugRam,
    map::{DeviceRange, HostPtr, RegionTable},
    symbols::{Symbol, SymbolTable},
};
use std::time::Duration;

/// Default firmware image name.
pub const FIRMWARE_NAME: &str = "dsp.elf";

/// Boot-sequence tunables.
#[derive(Debug, Clone)]
pub struct BootConfig {
    /// Image name passed to the firmware-fetch collaborator.
    pub firmware_name: String,
    /// Bound on the wait for the coprocessor's boot-complete signal.
    pub boot_timeout: Duration,
    /// Sleep between debug-log ring polls.
    pub log_poll: Duration,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            firmware_name: FIRMWARE_NAME.to_owned(),
            boot_timeout: Duration::from_secs(5),
            log_poll: Duration::from_millis(20),
        }
    }
}

/// Provides firmware images by name.
pub trait FirmwareSource {
    /// Fetches the image bytes.
    ///
    /// ## Errors
    ///
    /// Returns `Error::FirmwareUnavailable` when the image cannot be
    /// provided.
    fn fetch(&mut self, name: &str) -> Result<Vec<u8>>;
}

/// A physically reserved memory region mapped for the coprocessor OS.
#[derive(Debug, Clone, Copy)]
pub struct Carveout {
    pub device_addr: u64,
    pub host: HostPtr,
    pub len: u32,
}

/// Platform control surface: memory allocation, clocks and reset lines.
///
/// Implementations talk to the actual bus/clock/reset hardware; the
/// orchestrator only sequences them.
pub trait CoprocControl {
    /// Allocates (or maps) the carveout backing the coprocessor OS image.
    ///
    /// ## Errors
    ///
    /// Returns `Error::ResourceExhausted` or `Error::Platform` on failure.
    fn alloc_os_carveout(&mut self) -> Result<Carveout>;

    /// Brings the coprocessor bus out of reset so memory is reachable.
    ///
    /// ## Errors
    ///
    /// Returns `Error::Platform` on failure.
    fn power_on(&mut self) -> Result<()>;

    /// Sequences core clocks and releases the reset vector.
    ///
    /// ## Errors
    ///
    /// Returns `Error::Platform` on failure.
    fn start_core(&mut self) -> Result<()>;

    /// Blocks until the coprocessor signals boot completion.
    ///
    /// ## Errors
    ///
    /// Returns `Error::Timeout` when the signal does not arrive in time.
    fn wait_boot_complete(&mut self, timeout: Duration) -> Result<()>;
}

/// Boot sequence state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsState {
    Idle,
    FirmwareFetched,
    SymbolTableBuilt,
    MemoryAllocated,
    SegmentsLoaded,
    ClocksStarted,
    Running,
    Faulted,
}

/// A shared region located inside the loaded image (mailbox, debug ring).
#[derive(Debug, Clone, Copy)]
pub struct SharedRegion {
    pub device_addr: u32,
    pub host: HostPtr,
    pub len: u32,
}

/// The coprocessor OS context.
///
/// Constructed once at subsystem initialization and threaded explicitly
/// through every operation. Mutating operations take `&mut self`, so the
/// boot sequence is single-threaded by construction; the asynchronous
/// watchdog path must be serialized against it by the caller (typically
/// one mutex around the whole context).
pub struct CoprocOs<F: FirmwareSource, C: CoprocControl> {
    config: BootConfig,
    firmware: F,
    control: C,
    regions: RegionTable,
    symbols: Option<SymbolTable>,
    image: Option<Vec<u8>>,
    mailbox: Option<SharedRegion>,
    debug_ram: Option<DebugRam>,
    state: OsState,
    carveout_mapped: bool,
}

impl<F: FirmwareSource, C: CoprocControl> CoprocOs<F, C> {
    /// Creates an idle context.
    ///
    /// `dram_windows` lists the device-address ranges reachable by plain
    /// byte copies; everything outside them is treated as register/IO
    /// space by the segment loader.
    #[must_use]
    pub fn new(
        config: BootConfig,
        firmware: F,
        control: C,
        dram_windows: Vec<DeviceRange>,
    ) -> Self {
        Self {
            config,
            firmware,
            control,
            regions: RegionTable::new(dram_windows),
            symbols: None,
            image: None,
            mailbox: None,
            debug_ram: None,
            state: OsState::Idle,
            carveout_mapped: false,
        }
    }

    /// Fetches the firmware and loads it into coprocessor memory.
    ///
    /// Runs the forward transitions up to `SegmentsLoaded`. Any failure
    /// aborts the sequence, resets the state to `Idle` and surfaces the
    /// first error; partial state must not be resumed from.
    ///
    /// ## Errors
    ///
    /// Propagates the first failing step's error.
    pub fn load(&mut self) -> Result<()> {
        let res = self.try_load();
        if let Err(err) = res {
            log::error!("failed to load {}: {err}", self.config.firmware_name);
            self.state = OsState::Idle;
        }
        res
    }

    fn try_load(&mut self) -> Result<()> {
        log::info!(
            "loading coprocessor OS firmware {}",
            self.config.firmware_name
        );

        let name = self.config.firmware_name.clone();
        let bytes = self.firmware.fetch(&name)?;
        self.image = Some(bytes);
        self.state = OsState::FirmwareFetched;

        let image = FirmwareImage::parse(self.image.as_deref().unwrap_or_default())?;
        self.symbols = Some(SymbolTable::build(&image)?);
        self.state = OsState::SymbolTableBuilt;

        // Reload after a fault reuses the carveout registered by the first
        // boot; the mapping table is append-only.
        if !self.carveout_mapped {
            let carveout = self.control.alloc_os_carveout()?;
            self.regions
                .register(carveout.device_addr, carveout.host, carveout.len)?;
            self.carveout_mapped = true;
        }
        self.state = OsState::MemoryAllocated;

        self.control.power_on()?;

        // Optional shared regions: losing the debug log only costs
        // observability, and the mailbox consumer tolerates a missing
        // pointer until its own init.
        self.debug_ram = self
            .locate(image.find_section(DEBUG_LOG_SECTION).map(section_addr))
            .map(|region| DebugRam::new(region.host, region.len as usize));
        if self.debug_ram.is_none() {
            log::error!("RAM debug logging facility not available");
        }
        self.mailbox = self.locate(image.find_section(MAILBOX_SECTION).map(section_addr));
        if self.mailbox.is_none() {
            log::warn!("mailbox shared region not available");
        }

        loader::load_image(&image, &self.regions)?;
        self.state = OsState::SegmentsLoaded;
        Ok(())
    }

    /// Starts the coprocessor and waits for it to signal boot completion.
    ///
    /// ## Errors
    ///
    /// Returns `Error::Configuration` when called before a successful
    /// [`Self::load`]; otherwise propagates the failing control step and
    /// resets the state to `Idle`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != OsState::SegmentsLoaded {
            return Err(Error::Configuration("coprocessor OS is not loaded"));
        }

        log::info!("starting coprocessor OS");
        let res = self.try_start();
        if let Err(err) = res {
            log::error!("failed to start coprocessor OS: {err}");
            self.state = OsState::Idle;
        }
        res
    }

    fn try_start(&mut self) -> Result<()> {
        self.control.start_core()?;
        self.state = OsState::ClocksStarted;
        self.control.wait_boot_complete(self.config.boot_timeout)?;
        self.state = OsState::Running;
        Ok(())
    }

    /// Watchdog fault entry point: attempts one full reload-and-restart.
    ///
    /// Runs on behalf of the asynchronous fault signal and is **not
    /// reentrant**: the caller must serialize it against any in-progress
    /// boot sequence. A failure during recovery is final; the coprocessor
    /// is reported unusable and no further retry is attempted.
    ///
    /// ## Errors
    ///
    /// Returns `Error::Unusable` when recovery fails.
    pub fn on_watchdog_fault(&mut self) -> Result<()> {
        log::error!("coprocessor OS crashed, restarting");
        self.state = OsState::Faulted;
        if self.load().and_then(|()| self.start()).is_err() {
            log::error!("unable to restart coprocessor OS");
            return Err(Error::Unusable);
        }
        Ok(())
    }

    /// Locates a named shared region inside the loaded image.
    ///
    /// Returns `None` when the section is absent or its device address is
    /// not covered by a registered mapping.
    #[must_use]
    pub fn locate_shared_region(&self, name: &str) -> Option<SharedRegion> {
        let bytes = self.image.as_deref()?;
        let image = FirmwareImage::parse(bytes).ok()?;
        self.locate(image.find_section(name).map(section_addr))
    }

    fn locate(&self, section: Option<SectionAddr>) -> Option<SharedRegion> {
        let section = section?;
        let host = self
            .regions
            .translate(u64::from(section.device_addr), section.len)
            .ok()?;
        Some(SharedRegion {
            device_addr: section.device_addr,
            host,
            len: section.len,
        })
    }

    /// Resolves a device address range to a host pointer.
    ///
    /// ## Errors
    ///
    /// Returns `Error::TranslationMiss` when no mapping covers the range.
    pub fn translate(&self, device_addr: u64, len: u32) -> Result<HostPtr> {
        self.regions.translate(device_addr, len)
    }

    /// Whether `addr` lies in a direct-memory window.
    #[must_use]
    pub fn is_direct_memory(&self, addr: u64) -> bool {
        self.regions.is_direct_memory(addr)
    }

    /// Looks up a global firmware symbol by name.
    #[must_use]
    pub fn find_symbol(&self, name: &str) -> Option<&Symbol> {
        let Some(symbols) = self.symbols.as_ref() else {
            log::info!("symbol table not present");
            return None;
        };
        symbols.lookup(name)
    }

    /// The mailbox shared region, if it was located during load.
    #[must_use]
    pub const fn mailbox_region(&self) -> Option<SharedRegion> {
        self.mailbox
    }

    /// The debug log ring, if it was located during load.
    #[must_use]
    pub const fn debug_ram(&self) -> Option<DebugRam> {
        self.debug_ram
    }

    /// Poll interval for debug-log consumers, from the boot config.
    #[must_use]
    pub const fn log_poll(&self) -> Duration {
        self.config.log_poll
    }

    #[must_use]
    pub const fn state(&self) -> OsState {
        self.state
    }
}

/// Device-address coordinates of a named section, pending translation.
#[derive(Debug, Clone, Copy)]
struct SectionAddr {
    device_addr: u32,
    len: u32,
}

const fn section_addr(section: crate::image::SectionView) -> SectionAddr {
    SectionAddr {
        device_addr: section.address,
        len: section.size,
    }
}
