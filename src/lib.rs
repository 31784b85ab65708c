//! Firmware loader and boot control for an auxiliary DSP coprocessor.
//!
//! Brings the coprocessor up from a host-visible ELF32 image: parses the
//! image, builds a global symbol table, establishes a device-address to
//! host-address mapping over the physically reserved regions, relocates
//! the loadable segments into coprocessor memory and sequences the
//! clock/reset path, with watchdog-triggered reload on crash.
//!
//! # Usage
//!
//! Implement [`FirmwareSource`] and [`CoprocControl`] for the platform,
//! then drive the boot through a [`CoprocOs`] context:
//!
//! ```rust,ignore
//! let mut os = CoprocOs::new(BootConfig::default(), firmware, control, dram_windows);
//! os.load()?;
//! os.start()?;
//! ```
//!
//! Dependent subsystems resolve device addresses through
//! [`CoprocOs::translate`] and [`CoprocOs::find_symbol`] for the lifetime
//! of the context.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_panics_doc, clippy::doc_markdown)]

mod error;
pub mod image;
pub mod loader;
pub mod logbuf;
pub mod map;
pub mod os;
pub mod symbols;

pub use error::{Error, Result};
pub use image::FirmwareImage;
pub use logbuf::{DebugLogReader, DebugRam};
pub use map::{DeviceRange, HostPtr, RegionTable};
pub use os::{BootConfig, Carveout, CoprocControl, CoprocOs, FirmwareSource, OsState};
pub use symbols::{Symbol, SymbolTable};
