//! Error types for coprocessor firmware loading and boot control.

use thiserror::Error;

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
/// An error that can occur while loading firmware or booting the coprocessor.
pub enum Error {
    /// The subsystem is not in a state where the call is valid (caller bug).
    #[error("Invalid configuration: {0}")]
    Configuration(&'static str),
    /// A fixed-capacity table or a memory allocation has been exhausted.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(&'static str),
    /// The firmware image is inconsistent, truncated or missing a required part.
    #[error("Malformed firmware image: {0}")]
    MalformedImage(&'static str),
    /// A device address range is not covered by any registered region.
    #[error("No mapping for device address {device_addr:#x} (len {len:#x})")]
    TranslationMiss { device_addr: u64, len: u32 },
    /// The firmware collaborator could not provide the requested image.
    #[error("Firmware unavailable: {0}")]
    FirmwareUnavailable(&'static str),
    /// A platform control operation (allocation, clock, reset) failed.
    #[error("Platform control failed: {0}")]
    Platform(&'static str),
    /// A bounded wait expired before the awaited condition was observed.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    /// Recovery after a watchdog fault failed; the coprocessor is unusable.
    #[error("Coprocessor unusable after failed recovery")]
    Unusable,
}

/// Result type for firmware loading and boot operations.
pub type Result<T> = core::result::Result<T, Error>;
