//! Flash device abstraction and partition layout for the ember firmware.
//!
//! The actual erase/program primitives belong to the platform; this crate
//! defines the narrow [`FlashDevice`] interface the upload engine consumes,
//! plus two backends: [`MemFlash`] (in-memory, NOR semantics, used by tests)
//! and [`ImageFlash`] (flash image backed by a host file).

mod device;
mod layout;
mod partition;

pub use device::{ERASED_BYTE, FlashDevice, ImageFlash, MemFlash};
pub use layout::DeviceLayout;
pub use partition::FirmwarePartition;

/// Errors produced by flash backends.
#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    #[error("flash range out of bounds: {addr:#x}+{len:#x} exceeds {size:#x}")]
    OutOfBounds { addr: u32, len: u32, size: u32 },

    #[error("address {addr:#x} not aligned to erase unit {unit:#x}")]
    Unaligned { addr: u32, unit: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
