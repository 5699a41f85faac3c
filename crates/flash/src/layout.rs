use serde::{Deserialize, Serialize};

use crate::FlashError;

/// Device flash geometry and the bounds of its addressable regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLayout {
    /// Total flash size in bytes.
    pub flash_size: u32,
    /// Erase unit in bytes.
    pub erase_unit: u32,
    /// Lowest address explicit-address writes may touch. Everything below
    /// holds the bootloader and the running image.
    pub ota_start: u32,
    /// End of the file-store backing region (exclusive).
    pub fs_end: u32,
    /// Lowest address the file-store backing region may start at.
    pub fs_min_start: u32,
    /// Configured size of the file-store backing region.
    pub fs_size: u32,
}

impl Default for DeviceLayout {
    fn default() -> Self {
        Self {
            flash_size: 0x20_0000,
            erase_unit: 4096,
            ota_start: 0xE_0000,
            fs_end: 0x20_0000,
            fs_min_start: 0x1B_0000,
            fs_size: 0x8000,
        }
    }
}

impl DeviceLayout {
    /// Resolves the file-store backing region as `(start, size)`.
    ///
    /// The configured size is rounded down to whole erase units and the
    /// region is laid out against `fs_end`. Bounds are double-checked so a
    /// misconfigured size can never reach the boot sector.
    pub fn fs_region(&self) -> Result<(u32, u32), FlashError> {
        let size = (self.fs_size / self.erase_unit) * self.erase_unit;
        let start = self.fs_end.wrapping_sub(size);
        if size == 0
            || size > self.fs_end
            || start < self.fs_min_start
            || start + size > self.fs_end
        {
            return Err(FlashError::OutOfBounds {
                addr: start,
                len: size,
                size: self.fs_end,
            });
        }
        Ok((start, size))
    }
}
