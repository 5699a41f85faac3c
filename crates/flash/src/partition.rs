use serde::{Deserialize, Serialize};

/// Two-slot firmware partition descriptor.
///
/// The bootloader executes the slot named by `active_index`; uploads land
/// in the other one. [`FirmwarePartition::activate`] records the new image
/// length and flips the active index so the freshly written slot boots on
/// next restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwarePartition {
    /// Base address of each slot.
    pub address: [u32; 2],
    /// Capacity of each slot in bytes.
    pub max_len: [u32; 2],
    /// Which slot the bootloader will execute next (0 or 1).
    pub active_index: u8,
    /// Length of the active image in bytes.
    pub len: u32,
}

impl FirmwarePartition {
    /// Index of the slot uploads are staged into.
    pub fn staging_index(&self) -> usize {
        if self.active_index == 0 { 1 } else { 0 }
    }

    /// Base address of the staging slot.
    pub fn staging_address(&self) -> u32 {
        self.address[self.staging_index()]
    }

    /// Capacity of the staging slot in bytes.
    pub fn staging_max_len(&self) -> u32 {
        self.max_len[self.staging_index()]
    }

    /// Commits a completed upload: records its length and makes the
    /// staging slot the active one.
    pub fn activate(&mut self, new_len: u32) {
        self.active_index = self.staging_index() as u8;
        self.len = new_len;
        tracing::info!(
            active_index = self.active_index,
            len = self.len,
            "partition table updated"
        );
    }
}
