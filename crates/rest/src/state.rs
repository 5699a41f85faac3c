use std::path::PathBuf;

use ember_flash::{DeviceLayout, FirmwarePartition, FlashDevice};

/// Everything a request handler may touch.
///
/// Owned by the server and lent out mutably for one request at a time;
/// the sequential service model makes that the whole concurrency story.
pub struct DeviceState {
    pub flash: Box<dyn FlashDevice>,
    pub partition: FirmwarePartition,
    pub layout: DeviceLayout,
    /// Root directory of the hierarchical file store.
    pub store_root: PathBuf,
}
