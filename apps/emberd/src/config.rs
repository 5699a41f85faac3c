//! Daemon configuration management.
//!
//! Configuration is stored as TOML. The path comes from the first command
//! line argument, then the `EMBERD_CONFIG` environment variable, then
//! `emberd.toml` in the working directory. A missing file is created with
//! defaults so a bare device boots with a sane layout.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use ember_flash::{DeviceLayout, FirmwarePartition};

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen address for the control surface.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path of the flash image backing file.
    #[serde(default = "default_flash_image")]
    pub flash_image: String,

    /// Root directory of the hierarchical file store.
    #[serde(default = "default_store_root")]
    pub store_root: String,

    /// Flash geometry and region bounds.
    #[serde(default)]
    pub layout: DeviceLayout,

    /// Firmware slot table.
    #[serde(default = "default_partition")]
    pub partition: FirmwarePartition,
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

fn default_flash_image() -> String {
    "flash.img".into()
}

fn default_store_root() -> String {
    "store".into()
}

/// Slot A behind the bootloader, slot B at the writable boundary; both
/// end where the file-store region begins.
fn default_partition() -> FirmwarePartition {
    FirmwarePartition {
        address: [0x1_0000, 0xE_0000],
        max_len: [0xD_0000, 0xD_0000],
        active_index: 0,
        len: 0,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            flash_image: default_flash_image(),
            store_root: default_store_root(),
            layout: DeviceLayout::default(),
            partition: default_partition(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Saves the current configuration to disk.
    pub fn save(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Rejects slot tables that fall outside the device or collide with
    /// the file-store region.
    fn validate(&self) -> anyhow::Result<()> {
        let (fs_start, _) = self
            .layout
            .fs_region()
            .map_err(|e| anyhow::anyhow!("file-store region: {e}"))?;

        for slot in 0..2 {
            let base = self.partition.address[slot];
            let end = base as u64 + self.partition.max_len[slot] as u64;
            if end > self.layout.flash_size as u64 {
                anyhow::bail!("slot {slot} runs past the end of flash");
            }
            if end > fs_start as u64 {
                anyhow::bail!("slot {slot} overlaps the file-store region");
            }
        }
        if self.partition.active_index > 1 {
            anyhow::bail!("active_index must be 0 or 1");
        }
        Ok(())
    }
}

/// Resolves the configuration file path.
fn config_path() -> PathBuf {
    if let Some(arg) = std::env::args().nth(1) {
        return PathBuf::from(arg);
    }
    if let Ok(env) = std::env::var("EMBERD_CONFIG") {
        return PathBuf::from(env);
    }
    PathBuf::from("emberd.toml")
}
