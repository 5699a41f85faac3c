use std::collections::HashSet;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use ember_flash::{FirmwarePartition, FlashDevice};

use crate::path::validate_store_path;
use crate::UploadError;

/// Destination for committed upload bytes.
///
/// `write` receives whole blocks during streaming and at most one partial
/// tail at finish. `commit` finalizes the destination; for flash regions
/// that means the partition-table update and active-slot switch, which
/// `dry_run` withholds.
pub trait UploadSink {
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), UploadError>;

    fn commit(&mut self, final_len: u64, dry_run: bool) -> Result<(), UploadError>;
}

impl<T: UploadSink + ?Sized> UploadSink for &mut T {
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), UploadError> {
        (**self).write(offset, data)
    }

    fn commit(&mut self, final_len: u64, dry_run: bool) -> Result<(), UploadError> {
        (**self).commit(final_len, dry_run)
    }
}

// ---------------------------------------------------------------------------
// RawRegionSink
// ---------------------------------------------------------------------------

/// Writes into a bounded region of raw flash, erase-before-program.
///
/// Each erase unit is erased at most once, immediately before the first
/// program that touches it. A write past `max_len` fails with a bounds
/// error before anything is erased for it.
pub struct RawRegionSink<'a> {
    flash: &'a mut dyn FlashDevice,
    partition: Option<&'a mut FirmwarePartition>,
    base: u32,
    max_len: u32,
    erased: HashSet<u32>,
}

impl<'a> RawRegionSink<'a> {
    pub fn new(flash: &'a mut dyn FlashDevice, base: u32, max_len: u32) -> Self {
        Self {
            flash,
            partition: None,
            base,
            max_len,
            erased: HashSet::new(),
        }
    }

    /// Attaches the partition descriptor to update at commit.
    pub fn with_partition(mut self, partition: &'a mut FirmwarePartition) -> Self {
        self.partition = Some(partition);
        self
    }
}

impl UploadSink for RawRegionSink<'_> {
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), UploadError> {
        let end = offset + data.len() as u64;
        if end > self.max_len as u64 {
            return Err(UploadError::Bounds {
                offset,
                len: data.len() as u64,
                max: self.max_len as u64,
            });
        }

        let addr = self.base + offset as u32;
        let unit = self.flash.erase_unit();
        let first = addr / unit;
        let last = (addr + data.len() as u32 - 1) / unit;
        for index in first..=last {
            if self.erased.insert(index) {
                self.flash.erase(index * unit, unit)?;
            }
        }

        self.flash.program(addr, data)?;
        tracing::debug!(
            addr = format_args!("{addr:#x}"),
            len = data.len(),
            "flash block programmed"
        );
        Ok(())
    }

    fn commit(&mut self, final_len: u64, dry_run: bool) -> Result<(), UploadError> {
        if dry_run {
            tracing::info!(final_len, "dry run: partition table left untouched");
            return Ok(());
        }
        if let Some(partition) = self.partition.as_deref_mut() {
            partition.activate(final_len as u32);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileSink
// ---------------------------------------------------------------------------

/// Writes into the hierarchical file store under a fixed root.
///
/// Parent directories are created on the first write; commit truncates to
/// the exact final size, discarding any block-alignment tail.
pub struct FileSink {
    root: PathBuf,
    rel_path: String,
    file: Option<std::fs::File>,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>, rel_path: &str) -> Result<Self, UploadError> {
        validate_store_path(rel_path)?;
        Ok(Self {
            root: root.into(),
            rel_path: rel_path.to_string(),
            file: None,
        })
    }

    /// The path relative to the store root.
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    fn ensure_open(&mut self) -> Result<&mut std::fs::File, UploadError> {
        if self.file.is_none() {
            let full = self.root.join(&self.rel_path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&full)?;
            tracing::debug!(path = %full.display(), "store file opened");
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| UploadError::Io(std::io::Error::other("store file unavailable")))
    }
}

impl UploadSink for FileSink {
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), UploadError> {
        let file = self.ensure_open()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn commit(&mut self, final_len: u64, _dry_run: bool) -> Result<(), UploadError> {
        // Open even if nothing was written so an empty upload still
        // creates the file.
        let file = self.ensure_open()?;
        file.set_len(final_len)?;
        Ok(())
    }
}

/// Sink that records every write (test double shared across modules).
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub writes: Vec<(u64, Vec<u8>)>,
    pub committed: Option<(u64, bool)>,
}

#[cfg(test)]
impl UploadSink for RecordingSink {
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), UploadError> {
        self.writes.push((offset, data.to_vec()));
        Ok(())
    }

    fn commit(&mut self, final_len: u64, dry_run: bool) -> Result<(), UploadError> {
        self.committed = Some((final_len, dry_run));
        Ok(())
    }
}
