use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::FlashError;

/// Erased flash reads back as all-ones.
pub const ERASED_BYTE: u8 = 0xFF;

/// Narrow interface over the platform's flash primitives.
///
/// Erase operates on whole units; programming requires the covering unit
/// to have been erased first. Callers own that sequencing — the sink layer
/// in `ember-upload` tracks which units it has erased.
pub trait FlashDevice: Send {
    /// Total device size in bytes.
    fn size(&self) -> u32;

    /// Minimal erasable unit in bytes (typically 4096).
    fn erase_unit(&self) -> u32;

    /// Erases `[addr, addr + len)`. Both must be unit-aligned.
    fn erase(&mut self, addr: u32, len: u32) -> Result<(), FlashError>;

    /// Programs `data` starting at `addr`. Any length, any alignment.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Reads `buf.len()` bytes starting at `addr`.
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError>;
}

fn check_range(addr: u32, len: usize, size: u32) -> Result<(), FlashError> {
    let end = addr as u64 + len as u64;
    if end > size as u64 {
        return Err(FlashError::OutOfBounds {
            addr,
            len: len as u32,
            size,
        });
    }
    Ok(())
}

fn check_aligned(addr: u32, len: u32, unit: u32) -> Result<(), FlashError> {
    if addr % unit != 0 {
        return Err(FlashError::Unaligned { addr, unit });
    }
    if len % unit != 0 {
        return Err(FlashError::Unaligned { addr: len, unit });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MemFlash
// ---------------------------------------------------------------------------

/// In-memory flash with NOR semantics.
///
/// Erase fills units with 0xFF; programming AND-masks bytes, so writing
/// into a non-erased unit corrupts rather than errors — same as hardware.
/// Erase operations are counted per unit so tests can assert erase-cycle
/// behavior.
pub struct MemFlash {
    data: Vec<u8>,
    erase_unit: u32,
    erase_counts: HashMap<u32, u32>,
}

impl MemFlash {
    /// Creates a fully-erased device of `size` bytes.
    pub fn new(size: u32, erase_unit: u32) -> Self {
        Self {
            data: vec![ERASED_BYTE; size as usize],
            erase_unit,
            erase_counts: HashMap::new(),
        }
    }

    /// Number of times the unit covering `addr` has been erased.
    pub fn erase_count(&self, addr: u32) -> u32 {
        self.erase_counts
            .get(&(addr / self.erase_unit))
            .copied()
            .unwrap_or(0)
    }

    /// Total erase operations across all units.
    pub fn total_erases(&self) -> u32 {
        self.erase_counts.values().sum()
    }

    /// Raw contents of `[addr, addr + len)`.
    pub fn contents(&self, addr: u32, len: u32) -> &[u8] {
        &self.data[addr as usize..(addr + len) as usize]
    }
}

impl FlashDevice for MemFlash {
    fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn erase_unit(&self) -> u32 {
        self.erase_unit
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<(), FlashError> {
        check_aligned(addr, len, self.erase_unit)?;
        check_range(addr, len as usize, self.size())?;
        self.data[addr as usize..(addr + len) as usize].fill(ERASED_BYTE);
        let mut unit = addr / self.erase_unit;
        let last = (addr + len) / self.erase_unit;
        while unit < last {
            *self.erase_counts.entry(unit).or_insert(0) += 1;
            unit += 1;
        }
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        check_range(addr, data.len(), self.size())?;
        for (dst, src) in self.data[addr as usize..].iter_mut().zip(data) {
            *dst &= *src;
        }
        Ok(())
    }

    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        check_range(addr, buf.len(), self.size())?;
        buf.copy_from_slice(&self.data[addr as usize..addr as usize + buf.len()]);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ImageFlash
// ---------------------------------------------------------------------------

/// Flash image backed by a file on the host filesystem.
///
/// Lets the firmware run against a persistent image when there is no real
/// flash underneath (development builds, soak tests).
pub struct ImageFlash {
    file: std::fs::File,
    size: u32,
    erase_unit: u32,
}

impl ImageFlash {
    /// Opens (or creates) the image at `path`.
    ///
    /// A new or short image is extended to `size` bytes of erased flash.
    pub fn open(path: &Path, size: u32, erase_unit: u32) -> Result<Self, FlashError> {
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let current = file.metadata()?.len();
        if current < size as u64 {
            file.seek(SeekFrom::Start(current))?;
            let mut remaining = size as u64 - current;
            let fill = [ERASED_BYTE; 4096];
            while remaining > 0 {
                let n = remaining.min(fill.len() as u64) as usize;
                file.write_all(&fill[..n])?;
                remaining -= n as u64;
            }
        }

        Ok(Self {
            file,
            size,
            erase_unit,
        })
    }
}

impl FlashDevice for ImageFlash {
    fn size(&self) -> u32 {
        self.size
    }

    fn erase_unit(&self) -> u32 {
        self.erase_unit
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<(), FlashError> {
        check_aligned(addr, len, self.erase_unit)?;
        check_range(addr, len as usize, self.size)?;
        tracing::debug!(addr = format_args!("{addr:#x}"), len, "erase");
        self.file.seek(SeekFrom::Start(addr as u64))?;
        let fill = vec![ERASED_BYTE; self.erase_unit as usize];
        let mut done = 0;
        while done < len {
            self.file.write_all(&fill)?;
            done += self.erase_unit;
        }
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        check_range(addr, data.len(), self.size)?;
        self.file.seek(SeekFrom::Start(addr as u64))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        check_range(addr, buf.len(), self.size)?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(addr as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }
}
