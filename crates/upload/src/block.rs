use crate::sink::UploadSink;
use crate::UploadError;

/// Buffers incoming bytes into fixed-size blocks and flushes whole blocks
/// to the sink.
///
/// Flash can only erase and program whole units, so the expensive,
/// irreversible operation is deferred until a full unit of data exists.
/// The partial tail is carried across calls and written exactly once, at
/// [`BlockAccumulator::flush_tail`].
pub struct BlockAccumulator {
    buf: Vec<u8>,
    block_size: usize,
    write_offset: u64,
}

impl BlockAccumulator {
    pub fn new(block_size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(block_size),
            block_size,
            write_offset: 0,
        }
    }

    /// Appends `bytes`, flushing one block per boundary crossing.
    pub fn feed<S: UploadSink + ?Sized>(
        &mut self,
        sink: &mut S,
        mut bytes: &[u8],
    ) -> Result<(), UploadError> {
        while !bytes.is_empty() {
            let room = self.block_size - self.buf.len();
            let take = room.min(bytes.len());
            self.buf.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if self.buf.len() == self.block_size {
                self.flush(sink)?;
            }
        }
        Ok(())
    }

    /// Writes the partial remainder. Only called at session finish.
    pub fn flush_tail<S: UploadSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), UploadError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.flush(sink)
    }

    fn flush<S: UploadSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), UploadError> {
        sink.write(self.write_offset, &self.buf)?;
        self.write_offset += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Total bytes handed to the sink so far.
    pub fn bytes_flushed(&self) -> u64 {
        self.write_offset
    }

    /// Bytes buffered but not yet flushed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
