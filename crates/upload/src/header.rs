use crate::UploadError;

/// Size of the image header at the head of firmware streams.
pub const HEADER_SIZE: usize = 64;

/// Magic token opening every valid image header.
pub const HEADER_MAGIC: &[u8; 8] = b"EMBR_OTA";

/// Whether the image body is raw or XZ-compressed.
///
/// Decompression is not done on-device; the flag is recorded so tooling
/// can tell the two apart when reading the region back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Raw,
    Xz,
}

/// Validated image header.
///
/// Wire layout, all offsets fixed:
/// `magic[8] | kind[4] | payload_len u32 LE | hw_ver[8] | sw_ver[8] | sha256[32]`.
/// `payload_len` counts the bytes after the header; version tags are
/// opaque NUL-padded strings.
#[derive(Debug, Clone)]
pub struct UploadHeader {
    pub kind: ImageKind,
    pub payload_len: u32,
    pub hw_version: String,
    pub sw_version: String,
    pub digest: [u8; 32],
}

impl UploadHeader {
    fn parse(raw: &[u8; HEADER_SIZE]) -> Result<Self, UploadError> {
        if &raw[..8] != HEADER_MAGIC {
            return Err(UploadError::Protocol("invalid header magic".into()));
        }

        let kind = if raw[8..12].windows(2).any(|w| w == b"XZ") {
            ImageKind::Xz
        } else {
            ImageKind::Raw
        };

        let payload_len = u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]);
        let hw_version = tag_string(&raw[16..24]);
        let sw_version = tag_string(&raw[24..32]);

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&raw[32..64]);

        Ok(Self {
            kind,
            payload_len,
            hw_version,
            sw_version,
            digest,
        })
    }
}

/// Decodes a NUL-padded version tag.
fn tag_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Result of feeding bytes to a [`HeaderCollector`].
#[derive(Debug)]
pub enum HeaderProgress {
    /// Header still incomplete; the whole chunk was absorbed.
    NeedMore,
    /// Header complete and valid. `consumed` is how many bytes of the
    /// last chunk belonged to it; the rest is payload.
    Complete {
        header: UploadHeader,
        consumed: usize,
    },
}

/// Accumulates the first [`HEADER_SIZE`] bytes of a stream and validates
/// them before anything reaches the destination.
pub struct HeaderCollector {
    buf: [u8; HEADER_SIZE],
    filled: usize,
}

impl HeaderCollector {
    pub fn new() -> Self {
        Self {
            buf: [0; HEADER_SIZE],
            filled: 0,
        }
    }

    /// Absorbs header bytes from `chunk`.
    ///
    /// Magic mismatch fails the stream here, before any destination write.
    pub fn accumulate(&mut self, chunk: &[u8]) -> Result<HeaderProgress, UploadError> {
        let take = (HEADER_SIZE - self.filled).min(chunk.len());
        self.buf[self.filled..self.filled + take].copy_from_slice(&chunk[..take]);
        self.filled += take;

        if self.filled < HEADER_SIZE {
            return Ok(HeaderProgress::NeedMore);
        }

        let header = UploadHeader::parse(&self.buf)?;
        Ok(HeaderProgress::Complete {
            header,
            consumed: take,
        })
    }

    /// The raw header bytes collected so far.
    pub fn raw(&self) -> &[u8] {
        &self.buf[..self.filled]
    }
}

impl Default for HeaderCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a valid 64-byte header for `payload_len`/`digest` (test helper).
#[cfg(test)]
pub(crate) fn build_header(kind: &[u8; 4], payload_len: u32, digest: [u8; 32]) -> [u8; 64] {
    let mut raw = [0u8; 64];
    raw[..8].copy_from_slice(HEADER_MAGIC);
    raw[8..12].copy_from_slice(kind);
    raw[12..16].copy_from_slice(&payload_len.to_le_bytes());
    raw[16..21].copy_from_slice(b"rev-b");
    raw[24..30].copy_from_slice(b"v1.2.3");
    raw[32..64].copy_from_slice(&digest);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_header_in_one_chunk() {
        let raw = build_header(b"RAW\0", 10_000, [0xAB; 32]);
        let mut collector = HeaderCollector::new();
        match collector.accumulate(&raw).unwrap() {
            HeaderProgress::Complete { header, consumed } => {
                assert_eq!(consumed, 64);
                assert_eq!(header.kind, ImageKind::Raw);
                assert_eq!(header.payload_len, 10_000);
                assert_eq!(header.hw_version, "rev-b");
                assert_eq!(header.sw_version, "v1.2.3");
                assert_eq!(header.digest, [0xAB; 32]);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn accumulates_across_single_byte_chunks() {
        let raw = build_header(b"RAW\0", 42, [7; 32]);
        let mut collector = HeaderCollector::new();
        for (i, byte) in raw.iter().enumerate() {
            match collector.accumulate(std::slice::from_ref(byte)).unwrap() {
                HeaderProgress::NeedMore => assert!(i < 63),
                HeaderProgress::Complete { header, consumed } => {
                    assert_eq!(i, 63);
                    assert_eq!(consumed, 1);
                    assert_eq!(header.payload_len, 42);
                }
            }
        }
    }

    #[test]
    fn reports_payload_spillover() {
        let mut data = build_header(b"RAW\0", 5, [0; 32]).to_vec();
        data.extend_from_slice(b"hello");
        let mut collector = HeaderCollector::new();
        match collector.accumulate(&data).unwrap() {
            HeaderProgress::Complete { consumed, .. } => assert_eq!(consumed, 64),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut raw = build_header(b"RAW\0", 0, [0; 32]);
        raw[0] = b'X';
        let mut collector = HeaderCollector::new();
        assert!(matches!(
            collector.accumulate(&raw),
            Err(UploadError::Protocol(_))
        ));
    }

    #[test]
    fn detects_xz_kind() {
        let raw = build_header(b"XZ\0\0", 100, [0; 32]);
        let mut collector = HeaderCollector::new();
        match collector.accumulate(&raw).unwrap() {
            HeaderProgress::Complete { header, .. } => assert_eq!(header.kind, ImageKind::Xz),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn raw_tracks_collected_bytes() {
        let mut collector = HeaderCollector::new();
        collector.accumulate(&[1, 2, 3]).unwrap();
        assert_eq!(collector.raw(), &[1, 2, 3]);
    }
}
