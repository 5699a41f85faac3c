use crate::block::BlockAccumulator;
use crate::digest::{DIGEST_SIZE, PayloadDigest};
use crate::header::{HEADER_SIZE, HeaderCollector, HeaderProgress, UploadHeader};
use crate::sink::UploadSink;
use crate::UploadError;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Header,
    Streaming,
    Finalizing,
    Committed,
    Aborted,
}

/// Whether the payload digest is checked before commit.
///
/// This is an explicit per-destination policy, not a platform accident:
/// firmware uploads require the header digest, explicit-address flash
/// writes trust the byte count only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityPolicy {
    /// Compare against the SHA-256 declared in the image header.
    HeaderSha256,
    /// No verification; commit whatever arrived.
    None,
}

/// Per-session configuration, bound at start.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether the stream opens with a 64-byte image header.
    pub require_header: bool,
    pub integrity: IntegrityPolicy,
    /// Declared Content-Length, when the client sent one. When absent and
    /// a header is required, the header's payload length governs instead.
    pub expected_total: Option<u64>,
    /// Destination block size (the erase unit for raw regions).
    pub block_size: usize,
    /// Perform every side effect except final activation.
    pub dry_run: bool,
}

/// Result of a completed session.
#[derive(Debug)]
pub struct Outcome {
    /// Total bytes accepted into the destination, header included.
    pub bytes_accepted: u64,
    /// Computed payload digest.
    pub digest: [u8; DIGEST_SIZE],
    /// True when the integrity policy ran and matched.
    pub verified: bool,
    pub dry_run: bool,
}

/// Single-use upload session: start (construction), [`feed`], [`finish`].
///
/// Owns its block buffer and header scratch space; both die with the
/// session when the handler returns. There is deliberately no rollback:
/// bytes are written through before verification, and a transport or
/// integrity failure leaves the destination partially written. Only the
/// commit step (partition activation, file truncate) is gated.
///
/// [`feed`]: UploadSession::feed
/// [`finish`]: UploadSession::finish
pub struct UploadSession<S: UploadSink> {
    sink: S,
    config: SessionConfig,
    state: SessionState,
    collector: HeaderCollector,
    header: Option<UploadHeader>,
    digest: PayloadDigest,
    block: BlockAccumulator,
    accepted: u64,
    expected: Option<u64>,
}

impl<S: UploadSink> UploadSession<S> {
    pub fn new(sink: S, config: SessionConfig) -> Self {
        let expected = config.expected_total;
        let block = BlockAccumulator::new(config.block_size);
        Self {
            sink,
            config,
            state: SessionState::Init,
            collector: HeaderCollector::new(),
            header: None,
            digest: PayloadDigest::new(),
            block,
            accepted: 0,
            expected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Total bytes accepted so far (meaningful after an abort too).
    pub fn bytes_accepted(&self) -> u64 {
        self.accepted
    }

    /// Parsed image header, once the header phase completed.
    pub fn header(&self) -> Option<&UploadHeader> {
        self.header.as_ref()
    }

    /// Bytes still expected, when a governing total is known.
    pub fn remaining(&self) -> Option<u64> {
        self.expected.map(|e| e.saturating_sub(self.accepted))
    }

    /// Marks the session aborted with a transport-layer cause.
    ///
    /// Bytes already flushed stay where they are.
    pub fn abort(&mut self) {
        self.state = SessionState::Aborted;
    }

    /// Accepts one chunk of the body stream.
    ///
    /// Bytes beyond the expected total are ignored. Any error aborts the
    /// session; it cannot be fed again afterwards.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        match self.feed_inner(chunk) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = SessionState::Aborted;
                Err(e)
            }
        }
    }

    fn feed_inner(&mut self, mut chunk: &[u8]) -> Result<(), UploadError> {
        match self.state {
            SessionState::Init => {
                self.state = if self.config.require_header {
                    SessionState::Header
                } else {
                    SessionState::Streaming
                };
            }
            SessionState::Header | SessionState::Streaming => {}
            other => {
                return Err(UploadError::Protocol(format!(
                    "feed on a {other:?} session"
                )));
            }
        }

        chunk = self.clamp(chunk);

        if self.state == SessionState::Header {
            match self.collector.accumulate(chunk)? {
                HeaderProgress::NeedMore => {
                    self.accepted += chunk.len() as u64;
                    return Ok(());
                }
                HeaderProgress::Complete { header, consumed } => {
                    self.accepted += consumed as u64;
                    tracing::info!(
                        kind = ?header.kind,
                        payload_len = header.payload_len,
                        hw = %header.hw_version,
                        sw = %header.sw_version,
                        sha256 = %hex::encode(header.digest),
                        "image header accepted"
                    );
                    if self.expected.is_none() {
                        self.expected = Some(HEADER_SIZE as u64 + header.payload_len as u64);
                    }
                    // The header is part of the image: forward it to the
                    // destination, but never to the digest.
                    self.block.feed(&mut self.sink, self.collector.raw())?;
                    self.header = Some(header);
                    self.state = SessionState::Streaming;
                    chunk = &chunk[consumed..];
                    chunk = self.clamp(chunk);
                }
            }
        }

        if !chunk.is_empty() {
            self.digest.update(chunk);
            self.block.feed(&mut self.sink, chunk)?;
            self.accepted += chunk.len() as u64;
        }
        Ok(())
    }

    /// Drops bytes past the expected total.
    fn clamp<'c>(&self, chunk: &'c [u8]) -> &'c [u8] {
        match self.remaining() {
            Some(room) if (chunk.len() as u64) > room => &chunk[..room as usize],
            _ => chunk,
        }
    }

    /// Flushes the tail block, verifies the digest per policy, and commits
    /// the sink. Consumes the session — states are not re-entrant.
    pub fn finish(mut self) -> Result<Outcome, UploadError> {
        match self.state {
            SessionState::Streaming => {}
            SessionState::Init if !self.config.require_header => {}
            SessionState::Header => {
                return Err(UploadError::Protocol(
                    "stream ended inside the image header".into(),
                ));
            }
            other => {
                return Err(UploadError::Protocol(format!(
                    "finish on a {other:?} session"
                )));
            }
        }
        self.state = SessionState::Finalizing;

        self.block.flush_tail(&mut self.sink)?;

        // Every accepted byte must have reached the sink.
        let flushed = self.block.bytes_flushed();
        if flushed != self.accepted {
            return Err(UploadError::Protocol(format!(
                "committed {flushed} bytes but accepted {}",
                self.accepted
            )));
        }

        let computed = self.digest.finalize();
        let verified = match self.config.integrity {
            IntegrityPolicy::HeaderSha256 => {
                let header = self.header.as_ref().ok_or_else(|| {
                    UploadError::Protocol("integrity check requires a header".into())
                })?;
                if header.digest != computed {
                    return Err(UploadError::Integrity {
                        expected: hex::encode(header.digest),
                        actual: hex::encode(computed),
                    });
                }
                true
            }
            IntegrityPolicy::None => false,
        };

        self.sink.commit(self.accepted, self.config.dry_run)?;
        self.state = SessionState::Committed;
        tracing::info!(
            bytes = self.accepted,
            verified,
            dry_run = self.config.dry_run,
            "upload committed"
        );

        Ok(Outcome {
            bytes_accepted: self.accepted,
            digest: computed,
            verified,
            dry_run: self.config.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest_bytes;
    use crate::header::build_header;
    use crate::sink::{FileSink, RawRegionSink, RecordingSink};
    use ember_flash::{FirmwarePartition, FlashDevice, MemFlash};

    fn firmware_config(expected_total: Option<u64>, dry_run: bool) -> SessionConfig {
        SessionConfig {
            require_header: true,
            integrity: IntegrityPolicy::HeaderSha256,
            expected_total,
            block_size: 4096,
            dry_run,
        }
    }

    fn plain_config(expected_total: Option<u64>) -> SessionConfig {
        SessionConfig {
            require_header: false,
            integrity: IntegrityPolicy::None,
            expected_total,
            block_size: 4096,
            dry_run: false,
        }
    }

    fn firmware_stream(payload: &[u8]) -> Vec<u8> {
        let mut stream = build_header(b"RAW\0", payload.len() as u32, digest_bytes(payload)).to_vec();
        stream.extend_from_slice(payload);
        stream
    }

    #[test]
    fn commits_valid_firmware_stream() {
        let payload = vec![0x5A; 10_000];
        let stream = firmware_stream(&payload);

        let mut flash = MemFlash::new(0x8000, 4096);
        let mut pt = FirmwarePartition {
            address: [0, 0x4000],
            max_len: [0x4000, 0x4000],
            active_index: 1,
            len: 0,
        };
        let sink = RawRegionSink::new(&mut flash, 0, 0x4000).with_partition(&mut pt);
        let mut session = UploadSession::new(sink, firmware_config(Some(stream.len() as u64), false));

        for chunk in stream.chunks(1460) {
            session.feed(chunk).unwrap();
        }
        let outcome = session.finish().unwrap();

        assert_eq!(outcome.bytes_accepted, 10_064);
        assert!(outcome.verified);
        assert!(!outcome.dry_run);

        // Commit flipped the slot and recorded the image length.
        assert_eq!(pt.active_index, 0);
        assert_eq!(pt.len, 10_064);

        // 10 064 bytes across 4096-byte units: 4096 + 4096 + 1872 tail.
        assert_eq!(flash.erase_count(0), 1);
        assert_eq!(flash.erase_count(4096), 1);
        assert_eq!(flash.erase_count(8192), 1);
        assert_eq!(flash.erase_count(12288), 0);

        // Header lands at the region base, payload right behind it.
        assert_eq!(flash.contents(0, 8), b"EMBR_OTA");
        assert_eq!(flash.contents(64, 10_000), &payload[..]);
    }

    #[test]
    fn bad_magic_never_touches_the_destination() {
        let mut stream = firmware_stream(&[1, 2, 3]);
        stream[0] = b'?';

        let mut flash = MemFlash::new(0x8000, 4096);
        let sink = RawRegionSink::new(&mut flash, 0, 0x4000);
        let mut session = UploadSession::new(sink, firmware_config(None, false));

        assert!(matches!(
            session.feed(&stream),
            Err(UploadError::Protocol(_))
        ));
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(flash.total_erases(), 0);
        assert!(flash.contents(0, 0x8000).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn digest_mismatch_aborts_without_activation() {
        let payload = vec![7u8; 500];
        let mut stream =
            build_header(b"RAW\0", payload.len() as u32, [0xEE; 32]).to_vec();
        stream.extend_from_slice(&payload);

        let mut flash = MemFlash::new(0x8000, 4096);
        let mut pt = FirmwarePartition {
            address: [0, 0x4000],
            max_len: [0x4000, 0x4000],
            active_index: 0,
            len: 42,
        };
        let before = pt.clone();
        {
            let sink = RawRegionSink::new(&mut flash, 0x4000, 0x4000).with_partition(&mut pt);
            let mut session = UploadSession::new(sink, firmware_config(None, false));
            session.feed(&stream).unwrap();
            let err = session.finish().unwrap_err();
            assert!(matches!(err, UploadError::Integrity { .. }));
        }

        // Write-through happened, activation did not.
        assert_eq!(pt, before);
        assert_eq!(flash.contents(0x4000, 8), b"EMBR_OTA");
    }

    #[test]
    fn dry_run_leaves_partition_untouched() {
        let payload = vec![0xC3; 2000];
        let stream = firmware_stream(&payload);

        let mut flash = MemFlash::new(0x8000, 4096);
        let mut pt = FirmwarePartition {
            address: [0, 0x4000],
            max_len: [0x4000, 0x4000],
            active_index: 0,
            len: 9,
        };
        let before = pt.clone();
        let outcome = {
            let sink = RawRegionSink::new(&mut flash, 0x4000, 0x4000).with_partition(&mut pt);
            let mut session = UploadSession::new(sink, firmware_config(None, true));
            session.feed(&stream).unwrap();
            session.finish().unwrap()
        };

        assert!(outcome.verified);
        assert!(outcome.dry_run);
        assert_eq!(pt, before);
        // The erases and writes still happened.
        assert_eq!(flash.erase_count(0x4000), 1);
        assert_eq!(flash.contents(0x4000 + 64, 2000), &payload[..]);
    }

    #[test]
    fn chunk_size_does_not_change_the_result() {
        let payload: Vec<u8> = (0..9000u32).map(|i| (i % 251) as u8).collect();
        let stream = firmware_stream(&payload);

        let run = |chunk_size: usize| {
            let mut flash = MemFlash::new(0x8000, 4096);
            let sink = RawRegionSink::new(&mut flash, 0, 0x8000);
            let mut session = UploadSession::new(sink, firmware_config(None, false));
            for chunk in stream.chunks(chunk_size) {
                session.feed(chunk).unwrap();
            }
            let outcome = session.finish().unwrap();
            (outcome.digest, flash.contents(0, 0x8000).to_vec())
        };

        let (digest_one, flash_one) = run(1);
        let (digest_all, flash_all) = run(stream.len());
        assert_eq!(digest_one, digest_all);
        assert_eq!(flash_one, flash_all);
    }

    #[test]
    fn bytes_past_the_expected_total_are_ignored() {
        let mut sink = RecordingSink::default();
        let mut session = UploadSession::new(&mut sink, plain_config(Some(5)));
        session.feed(b"hello, world").unwrap();
        assert_eq!(session.bytes_accepted(), 5);
        let outcome = session.finish().unwrap();
        assert_eq!(outcome.bytes_accepted, 5);
        assert_eq!(sink.writes, vec![(0, b"hello".to_vec())]);
        assert_eq!(sink.committed, Some((5, false)));
    }

    #[test]
    fn missing_content_length_is_governed_by_the_header() {
        let payload = vec![9u8; 100];
        let mut stream = firmware_stream(&payload);
        // Garbage after the declared payload must be dropped.
        stream.extend_from_slice(&[0xFF; 300]);

        let mut flash = MemFlash::new(0x8000, 4096);
        let sink = RawRegionSink::new(&mut flash, 0, 0x4000);
        let mut session = UploadSession::new(sink, firmware_config(None, false));
        session.feed(&stream).unwrap();
        let outcome = session.finish().unwrap();
        assert_eq!(outcome.bytes_accepted, 164);
        assert!(outcome.verified);
    }

    #[test]
    fn truncated_header_fails_finish() {
        let mut sink = RecordingSink::default();
        let mut session = UploadSession::new(&mut sink, firmware_config(None, false));
        session.feed(&[0u8; 10]).unwrap();
        // feed() holds header bytes back until validation.
        assert!(sink.writes.is_empty());

        let mut session2 = UploadSession::new(&mut sink, firmware_config(None, false));
        session2.feed(b"EMBR").unwrap();
        assert!(matches!(
            session2.finish(),
            Err(UploadError::Protocol(_))
        ));
    }

    #[test]
    fn abort_preserves_accepted_count() {
        let mut sink = RecordingSink::default();
        let mut session = UploadSession::new(&mut sink, plain_config(None));
        session.feed(&[1u8; 6000]).unwrap();
        session.abort();
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(session.bytes_accepted(), 6000);
        assert!(session.finish().is_err());
    }

    #[test]
    fn empty_plain_upload_commits_zero_bytes() {
        let mut sink = RecordingSink::default();
        let session = UploadSession::new(&mut sink, plain_config(Some(0)));
        let outcome = session.finish().unwrap();
        assert_eq!(outcome.bytes_accepted, 0);
        assert_eq!(sink.committed, Some((0, false)));
    }

    #[test]
    fn early_eof_short_of_content_length_commits_what_arrived() {
        // Transport exhaustion is tolerated: the caller stops feeding and
        // finishes with whatever was received.
        let mut sink = RecordingSink::default();
        let mut session = UploadSession::new(&mut sink, plain_config(Some(1000)));
        session.feed(&[3u8; 400]).unwrap();
        let outcome = session.finish().unwrap();
        assert_eq!(outcome.bytes_accepted, 400);
        assert_eq!(sink.committed, Some((400, false)));
    }

    #[test]
    fn file_destination_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = FileSink::new(dir.path(), "assets/logo.bin").unwrap();
        let mut session = UploadSession::new(sink, plain_config(Some(9000)));

        let payload: Vec<u8> = (0..9000u32).map(|i| (i % 13) as u8).collect();
        for chunk in payload.chunks(1024) {
            session.feed(chunk).unwrap();
        }
        let outcome = session.finish().unwrap();
        assert_eq!(outcome.bytes_accepted, 9000);

        let written = std::fs::read(dir.path().join("assets/logo.bin")).unwrap();
        assert_eq!(written, payload);
    }

    #[test]
    fn first_header_bytes_precede_any_sink_write() {
        let payload = vec![1u8; 50];
        let stream = firmware_stream(&payload);

        let mut sink = RecordingSink::default();
        let mut session = UploadSession::new(
            &mut sink,
            SessionConfig {
                require_header: true,
                integrity: IntegrityPolicy::HeaderSha256,
                expected_total: None,
                block_size: 16,
                dry_run: false,
            },
        );
        // Feed only part of the header: nothing may reach the sink.
        session.feed(&stream[..40]).unwrap();
        assert!(sink.writes.is_empty());
        session.feed(&stream[40..]).unwrap();
        assert!(!sink.writes.is_empty());
    }
}
