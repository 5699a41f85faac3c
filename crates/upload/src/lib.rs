//! Streaming persistent-upload engine.
//!
//! Reconstructs a logical byte stream from arbitrarily-chunked input,
//! gates it on a validated image header, accumulates erase-unit-aligned
//! blocks, digests the payload incrementally, and commits the result to a
//! raw flash region or a file store through the [`UploadSink`] trait.
//!
//! Write-through happens before verification: a failed digest or a dead
//! transport leaves the destination partially written (only final
//! activation is gated). Callers own that contract; see [`UploadSession`].

mod block;
mod digest;
mod header;
mod path;
mod session;
mod sink;

pub use block::BlockAccumulator;
pub use digest::{DIGEST_SIZE, PayloadDigest, digest_bytes};
pub use header::{HEADER_MAGIC, HEADER_SIZE, HeaderCollector, HeaderProgress, ImageKind, UploadHeader};
pub use path::validate_store_path;
pub use session::{IntegrityPolicy, Outcome, SessionConfig, SessionState, UploadSession};
pub use sink::{FileSink, RawRegionSink, UploadSink};

use ember_flash::FlashError;

/// Errors produced by the upload engine.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Malformed or missing image header.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Write would exceed the destination region.
    #[error("write beyond destination bounds: offset {offset:#x} + {len:#x} > {max:#x}")]
    Bounds { offset: u64, len: u64, max: u64 },

    /// Computed payload digest does not match the header's.
    #[error("sha256 mismatch: header {expected}, computed {actual}")]
    Integrity { expected: String, actual: String },

    /// The live connection failed mid-stream.
    #[error("transport error: {0}")]
    Transport(std::io::Error),

    /// The flash device reported an erase/program/read failure.
    #[error("flash error: {0}")]
    Flash(#[from] FlashError),

    /// The file store reported a write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Upload path escapes the store root.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}
