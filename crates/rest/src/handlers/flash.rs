//! Handlers that write to or read from the raw flash device.

use tracing::{info, warn};

use ember_upload::{
    IntegrityPolicy, RawRegionSink, SessionConfig, UploadSession, UploadSink,
};

use crate::body::BodyReader;
use crate::envelope::{error_response, size_response};
use crate::http::{RequestHead, Response};
use crate::state::DeviceState;

use super::{drive, status_for};

/// Streams a firmware image into the staging slot. The stream must open
/// with a 64-byte image header and its payload digest must match before
/// the slot is activated; with `dry_run` the write still happens but the
/// partition table is left untouched.
pub(crate) async fn post_ota(
    state: &mut DeviceState,
    head: &RequestHead,
    body: &mut BodyReader<'_>,
    dry_run: bool,
) -> Response {
    let slot = state.partition.staging_index();
    let base = state.partition.staging_address();
    let max_len = state.partition.staging_max_len();
    info!(slot, base = format_args!("{base:#x}"), max_len, dry_run, "firmware upload starting");

    let config = SessionConfig {
        require_header: true,
        integrity: IntegrityPolicy::HeaderSha256,
        expected_total: head.content_length,
        block_size: state.flash.erase_unit() as usize,
        dry_run,
    };
    let sink = RawRegionSink::new(&mut *state.flash, base, max_len)
        .with_partition(&mut state.partition);
    run_upload(sink, config, body).await
}

/// Streams a raw body to an arbitrary flash address given as hex in the
/// request target. Writes below the protected boundary are refused; no
/// header or digest check applies.
pub(crate) async fn post_flash_at(
    state: &mut DeviceState,
    rest: &str,
    head: &RequestHead,
    body: &mut BodyReader<'_>,
) -> Response {
    let Ok(start) = u32::from_str_radix(rest, 16) else {
        return error_response(400, "invalid url");
    };
    let flash_size = state.flash.size();
    if start < state.layout.ota_start || start >= flash_size {
        return error_response(400, "invalid url");
    }
    info!(start = format_args!("{start:#x}"), "raw flash write starting");

    let config = SessionConfig {
        require_header: false,
        integrity: IntegrityPolicy::None,
        expected_total: head.content_length,
        block_size: state.flash.erase_unit() as usize,
        dry_run: false,
    };
    let sink = RawRegionSink::new(&mut *state.flash, start, flash_size - start);
    run_upload(sink, config, body).await
}

/// Rewrites the file-store backing region wholesale with the request body.
pub(crate) async fn post_fsblock(
    state: &mut DeviceState,
    head: &RequestHead,
    body: &mut BodyReader<'_>,
) -> Response {
    let (start, size) = match state.layout.fs_region() {
        Ok(region) => region,
        Err(e) => {
            warn!(error = %e, "file-store region rejected");
            return error_response(400, "fs size mismatch");
        }
    };
    info!(start = format_args!("{start:#x}"), size, "file-store region rewrite starting");

    let config = SessionConfig {
        require_header: false,
        integrity: IntegrityPolicy::None,
        expected_total: head.content_length,
        block_size: state.flash.erase_unit() as usize,
        dry_run: false,
    };
    let sink = RawRegionSink::new(&mut *state.flash, start, size);
    run_upload(sink, config, body).await
}

/// Reads back a `start-length` hex range as raw bytes, in bounded slices.
pub(crate) fn get_flash_range(state: &DeviceState, rest: &str) -> Response {
    const READ_SLICE: usize = 1024;

    let parsed = rest.split_once('-').and_then(|(s, l)| {
        Some((
            u32::from_str_radix(s, 16).ok()?,
            u32::from_str_radix(l, 16).ok()?,
        ))
    });
    let Some((start, len)) = parsed else {
        return error_response(400, "invalid url");
    };
    let end = match start.checked_add(len) {
        Some(end) if end <= state.flash.size() => end,
        _ => return error_response(400, "requested flash read out of range"),
    };

    let mut out = Vec::with_capacity(len as usize);
    let mut buf = [0u8; READ_SLICE];
    let mut addr = start;
    while addr < end {
        let n = ((end - addr) as usize).min(READ_SLICE);
        if let Err(e) = state.flash.read(addr, &mut buf[..n]) {
            warn!(error = %e, addr = format_args!("{addr:#x}"), "flash read failed");
            return error_response(500, "flash read failed");
        }
        out.extend_from_slice(&buf[..n]);
        addr += n as u32;
    }
    Response::octet_stream(out)
}

async fn run_upload<S: UploadSink>(
    sink: S,
    config: SessionConfig,
    body: &mut BodyReader<'_>,
) -> Response {
    let mut session = UploadSession::new(sink, config);
    if let Err(e) = drive(&mut session, body).await {
        let accepted = session.bytes_accepted();
        warn!(error = %e, accepted, "upload aborted");
        return error_response(status_for(&e), format!("{e} after {accepted} bytes"));
    }
    match session.finish() {
        Ok(outcome) => {
            info!(
                size = outcome.bytes_accepted,
                verified = outcome.verified,
                dry_run = outcome.dry_run,
                "upload committed"
            );
            size_response(outcome.bytes_accepted)
        }
        Err(e) => {
            warn!(error = %e, "upload rejected");
            error_response(status_for(&e), e.to_string())
        }
    }
}
