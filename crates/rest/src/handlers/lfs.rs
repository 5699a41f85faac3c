//! Handler for streaming files into the hierarchical store.

use tracing::{info, warn};

use ember_upload::{
    FileSink, IntegrityPolicy, SessionConfig, UploadError, UploadSession,
};

use crate::body::BodyReader;
use crate::envelope::{file_error_response, file_ok_response};
use crate::http::{RequestHead, Response};
use crate::state::DeviceState;

use super::drive;

/// Store writes go through the same block accumulator as flash writes.
const STORE_BLOCK_SIZE: usize = 4096;

/// errno-flavored codes carried in the `error` field of failure bodies.
const ERR_INVALID_PATH: i32 = -22;
const ERR_IO: i32 = -5;

/// Streams the request body into a file under the store root, creating
/// intermediate directories as needed. The response always names the file
/// it was asked for, success or not.
pub(crate) async fn post_store_file(
    state: &mut DeviceState,
    rel_path: &str,
    head: &RequestHead,
    body: &mut BodyReader<'_>,
) -> Response {
    info!(fname = rel_path, length = ?head.content_length, "store upload starting");

    let sink = match FileSink::new(&state.store_root, rel_path) {
        Ok(sink) => sink,
        Err(e) => {
            warn!(fname = rel_path, error = %e, "store path rejected");
            return file_error_response(400, rel_path, ERR_INVALID_PATH);
        }
    };

    let config = SessionConfig {
        require_header: false,
        integrity: IntegrityPolicy::None,
        expected_total: head.content_length,
        block_size: STORE_BLOCK_SIZE,
        dry_run: false,
    };
    let mut session = UploadSession::new(sink, config);
    if let Err(e) = drive(&mut session, body).await {
        let accepted = session.bytes_accepted();
        warn!(fname = rel_path, error = %e, accepted, "store upload aborted");
        return file_error_response(400, rel_path, ERR_IO);
    }
    match session.finish() {
        Ok(outcome) => {
            info!(fname = rel_path, size = outcome.bytes_accepted, "store upload committed");
            file_ok_response(rel_path, outcome.bytes_accepted)
        }
        Err(e) => {
            let (status, code) = match e {
                UploadError::InvalidPath(_) => (400, ERR_INVALID_PATH),
                _ => (500, ERR_IO),
            };
            warn!(fname = rel_path, error = %e, "store upload rejected");
            file_error_response(status, rel_path, code)
        }
    }
}
