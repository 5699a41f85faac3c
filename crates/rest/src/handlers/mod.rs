//! Request handlers for the `/api/` surface.

mod flash;
mod lfs;

use tokio::net::TcpStream;

use ember_upload::{UploadError, UploadSession, UploadSink};

use crate::body::BodyReader;
use crate::envelope::error_response;
use crate::http::{RequestHead, Response};
use crate::routes::{RouteKind, resolve};
use crate::state::DeviceState;

/// Routes one parsed request to its handler and returns the response.
pub(crate) async fn dispatch(
    state: &mut DeviceState,
    head: &RequestHead,
    leftover: Vec<u8>,
    stream: &mut TcpStream,
) -> Response {
    let Some((kind, rest)) = resolve(head.method, &head.target) else {
        return error_response(404, "not found");
    };

    match kind {
        RouteKind::GetFlashRange => flash::get_flash_range(state, rest),
        RouteKind::PostOta => {
            let mut body = BodyReader::new(stream, leftover, head.content_length);
            flash::post_ota(state, head, &mut body, false).await
        }
        RouteKind::PostOtaDryRun => {
            let mut body = BodyReader::new(stream, leftover, head.content_length);
            flash::post_ota(state, head, &mut body, true).await
        }
        RouteKind::PostFlashAt => {
            let mut body = BodyReader::new(stream, leftover, head.content_length);
            flash::post_flash_at(state, rest, head, &mut body).await
        }
        RouteKind::PostFsBlock => {
            let mut body = BodyReader::new(stream, leftover, head.content_length);
            flash::post_fsblock(state, head, &mut body).await
        }
        RouteKind::PostStoreFile => {
            let mut body = BodyReader::new(stream, leftover, head.content_length);
            lfs::post_store_file(state, rest, head, &mut body).await
        }
    }
}

/// Feeds the session from the transport until the expected total is met
/// or the stream ends.
///
/// Clean end-of-stream short of the expected total is tolerated — the
/// bytes received so far become the final payload. A socket error aborts
/// the session; whatever was already written stays written.
pub(crate) async fn drive<S: UploadSink>(
    session: &mut UploadSession<S>,
    body: &mut BodyReader<'_>,
) -> Result<(), UploadError> {
    let mut buf = [0u8; 2048];
    loop {
        if session.remaining() == Some(0) {
            return Ok(());
        }
        let n = match body.pull(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => {
                session.abort();
                return Err(UploadError::Transport(e));
            }
        };
        session.feed(&buf[..n])?;
    }
}

/// HTTP status for an upload failure.
pub(crate) fn status_for(err: &UploadError) -> u16 {
    match err {
        UploadError::Protocol(_)
        | UploadError::Bounds { .. }
        | UploadError::Integrity { .. }
        | UploadError::Transport(_)
        | UploadError::InvalidPath(_) => 400,
        UploadError::Flash(_) | UploadError::Io(_) => 500,
    }
}
