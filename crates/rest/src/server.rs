//! Accept loop for the control surface.
//!
//! Connections are serviced inline, one at a time. The device has a
//! single flash and a single partition table; a second uploader mid-OTA
//! would corrupt the staging slot, so requests queue at the listener
//! instead of interleaving.

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handlers;
use crate::http::read_head;
use crate::state::DeviceState;
use crate::RestError;

pub struct RestServer {
    state: DeviceState,
    cancel: CancellationToken,
}

impl RestServer {
    pub fn new(state: DeviceState) -> Self {
        Self {
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the accept loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serves requests until the cancellation token fires.
    pub async fn run(mut self, listener: TcpListener) -> Result<(), RestError> {
        info!(addr = %listener.local_addr()?, "control surface listening");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("control surface shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (mut stream, peer) = accepted?;
                    debug!(%peer, "connection accepted");
                    if let Err(e) = handle_connection(&mut self.state, &mut stream).await {
                        debug!(%peer, error = %e, "connection dropped");
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    state: &mut DeviceState,
    stream: &mut TcpStream,
) -> Result<(), RestError> {
    let (head, leftover) = read_head(stream).await?;
    debug!(
        method = ?head.method,
        target = %head.target,
        content_length = ?head.content_length,
        "request"
    );

    let response = handlers::dispatch(state, &head, leftover, stream).await;
    let status = response.status;
    response.send(stream).await?;
    debug!(status, "response sent");
    Ok(())
}
