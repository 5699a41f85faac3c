//! HTTP control surface for the ember firmware.
//!
//! Serves the `/api/` upload and read-back endpoints over plain HTTP,
//! one connection at a time: the device services requests sequentially,
//! so the handler owns the device state exclusively for the duration of
//! each request and no locking exists anywhere in this crate.

mod body;
mod envelope;
mod handlers;
mod http;
mod routes;
mod server;
mod state;

pub use body::BodyReader;
pub use envelope::{ErrorBody, FileErrorBody, FileOkBody, SizeBody, SuccessBody};
pub use http::{Method, RequestHead, Response};
pub use routes::{Route, RouteKind, resolve};
pub use server::RestServer;
pub use state::DeviceState;

/// Errors produced by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request head")]
    MalformedHead,

    #[error("request head too large")]
    HeadTooLarge,

    #[error("connection closed before the request head arrived")]
    ConnectionClosed,
}
