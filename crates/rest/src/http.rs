//! Minimal HTTP/1.1 request-head parsing and response writing.
//!
//! Just enough HTTP for the device's control surface: request line,
//! `Content-Length`, and whatever body bytes arrived alongside the head.
//! Every response closes the connection.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::RestError;

/// Upper bound on the request head; anything larger is rejected.
const MAX_HEAD_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Parsed request line plus the one header the device cares about.
#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    /// Request target with the leading `/` stripped (`api/ota`, ...).
    pub target: String,
    pub content_length: Option<u64>,
}

/// Reads and parses the request head.
///
/// Returns the head and any body bytes that were read past the blank
/// line; those are handed to the body reader, not thrown away.
pub async fn read_head(stream: &mut TcpStream) -> Result<(RequestHead, Vec<u8>), RestError> {
    let mut buf = Vec::with_capacity(1024);
    let mut tmp = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = find_blank_line(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_SIZE {
            return Err(RestError::HeadTooLarge);
        }
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            return Err(RestError::ConnectionClosed);
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = parse_head(&buf[..head_end])?;
    let leftover = buf[head_end + 4..].to_vec();
    Ok((head, leftover))
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_head(raw: &[u8]) -> Result<RequestHead, RestError> {
    let text = std::str::from_utf8(raw).map_err(|_| RestError::MalformedHead)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().ok_or(RestError::MalformedHead)?;
    let mut parts = request_line.split_whitespace();
    let method = match parts.next() {
        Some("GET") => Method::Get,
        Some("POST") => Method::Post,
        _ => return Err(RestError::MalformedHead),
    };
    let target = parts
        .next()
        .ok_or(RestError::MalformedHead)?
        .trim_start_matches('/')
        .to_string();

    let mut content_length = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse::<u64>().ok();
            }
        }
    }

    Ok(RequestHead {
        method,
        target,
        content_length,
    })
}

/// A complete response, written in one go with `Connection: close`.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    pub fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into_bytes(),
        }
    }

    pub fn octet_stream(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/octet-stream",
            body,
        }
    }

    pub async fn send(self, stream: &mut TcpStream) -> std::io::Result<()> {
        let reason = match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Unknown",
        };
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            reason,
            self.content_type,
            self.body.len()
        );
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(&self.body).await?;
        stream.flush().await
    }
}
