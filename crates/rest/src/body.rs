//! Transport puller: reconstructs the request body from the bytes that
//! arrived with the head plus on-demand socket reads.

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Pulls body bytes for one request.
///
/// The leftover from head parsing is drained first; after that each
/// `pull` blocks on the socket. Reads never run past the declared
/// Content-Length, and when no length was declared the body is exactly
/// the leftover. `Ok(0)` means end of stream; a partial read is normal,
/// not an error. Errors are terminal — there is no retry here.
pub struct BodyReader<'a> {
    stream: &'a mut TcpStream,
    leftover: Vec<u8>,
    pos: usize,
    remaining: Option<u64>,
}

impl<'a> BodyReader<'a> {
    pub fn new(stream: &'a mut TcpStream, leftover: Vec<u8>, content_length: Option<u64>) -> Self {
        Self {
            stream,
            leftover,
            pos: 0,
            remaining: content_length,
        }
    }

    /// Pulls up to `buf.len()` body bytes.
    pub async fn pull(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        // Buffered body first.
        if self.pos < self.leftover.len() {
            let take = buf
                .len()
                .min(self.leftover.len() - self.pos)
                .min(self.cap(buf.len()));
            buf[..take].copy_from_slice(&self.leftover[self.pos..self.pos + take]);
            self.pos += take;
            self.consume(take);
            return Ok(take);
        }

        let max = self.cap(buf.len());
        if max == 0 {
            return Ok(0);
        }
        // No declared length: the body was exactly the leftover.
        if self.remaining.is_none() {
            return Ok(0);
        }

        let n = self.stream.read(&mut buf[..max]).await?;
        self.consume(n);
        Ok(n)
    }

    fn cap(&self, want: usize) -> usize {
        match self.remaining {
            Some(r) => want.min(r as usize),
            None => want,
        }
    }

    fn consume(&mut self, n: usize) {
        if let Some(r) = self.remaining.as_mut() {
            *r -= n as u64;
        }
    }
}
