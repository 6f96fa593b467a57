//! Line-oriented transport with idle and payload deadlines.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::error::TransportError;

/// Default cap on a single command line, in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 8 * 1024;

type BoxReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Both halves of a client connection.
///
/// Lines are read up to `\n` with an optional trailing `\r` removed. Each
/// outgoing line is terminated with `\n` and flushed immediately.
pub struct LineChannel {
    reader: BoxReader,
    writer: BoxWriter,
    idle_timeout: Duration,
    max_line_len: usize,
}

impl LineChannel {
    pub fn new<R, W>(reader: R, writer: W, idle_timeout: Duration) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            idle_timeout,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    pub fn with_max_line_len(mut self, len: usize) -> Self {
        self.max_line_len = len;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Reads one line, waiting at most the idle timeout.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. A line longer than the
    /// configured cap ends the session.
    pub async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        let limit = self.max_line_len as u64 + 1;
        let mut limited = (&mut self.reader).take(limit);
        let read = limited.read_until(b'\n', &mut buf);

        let n = tokio::time::timeout(self.idle_timeout, read)
            .await
            .map_err(|_| TransportError::IdleTimeout(self.idle_timeout))??;

        if n == 0 {
            return Err(TransportError::Closed);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        } else if buf.len() > self.max_line_len {
            return Err(TransportError::LineTooLong(self.max_line_len));
        }

        let line = String::from_utf8_lossy(&buf).into_owned();
        trace!(line = %line, "line received");
        Ok(line)
    }

    /// Reads exactly `len` bytes within `deadline`.
    ///
    /// Returns `Ok(None)` when the deadline passes first. The rest of the
    /// block is then still read and dropped, each read bounded by the idle
    /// timeout, so a late tail is never parsed as command lines.
    pub async fn read_exact_within(
        &mut self,
        len: usize,
        deadline: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        let read = async {
            while filled < len {
                let n = self.reader.read(&mut buf[filled..]).await?;
                if n == 0 {
                    return Err(TransportError::Closed);
                }
                filled += n;
            }
            Ok::<(), TransportError>(())
        };

        let outcome = tokio::time::timeout(deadline, read).await;
        match outcome {
            Ok(Ok(())) => Ok(Some(buf)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let remaining = len - filled;
                trace!(received = filled, remaining, "payload deadline passed, draining");
                self.discard(remaining).await?;
                Ok(None)
            }
        }
    }

    /// Reads and drops `len` bytes.
    async fn discard(&mut self, mut len: usize) -> Result<(), TransportError> {
        let mut scratch = [0u8; 4096];
        while len > 0 {
            let want = len.min(scratch.len());
            let n = tokio::time::timeout(self.idle_timeout, self.reader.read(&mut scratch[..want]))
                .await
                .map_err(|_| TransportError::IdleTimeout(self.idle_timeout))??;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            len -= n;
        }
        Ok(())
    }

    pub async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        trace!(line = %line, "line sent");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
