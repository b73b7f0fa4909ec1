//! Test doubles shared by the unit tests.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Reader that yields one line and then fails every read.
pub(crate) struct FailingReader {
    line: Option<&'static [u8]>,
}

impl FailingReader {
    pub(crate) fn after_line(line: &'static str) -> Self {
        Self {
            line: Some(line.as_bytes()),
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.line.take() {
            Some(line) => {
                buf.put_slice(line);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe broke"))),
        }
    }
}
