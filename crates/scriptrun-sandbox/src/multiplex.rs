//! Merges a child's stdout and stderr into one ordered event sequence.
//!
//! Each stream gets its own reader task; both feed one channel. Lines keep
//! their order within a stream, and streams interleave by arrival at the
//! channel. Sequence numbers are assigned on dequeue.

use crate::output::{ExecutionEvent, StreamKind, TRUNCATION_MARKER};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Message from a reader task.
#[derive(Debug)]
enum Delivery {
    Line(StreamKind, String),
    Truncated(StreamKind),
    Failed(StreamKind, String),
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    /// A line arrived.
    Event(ExecutionEvent),
    /// A reader hit an I/O error and stopped.
    Failed { stream: StreamKind, message: String },
    /// Nothing arrived within the poll timeout.
    Idle,
    /// Both streams reached end-of-stream and everything was delivered.
    Closed,
}

/// Single-consumer view over both output streams of one child.
pub struct StreamMultiplexer {
    rx: mpsc::UnboundedReceiver<Delivery>,
    readers: Vec<JoinHandle<()>>,
    next_sequence: u64,
    truncated: bool,
    closed: bool,
}

impl StreamMultiplexer {
    /// Start one reader task per present stream.
    ///
    /// Each stream forwards at most `max_bytes`; past that a single
    /// truncation line is emitted and the rest is read and discarded so the
    /// child never blocks on a full pipe.
    pub fn start<O, E>(stdout: Option<O>, stderr: Option<E>, max_bytes: usize) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = stdout {
            readers.push(tokio::spawn(drain(
                stdout,
                StreamKind::Stdout,
                tx.clone(),
                max_bytes,
            )));
        }
        if let Some(stderr) = stderr {
            readers.push(tokio::spawn(drain(
                stderr,
                StreamKind::Stderr,
                tx.clone(),
                max_bytes,
            )));
        }
        drop(tx);

        Self {
            rx,
            readers,
            next_sequence: 0,
            truncated: false,
            closed: false,
        }
    }

    /// Wait up to `timeout` for the next line.
    pub async fn poll(&mut self, timeout: Duration) -> Polled {
        if self.closed {
            return Polled::Closed;
        }

        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(delivery) => self.dequeue(delivery),
            Err(_) => Polled::Idle,
        }
    }

    /// Whether either stream exceeded the output cap.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Stop the reader tasks.
    pub fn abort(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }

    fn dequeue(&mut self, delivery: Option<Delivery>) -> Polled {
        let (stream, text) = match delivery {
            Some(Delivery::Line(stream, text)) => (stream, text),
            Some(Delivery::Truncated(stream)) => {
                self.truncated = true;
                (stream, TRUNCATION_MARKER.to_string())
            }
            Some(Delivery::Failed(stream, message)) => {
                return Polled::Failed { stream, message };
            }
            None => {
                self.closed = true;
                return Polled::Closed;
            }
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Polled::Event(ExecutionEvent {
            stream,
            text,
            sequence,
        })
    }
}

impl Drop for StreamMultiplexer {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Read one stream line by line until end-of-stream.
async fn drain<R>(
    reader: R,
    stream: StreamKind,
    tx: mpsc::UnboundedSender<Delivery>,
    max_bytes: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut forwarded = 0usize;
    let mut capped = false;

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(n) => {
                if capped {
                    continue;
                }

                forwarded += n;
                let delivery = if forwarded > max_bytes {
                    capped = true;
                    Delivery::Truncated(stream)
                } else {
                    Delivery::Line(stream, String::from_utf8_lossy(&line).into_owned())
                };

                if tx.send(delivery).is_err() {
                    // Consumer is gone
                    break;
                }
            }
            Err(e) => {
                warn!(%stream, error = %e, "Error reading stream");
                let _ = tx.send(Delivery::Failed(stream, e.to_string()));
                break;
            }
        }
    }

    trace!(%stream, "Stream reached end");
}
