//! In-process pipe endpoints and the shared capture buffer.
//!
//! A pipe is a bounded channel of byte chunks. The writing end is an
//! [`AsyncWrite`] over a [`PollSender`]; the reading end is an [`AsyncRead`]
//! that yields chunks in order, then EOF once every writer is gone, or the
//! error the writer was closed with.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

const PIPE_CAPACITY: usize = 16;

type Chunk = io::Result<Bytes>;

/// Create a connected pipe.
pub(crate) fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(PIPE_CAPACITY);
    (
        PipeWriter {
            tx: PollSender::new(tx),
        },
        PipeReader {
            rx,
            pending: Bytes::new(),
        },
    )
}

/// Reading end of a command pipe.
///
/// Returned by [`Command::stdout_pipe`](super::Command::stdout_pipe) and
/// [`Command::stderr_pipe`](super::Command::stderr_pipe). Reaches EOF when
/// the container's output stream ends.
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Chunk>,
    pending: Bytes,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let len = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending.split_to(len));
                return Poll::Ready(Ok(()));
            }
            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => this.pending = chunk,
                Some(Err(error)) => return Poll::Ready(Err(error)),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

/// Writing end of a command pipe.
///
/// Returned by [`Command::stdin_pipe`](super::Command::stdin_pipe). Shut it
/// down or drop it to signal end-of-input to the container.
#[derive(Debug)]
pub struct PipeWriter {
    tx: PollSender<Chunk>,
}

impl PipeWriter {
    /// Deliver `error` to the reader in place of EOF.
    pub(crate) async fn close_with_error(self, error: io::Error) {
        if let Some(tx) = self.tx.get_ref().cloned() {
            drop(self);
            if tx.send(Err(error)).await.is_err() {
                tracing::debug!("pipe reader dropped before the close error was delivered");
            }
        }
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.tx.poll_reserve(cx)).map_err(|_| broken_pipe())?;
        this.tx
            .send_item(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| broken_pipe())?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().tx.close();
        Poll::Ready(Ok(()))
    }
}

/// Growable in-memory sink shared between the forwarder and the caller.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Copy out everything written so far.
    pub(crate) fn contents(&self) -> Vec<u8> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn append(&self, bytes: &[u8]) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.append(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
