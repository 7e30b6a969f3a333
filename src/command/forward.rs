//! Stream forwarding between an attached container and the caller.
//!
//! The output task demultiplexes engine frames into the stdout and stderr
//! sinks. It reports readiness before its first read so the container is
//! never started ahead of the reader. The input task copies the caller's
//! stdin into the container and half-closes it on completion.

use std::io;
use std::time::Duration;

use bollard::container::LogOutput;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use super::pipe::{PipeWriter, SharedBuffer};
use crate::engine::{InputSink, OutputStream};

/// Caller-supplied input source.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Caller-supplied output sink.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Destination for one output stream.
pub(crate) enum Sink {
    Discard,
    Writer(BoxedWriter),
    Pipe(PipeWriter),
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Discard => "Discard",
            Self::Writer(_) => "Writer",
            Self::Pipe(_) => "Pipe",
        };
        f.write_str(kind)
    }
}

impl Sink {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Discard => Ok(()),
            Self::Writer(writer) => {
                writer.write_all(bytes).await?;
                writer.flush().await
            }
            Self::Pipe(pipe) => pipe.write_all(bytes).await,
        }
    }

    /// Release the sink once the stream has ended.
    ///
    /// Pipes see EOF on success and the stream error otherwise.
    pub(crate) async fn close(self, outcome: Result<(), &io::Error>) {
        match (self, outcome) {
            (Self::Discard, _) => {}
            (Self::Writer(mut writer), _) => {
                if let Err(error) = writer.flush().await {
                    debug!(%error, "flushing output sink failed");
                }
            }
            (Self::Pipe(pipe), Ok(())) => drop(pipe),
            (Self::Pipe(pipe), Err(error)) => {
                pipe.close_with_error(io::Error::new(error.kind(), error.to_string()))
                    .await;
            }
        }
    }
}

/// The sinks an output task writes to.
#[derive(Debug)]
pub(crate) struct OutputSinks {
    pub(crate) stdout: Sink,
    pub(crate) stderr: Sink,
    /// Copy of stderr kept for exit-error enrichment.
    pub(crate) capture: Option<SharedBuffer>,
}

impl OutputSinks {
    async fn route(&mut self, frame: LogOutput) {
        match frame {
            LogOutput::StdErr { message } => {
                if let Some(capture) = &self.capture {
                    capture.append(&message);
                }
                write_or_discard(&mut self.stderr, &message, "stderr").await;
            }
            LogOutput::StdOut { message }
            | LogOutput::Console { message }
            | LogOutput::StdIn { message } => {
                write_or_discard(&mut self.stdout, &message, "stdout").await;
            }
        }
    }

    async fn close(self, outcome: Result<(), &io::Error>) {
        self.stdout.close(outcome).await;
        self.stderr.close(outcome).await;
    }
}

/// A sink that fails is replaced by discard so the container is never
/// blocked on a reader that went away.
async fn write_or_discard(sink: &mut Sink, bytes: &[u8], stream: &'static str) {
    if let Err(error) = sink.write(bytes).await {
        debug!(%error, stream, "output sink failed; discarding further output");
        *sink = Sink::Discard;
    }
}

/// A running output task and its readiness signal.
#[derive(Debug)]
pub(crate) struct OutputTask {
    pub(crate) ready: oneshot::Receiver<()>,
    pub(crate) copier: OutputCopier,
}

/// Handle to a spawned output task.
#[derive(Debug)]
pub(crate) struct OutputCopier {
    done: JoinHandle<io::Result<()>>,
    abandon: oneshot::Sender<io::Error>,
}

impl OutputCopier {
    /// Wait for the stream to end on its own, returning the copy error.
    pub(crate) async fn drained(&mut self) -> Option<io::Error> {
        match (&mut self.done).await {
            Ok(outcome) => outcome.err(),
            Err(join) => Some(io::Error::other(join)),
        }
    }

    /// Stop copying and close the sinks with `error`.
    ///
    /// A task still blocked on a sink after `limit` is aborted, which drops
    /// its pipes without the error.
    pub(crate) async fn abandon(mut self, error: io::Error, limit: Duration) {
        if self.abandon.send(error).is_err() {
            debug!("output task already finished");
        }
        if timeout(limit, &mut self.done).await.is_err() {
            debug!("output task did not stop in time; aborting");
            self.done.abort();
        }
    }
}

/// Spawn the output-copy task.
pub(crate) fn spawn_output(mut output: OutputStream, mut sinks: OutputSinks) -> OutputTask {
    let (ready_tx, ready) = oneshot::channel();
    let (abandon, mut abandoned) = oneshot::channel();
    let done = tokio::spawn(async move {
        if ready_tx.send(()).is_err() {
            debug!("output readiness receiver dropped");
        }
        let outcome = copy_frames(&mut output, &mut sinks, &mut abandoned).await;
        let observed = match &outcome {
            Ok(()) => Ok(()),
            Err(error) => Err(error),
        };
        sinks.close(observed).await;
        outcome
    });
    OutputTask {
        ready,
        copier: OutputCopier { done, abandon },
    }
}

/// Copy frames until the stream ends, fails, or the task is abandoned.
async fn copy_frames(
    output: &mut OutputStream,
    sinks: &mut OutputSinks,
    abandoned: &mut oneshot::Receiver<io::Error>,
) -> io::Result<()> {
    let mut listening = true;
    loop {
        tokio::select! {
            biased;
            signal = &mut *abandoned, if listening => match signal {
                Ok(error) => return Err(error),
                Err(_) => listening = false,
            },
            frame = output.next() => match frame {
                Some(frame) => sinks.route(frame.map_err(io::Error::other)?).await,
                None => return Ok(()),
            },
        }
    }
}

/// Spawn the input-copy task.
///
/// The container's stdin is shut down when `source` is exhausted, so the
/// process observes end-of-input.
pub(crate) fn spawn_input(
    mut source: BoxedReader,
    mut input: InputSink,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(async move {
        let copied = tokio::io::copy(&mut source, &mut input).await;
        let closed = input.shutdown().await;
        let bytes = copied?;
        debug!(bytes, "stdin forwarded");
        closed
    })
}
