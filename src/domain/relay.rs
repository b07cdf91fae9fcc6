//! Byte relay between the client and the upstream once a tunnel is up.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub const PIPE_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_SIBLING_WAIT: Duration = Duration::from_secs(1);

/// Why a pipe direction stopped.
#[derive(Debug)]
pub enum PipeEnd {
    PeerClosed,
    Cancelled,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
}

#[derive(Debug)]
pub struct PipeOutcome {
    pub bytes: u64,
    pub end: PipeEnd,
}

impl PipeOutcome {
    /// The I/O error that ended this direction, if any.
    pub fn into_error(self) -> Option<io::Error> {
        match self.end {
            PipeEnd::ReadFailed(e) | PipeEnd::WriteFailed(e) => Some(e),
            PipeEnd::PeerClosed | PipeEnd::Cancelled => None,
        }
    }
}

/// Copies one chunk at a time from `source` to `destination` until the source
/// reaches EOF, either side fails, or `cancel` fires. On EOF the write side of
/// `destination` is shut down.
pub async fn pipe<R, W>(source: &mut R, destination: &mut W, cancel: &CancellationToken) -> PipeOutcome
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = [0u8; PIPE_BUFFER_SIZE];
    let mut bytes = 0u64;

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return PipeOutcome { bytes, end: PipeEnd::Cancelled },
            read = source.read(&mut buf) => match read {
                Ok(0) => {
                    // Pass the half-close on so the far side sees EOF too.
                    let _ = destination.shutdown().await;
                    return PipeOutcome { bytes, end: PipeEnd::PeerClosed };
                }
                Ok(n) => n,
                Err(e) => return PipeOutcome { bytes, end: PipeEnd::ReadFailed(e) },
            },
        };

        let write = async {
            destination.write_all(&buf[..n]).await?;
            destination.flush().await
        };
        tokio::select! {
            _ = cancel.cancelled() => return PipeOutcome { bytes, end: PipeEnd::Cancelled },
            written = write => {
                if let Err(e) = written {
                    return PipeOutcome { bytes, end: PipeEnd::WriteFailed(e) };
                }
            }
        }
        bytes += n as u64;
    }
}

#[derive(Debug)]
pub struct RelaySummary {
    pub client_to_upstream: PipeOutcome,
    /// `None` when the spawned direction did not finish within the wait bound.
    pub upstream_to_client: Option<PipeOutcome>,
}

impl RelaySummary {
    pub fn bytes(&self) -> (u64, u64) {
        (
            self.client_to_upstream.bytes,
            self.upstream_to_client.as_ref().map_or(0, |o| o.bytes),
        )
    }
}

/// Runs both directions of a tunnel. Upstream to client runs on its own task,
/// client to upstream runs inline.
///
/// If the upstream side ends first, or either direction fails, the other one is
/// cancelled at once. If the client finishes sending, the spawned direction
/// keeps delivering for at most `sibling_wait` before it is cancelled.
///
/// Both streams are dropped, and so closed, by the time this returns, unless the
/// spawned direction is still unwinding; it holds its halves only until it next
/// observes the cancellation.
pub async fn relay<C, U>(client: C, upstream: U, sibling_wait: Duration) -> RelaySummary
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);
    let cancel = CancellationToken::new();

    let sibling_cancel = cancel.clone();
    let mut sibling = tokio::spawn(async move {
        let outcome = pipe(&mut upstream_read, &mut client_write, &sibling_cancel).await;
        sibling_cancel.cancel();
        outcome
    });

    let client_to_upstream = pipe(&mut client_read, &mut upstream_write, &cancel).await;
    if !matches!(client_to_upstream.end, PipeEnd::PeerClosed) {
        cancel.cancel();
    }

    let upstream_to_client = match timeout(sibling_wait, &mut sibling).await {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(join_err)) => {
            tracing::debug!("upstream pipe task failed: {}", join_err);
            None
        }
        Err(_) => None,
    };
    cancel.cancel();

    RelaySummary {
        client_to_upstream,
        upstream_to_client,
    }
}
