use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, ReadBuf};

/// Error payload carried by the I/O error a [`LimitedReader`] raises when
/// the stream overruns its ceiling.
#[derive(Debug)]
pub struct SizeLimitError {
    pub limit: u64,
}

impl fmt::Display for SizeLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream exceeds size limit ({} bytes)", self.limit)
    }
}

impl std::error::Error for SizeLimitError {}

/// Returns true when `err` was raised by a [`LimitedReader`] ceiling.
pub fn is_size_limit(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<SizeLimitError>())
}

/// Wraps a reader, counts the bytes it hands out, and fails on the poll
/// after `limit` bytes have been consumed.
///
/// Reaching the ceiling counts as an overrun even when the stream would have
/// ended exactly there; callers with a known size reject up front instead of
/// relying on the limiter. Bytes already read are still delivered before the
/// failure surfaces.
pub struct LimitedReader<R> {
    inner: R,
    limit: u64,
    read: u64,
}

impl<R> LimitedReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for LimitedReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = &mut *self;
        if me.read >= me.limit {
            return Poll::Ready(Err(io::Error::other(SizeLimitError { limit: me.limit })));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut me.inner).poll_read(cx, buf))?;
        me.read += (buf.filled().len() - before) as u64;

        Poll::Ready(Ok(()))
    }
}
