//! Incremental size enforcement for inbound bodies.
//!
//! [`LimitedBody`] wraps the transport-provided `http_body::Body` and counts
//! data-frame bytes as they arrive. The frame that would push the count past
//! the limit is replaced by [`DecodeError::EntityTooLarge`], so a caller can
//! never mistake a truncated body for a complete one. Nothing is buffered
//! here; collection happens in [`collect_limited`].

use crate::error::DecodeError;
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use std::error::Error;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pub(crate) type BoxError = Box<dyn Error + Send + Sync>;

pin_project! {
    /// A body that yields at most `limit` bytes of data.
    #[derive(Debug)]
    pub struct LimitedBody<B> {
        #[pin]
        inner: B,
        limit: usize,
        consumed: usize,
    }
}

impl<B> LimitedBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    pub fn new(inner: B, limit: usize) -> Self {
        Self { inner, limit, consumed: 0 }
    }
}

impl<B> Body for LimitedBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = DecodeError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    *this.consumed += data.len();
                    if *this.consumed > *this.limit {
                        return Poll::Ready(Some(Err(DecodeError::entity_too_large(*this.limit, *this.consumed))));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => {
                let cause: BoxError = e.into();
                Poll::Ready(Some(Err(DecodeError::stream(cause))))
            }
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Reads the whole body through a [`LimitedBody`] into one buffer.
///
/// A lower size-hint bound already past the limit is rejected before any
/// byte is read, which covers bodies with a declared Content-Length.
pub(crate) async fn collect_limited<B>(body: B, limit: usize) -> Result<Bytes, DecodeError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let declared = body.size_hint().lower();
    if declared > limit as u64 {
        return Err(DecodeError::entity_too_large(limit, declared as usize));
    }

    let collected = LimitedBody::new(body, limit).collect().await?;
    Ok(collected.to_bytes())
}
