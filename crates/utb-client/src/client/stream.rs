//! Lazily consumed response streams

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use utb_core::error::{ClientError, ConnectionError};
use utb_core::types::decode_payload;
use utb_protocol::StreamId;

use super::connection::{OpenStream, RouteEvent, StreamGuard};

/// Sequence of typed responses to one call
///
/// Yields `Ok` elements in the order the service produced them. A failed
/// call ends with exactly one `Err` element, after which the stream is
/// exhausted; elements delivered before the error stay delivered. A
/// cancelled call ends with `Err(ClientError::Cancelled)`. Dropping the
/// stream before its end cancels the call on the service.
pub struct ResponseStream<T> {
    stream_id: Option<StreamId>,
    inner: BoxStream<'static, Result<T, ClientError>>,
}

struct State<T> {
    receiver: mpsc::UnboundedReceiver<RouteEvent>,
    guard: StreamGuard,
    cancel: CancellationToken,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResponseStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub(crate) fn open(opened: OpenStream, cancel: CancellationToken) -> Self {
        let stream_id = opened.guard.stream_id();
        let state = State::<T> {
            receiver: opened.receiver,
            guard: opened.guard,
            cancel,
            done: false,
            _marker: PhantomData,
        };

        let inner = stream::unfold(state, |mut st| async move {
            if st.done {
                return None;
            }

            let item = tokio::select! {
                biased;
                _ = st.cancel.cancelled() => {
                    st.guard.cancel_remote();
                    Err(ClientError::Cancelled)
                }
                event = st.receiver.recv() => match event {
                    Some(RouteEvent::Reply(payload)) => match decode_payload::<T>(&payload) {
                        Ok(value) => return Some((Ok(value), st)),
                        Err(e) => {
                            st.guard.cancel_remote();
                            Err(e)
                        }
                    },
                    Some(RouteEvent::End) => {
                        st.guard.finish();
                        return None;
                    }
                    Some(RouteEvent::Failed(e)) => {
                        st.guard.finish();
                        Err(e)
                    }
                    None => {
                        st.guard.finish();
                        Err(ConnectionError::Lost("response stream dropped".to_string()).into())
                    }
                }
            };

            st.done = true;
            Some((item, st))
        })
        .boxed();

        Self {
            stream_id: Some(stream_id),
            inner,
        }
    }

    /// A stream whose only element is `error`
    pub(crate) fn failed(error: ClientError) -> Self {
        Self {
            stream_id: None,
            inner: stream::once(async move { Err(error) }).boxed(),
        }
    }
}

impl<T> ResponseStream<T> {
    /// Stream id on the wire, if the call reached the transport
    pub fn stream_id(&self) -> Option<StreamId> {
        self.stream_id
    }
}

impl<T> Stream for ResponseStream<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T> std::fmt::Debug for ResponseStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("stream_id", &self.stream_id)
            .finish_non_exhaustive()
    }
}
