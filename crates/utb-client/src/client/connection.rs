//! One bound transport of a session
//!
//! A `Connection` owns a framed TCP stream split into a writer task and a
//! reader task. Call streams are multiplexed by stream id: the reader routes
//! every incoming frame to the receiver registered for its id.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use utb_core::error::{ClientError, ConnectionError};
use utb_core::{ClientId, Endpoint};
use utb_protocol::{Frame, FrameCodec, Message, RpcMethod, StreamId, PROTOCOL_VERSION};

use super::ConnectionStatus;

/// What the reader delivers to one call stream
#[derive(Debug)]
pub(crate) enum RouteEvent {
    Reply(Bytes),
    End,
    Failed(ClientError),
}

pub(crate) type Routes = Arc<DashMap<StreamId, mpsc::UnboundedSender<RouteEvent>>>;

/// A live transport to the service
pub(crate) struct Connection {
    generation: u64,
    outgoing: mpsc::UnboundedSender<Frame>,
    routes: Routes,
    /// Cancelled once the transport is gone, for any reason
    closed: CancellationToken,
}

impl Connection {
    /// Connect to `endpoint` and perform the handshake, both within `timeout`
    ///
    /// `session` is the owning session's shutdown token; disposing the
    /// session closes the connection.
    pub(crate) async fn establish(
        endpoint: &Endpoint,
        client_id: &ClientId,
        timeout: Duration,
        generation: u64,
        session: &CancellationToken,
        status: Arc<watch::Sender<ConnectionStatus>>,
    ) -> Result<Self, ConnectionError> {
        let address = endpoint.address();
        tracing::debug!(%address, generation, "Connecting to test-generation service");

        let framed = tokio::time::timeout(timeout, async {
            let stream = TcpStream::connect(&address)
                .await
                .map_err(|e| ConnectionError::Refused {
                    address: address.clone(),
                    reason: e.to_string(),
                })?;
            let _ = stream.set_nodelay(true);
            let mut framed = Framed::new(stream, FrameCodec::new());
            handshake(&mut framed, client_id).await?;
            Ok::<_, ConnectionError>(framed)
        })
        .await
        .map_err(|_| ConnectionError::Timeout(address.clone()))??;

        let (mut sink, mut stream) = framed.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Frame>();
        let routes: Routes = Arc::new(DashMap::new());
        let closed = session.child_token();

        // Writer
        let writer_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = writer_closed.cancelled() => break,
                    frame = outgoing_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = sink.send(frame).await {
                            tracing::debug!(error = %e, "Write to service failed");
                            break;
                        }
                    }
                }
            }
            writer_closed.cancel();
            let _ = sink.close().await;
        });

        // Reader
        let reader_routes = Arc::clone(&routes);
        let reader_closed = closed.clone();
        let session = session.clone();
        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    biased;
                    _ = reader_closed.cancelled() => break "connection closed".to_string(),
                    next = stream.next() => match next {
                        Some(Ok(frame)) => dispatch(&reader_routes, frame),
                        Some(Err(e)) => break e.to_string(),
                        None => break "connection closed by service".to_string(),
                    }
                }
            };

            reader_closed.cancel();
            let disposed = session.is_cancelled();
            let open = fail_all(&reader_routes, || {
                if disposed {
                    ConnectionError::Disposed
                } else {
                    ConnectionError::Lost(reason.clone())
                }
            });

            if disposed {
                tracing::debug!(generation, open, "Connection closed with session");
            } else {
                tracing::warn!(generation, open, %reason, "Connection to service lost");
                status.send_replace(ConnectionStatus::Broken);
            }
        });

        tracing::info!(%address, generation, "Connected to test-generation service");

        Ok(Self {
            generation,
            outgoing,
            routes,
            closed,
        })
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Register a route for `stream_id` and send the `Call` frame
    pub(crate) fn open_stream(
        &self,
        stream_id: StreamId,
        client_id: &ClientId,
        method: RpcMethod,
        payload: Bytes,
    ) -> Result<OpenStream, ConnectionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.insert(stream_id, tx);

        // The reader cancels `closed` before failing routes, so a route
        // inserted before this check is always failed by it.
        if self.closed.is_cancelled() {
            self.routes.remove(&stream_id);
            return Err(ConnectionError::Lost("connection closed".to_string()));
        }

        let call = Message::Call {
            client_id: client_id.to_string(),
            method,
            payload,
        };
        if self.outgoing.send(Frame::new(stream_id, call)).is_err() {
            self.routes.remove(&stream_id);
            return Err(ConnectionError::Lost("writer stopped".to_string()));
        }

        Ok(OpenStream {
            receiver: rx,
            guard: StreamGuard {
                stream_id,
                routes: Arc::clone(&self.routes),
                outgoing: self.outgoing.clone(),
                open: true,
            },
        })
    }

    pub(crate) fn close(&self) {
        self.closed.cancel();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Receiving side of a freshly opened call stream
pub(crate) struct OpenStream {
    pub(crate) receiver: mpsc::UnboundedReceiver<RouteEvent>,
    pub(crate) guard: StreamGuard,
}

/// Unregisters a call stream; tells the service to stop if still open
pub(crate) struct StreamGuard {
    stream_id: StreamId,
    routes: Routes,
    outgoing: mpsc::UnboundedSender<Frame>,
    open: bool,
}

impl StreamGuard {
    pub(crate) fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The service ended the stream
    pub(crate) fn finish(&mut self) {
        self.open = false;
        self.routes.remove(&self.stream_id);
    }

    /// The client gave up on the stream
    pub(crate) fn cancel_remote(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.routes.remove(&self.stream_id);
        let _ = self
            .outgoing
            .send(Frame::new(self.stream_id, Message::Cancel));
        tracing::debug!(stream_id = %self.stream_id, "Sent cancel");
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.cancel_remote();
    }
}

async fn handshake(
    framed: &mut Framed<TcpStream, FrameCodec>,
    client_id: &ClientId,
) -> Result<(), ConnectionError> {
    let hello = Message::Handshake {
        client_id: client_id.to_string(),
        version: PROTOCOL_VERSION.to_string(),
    };
    framed
        .send(Frame::new(StreamId::CONTROL, hello))
        .await
        .map_err(|e| ConnectionError::Handshake(e.to_string()))?;

    match framed.next().await {
        Some(Ok(Frame {
            message: Message::HandshakeAck { server_version },
            ..
        })) => {
            if server_version != PROTOCOL_VERSION {
                tracing::warn!(
                    client = PROTOCOL_VERSION,
                    server = %server_version,
                    "Protocol version mismatch with service"
                );
            }
            Ok(())
        }
        Some(Ok(Frame {
            message: Message::Error { message, .. },
            ..
        })) => Err(ConnectionError::Handshake(message)),
        Some(Ok(frame)) => Err(ConnectionError::Handshake(format!(
            "unexpected {:?} frame",
            frame.message.message_type()
        ))),
        Some(Err(e)) => Err(ConnectionError::Handshake(e.to_string())),
        None => Err(ConnectionError::Handshake(
            "connection closed during handshake".to_string(),
        )),
    }
}

fn dispatch(routes: &Routes, frame: Frame) {
    let stream_id = frame.stream_id;
    let event = match frame.message {
        Message::Reply(payload) => {
            if let Some(route) = routes.get(&stream_id) {
                let _ = route.send(RouteEvent::Reply(payload));
            } else {
                tracing::trace!(%stream_id, "Reply for closed stream");
            }
            return;
        }
        Message::End => RouteEvent::End,
        Message::Error { code, message } => RouteEvent::Failed(ClientError::Server { code, message }),
        other => {
            tracing::warn!(%stream_id, message_type = ?other.message_type(), "Unexpected frame from service");
            return;
        }
    };

    if let Some((_, route)) = routes.remove(&stream_id) {
        let _ = route.send(event);
    }
}

/// Fail every open route; returns how many there were
fn fail_all(routes: &Routes, error: impl Fn() -> ConnectionError) -> usize {
    let ids: Vec<StreamId> = routes.iter().map(|r| *r.key()).collect();
    let mut failed = 0;
    for id in ids {
        if let Some((_, route)) = routes.remove(&id) {
            let _ = route.send(RouteEvent::Failed(ClientError::Connection(error())));
            failed += 1;
        }
    }
    failed
}
