//! Client session
//!
//! A [`Client`] is one live session with the test-generation service: an
//! endpoint, the client id, the attached log channels and a lazily bound
//! transport. Sessions are never mutated in place; a settings change
//! replaces the whole session (see [`crate::manager`]).
//!
//! ## Lifecycle
//!
//! - [`Client::open`] performs no I/O on the calling task. A supervisor task
//!   heartbeats the service and re-attaches log channels whenever a new
//!   transport comes up.
//! - [`Client::send`] binds the transport on first use and returns a
//!   [`ResponseStream`].
//! - [`Client::dispose`] closes the transport, detaches the channels and ends
//!   in-flight streams. Any later `send` yields `SessionClosed`.

mod connection;
mod stream;

pub use stream::ResponseStream;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex as SyncMutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use utb_core::config::ClientConfig;
use utb_core::error::{ClientError, ConnectionError};
use utb_core::types::{encode_payload, HeartbeatParams, HeartbeatReply};
use utb_core::{ClientId, Endpoint};
use utb_protocol::{RpcMethod, StreamId};

use crate::channels::{self, AttachedChannel, LogChannel};
use connection::Connection;

/// Health of the session's transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No transport bound yet
    Init,
    /// Transport bound and answering heartbeats
    Connected,
    /// Last connect or heartbeat failed
    Broken,
    /// Session disposed
    Closed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Init => write!(f, "init"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Broken => write!(f, "broken"),
            ConnectionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Shortest heartbeat period a session runs with
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Timing knobs of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl SessionOptions {
    /// Heartbeat period actually used, never below [`MIN_HEARTBEAT_INTERVAL`]
    pub fn effective_heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL)
    }
}

impl From<&ClientConfig> for SessionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            heartbeat_interval: config.heartbeat_interval,
        }
    }
}

/// One session with the test-generation service
pub struct Client {
    endpoint: Endpoint,
    client_id: ClientId,
    options: SessionOptions,
    channels: Vec<Arc<dyn LogChannel>>,
    attached: SyncMutex<Vec<AttachedChannel>>,
    connection: Mutex<Option<Arc<Connection>>>,
    generation: AtomicU64,
    next_stream: AtomicU32,
    status: Arc<watch::Sender<ConnectionStatus>>,
    shutdown: CancellationToken,
    disposed: AtomicBool,
}

impl Client {
    /// Open a session; must be called within a Tokio runtime
    pub fn open(
        endpoint: Endpoint,
        client_id: ClientId,
        channels: Vec<Arc<dyn LogChannel>>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(ConnectionStatus::Init);
        let client = Arc::new(Self {
            endpoint,
            client_id,
            options,
            channels,
            attached: SyncMutex::new(Vec::new()),
            connection: Mutex::new(None),
            generation: AtomicU64::new(0),
            next_stream: AtomicU32::new(1),
            status: Arc::new(status),
            shutdown: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        });

        tracing::debug!(
            client_id = %client.client_id,
            endpoint = %client.endpoint,
            channels = client.channels.len(),
            "Opened client session"
        );

        let heartbeat = client.options.effective_heartbeat_interval();
        if heartbeat != client.options.heartbeat_interval {
            tracing::warn!(
                requested = ?client.options.heartbeat_interval,
                used = ?heartbeat,
                "Heartbeat interval too short, clamped"
            );
        }

        tokio::spawn(supervise(
            Arc::downgrade(&client),
            client.shutdown.clone(),
            heartbeat,
        ));

        client
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }

    pub fn server_name(&self) -> &str {
        &self.endpoint.host
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Invoke `method` with `request` and stream the typed responses
    ///
    /// Never fails directly: every failure, including calling this on a
    /// disposed session, is the terminal element of the returned stream.
    pub async fn send<Req, Resp>(
        &self,
        method: RpcMethod,
        request: &Req,
        cancellation: Option<CancellationToken>,
    ) -> ResponseStream<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned + Send + 'static,
    {
        if self.is_disposed() {
            return ResponseStream::failed(ClientError::SessionClosed);
        }

        let payload = match encode_payload(request) {
            Ok(payload) => payload,
            Err(e) => return ResponseStream::failed(e),
        };

        let cancel = cancellation.unwrap_or_default();
        let connection = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ResponseStream::failed(ClientError::Cancelled),
            bound = self.ensure_connected() => match bound {
                Ok(connection) => connection,
                Err(e) => return ResponseStream::failed(e),
            },
        };

        let stream_id = self.next_stream_id();
        match connection.open_stream(stream_id, &self.client_id, method, payload) {
            Ok(opened) => {
                tracing::debug!(
                    client_id = %self.client_id,
                    %stream_id,
                    %method,
                    "Call sent"
                );
                ResponseStream::open(opened, cancel)
            }
            Err(_) if self.is_disposed() => ResponseStream::failed(ClientError::SessionClosed),
            Err(e) => ResponseStream::failed(e.into()),
        }
    }

    /// One heartbeat round trip, bounded by the connect timeout
    pub async fn heartbeat(&self) -> Result<HeartbeatReply, ClientError> {
        let mut replies = self
            .send::<_, HeartbeatReply>(RpcMethod::Heartbeat, &HeartbeatParams::default(), None)
            .await;

        match tokio::time::timeout(self.options.connect_timeout, replies.next()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => Err(ConnectionError::Lost("heartbeat ended without reply".to_string()).into()),
            Err(_) => Err(ConnectionError::Timeout(self.endpoint.address()).into()),
        }
    }

    /// Close the transport and detach all channels; idempotent
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        for channel in self.attached.lock().drain(..) {
            channel.detach();
        }
        self.shutdown.cancel();
        self.status.send_replace(ConnectionStatus::Closed);

        tracing::info!(
            client_id = %self.client_id,
            endpoint = %self.endpoint,
            "Client session disposed"
        );
    }

    /// Bind the transport if there is no live one
    async fn ensure_connected(&self) -> Result<Arc<Connection>, ClientError> {
        let mut slot = self.connection.lock().await;

        if let Some(connection) = slot.as_ref() {
            if connection.is_alive() {
                return Ok(Arc::clone(connection));
            }
        }
        if let Some(stale) = slot.take() {
            stale.close();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let established = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ClientError::SessionClosed),
            result = Connection::establish(
                &self.endpoint,
                &self.client_id,
                self.options.connect_timeout,
                generation,
                &self.shutdown,
                Arc::clone(&self.status),
            ) => result,
        };

        match established {
            Ok(connection) => {
                let connection = Arc::new(connection);
                *slot = Some(Arc::clone(&connection));
                self.set_status(ConnectionStatus::Connected);
                Ok(connection)
            }
            Err(e) => {
                tracing::debug!(endpoint = %self.endpoint, error = %e, "Failed to bind transport");
                self.set_status(ConnectionStatus::Broken);
                Err(e.into())
            }
        }
    }

    /// Allocate a call stream id; wraps around skipping the control stream
    fn next_stream_id(&self) -> StreamId {
        loop {
            let id = StreamId::new(self.next_stream.fetch_add(1, Ordering::SeqCst));
            if !id.is_control() {
                return id;
            }
        }
    }

    /// `Closed` is final
    fn set_status(&self, status: ConnectionStatus) {
        if !self.is_disposed() {
            self.status.send_replace(status);
        }
    }

    /// Generation of the live transport, if any
    async fn live_generation(&self) -> Option<u64> {
        self.connection
            .lock()
            .await
            .as_ref()
            .filter(|c| c.is_alive())
            .map(|c| c.generation())
    }

    /// Attach every log channel to the current transport, replacing earlier
    /// attachments
    async fn attach_channels(&self) {
        let mut fresh = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            fresh.push(channels::attach(Arc::clone(channel), self).await);
        }

        let previous = std::mem::replace(&mut *self.attached.lock(), fresh);
        for channel in previous {
            channel.detach();
        }

        // dispose may have drained the list while we were attaching
        if self.is_disposed() {
            for channel in self.attached.lock().drain(..) {
                channel.detach();
            }
        }
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("status", &self.status())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Heartbeat loop; also attaches channels to each new transport
async fn supervise(client: Weak<Client>, shutdown: CancellationToken, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attached_generation = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(client) = client.upgrade() else {
            break;
        };

        match client.heartbeat().await {
            Ok(reply) => {
                if client.status() == ConnectionStatus::Broken {
                    client.set_status(ConnectionStatus::Connected);
                }
                if !reply.linked {
                    tracing::debug!(client_id = %client.client_id, "Service has not linked this client yet");
                }

                let generation = client.live_generation().await;
                if generation.is_some() && generation != attached_generation {
                    client.attach_channels().await;
                    attached_generation = generation;
                }
            }
            Err(_) if client.is_disposed() => break,
            Err(e) => {
                tracing::debug!(endpoint = %client.endpoint, error = %e, "Heartbeat failed");
                client.set_status(ConnectionStatus::Broken);
            }
        }
    }

    tracing::trace!("Session supervisor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_interval_is_clamped() {
        let zero = SessionOptions {
            connect_timeout: Duration::from_secs(1),
            heartbeat_interval: Duration::ZERO,
        };
        assert_eq!(zero.effective_heartbeat_interval(), MIN_HEARTBEAT_INTERVAL);

        let normal = SessionOptions::default();
        assert_eq!(normal.effective_heartbeat_interval(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stream_ids_skip_control_on_wrap() {
        let client = Client::open(
            Endpoint::new("127.0.0.1", 1),
            ClientId::from("wrap-00000"),
            vec![],
            SessionOptions::default(),
        );
        client.next_stream.store(u32::MAX, Ordering::SeqCst);

        assert_eq!(client.next_stream_id(), StreamId::new(u32::MAX));
        assert_eq!(client.next_stream_id(), StreamId::new(1));
        client.dispose();
    }
}
