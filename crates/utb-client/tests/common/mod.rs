//! Scripted in-process test-generation service
//!
//! Listens on an ephemeral port, answers the handshake and heartbeats, and
//! plays a per-method script for every call. Records what it saw so tests
//! can assert on identities, calls and cancels.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use utb_core::types::{HeartbeatReply, TestSource};
use utb_core::{Endpoint, TestsResponse};
use utb_protocol::{ErrorCode, Frame, FrameCodec, Message, RpcMethod, StreamId, PROTOCOL_VERSION};

/// One scripted action on a call stream
#[derive(Debug, Clone)]
pub enum Step {
    Reply(Bytes),
    Delay(Duration),
    End,
    Error(ErrorCode, String),
    /// Keep the stream open until the client cancels it
    Hang,
    /// Drop the whole connection
    Disconnect,
}

impl Step {
    pub fn reply<T: Serialize>(value: &T) -> Self {
        Step::Reply(Bytes::from(bincode::serialize(value).unwrap()))
    }

    pub fn delay_ms(ms: u64) -> Self {
        Step::Delay(Duration::from_millis(ms))
    }
}

/// Three progress events then the generated sources, `tests_count` tests in
/// total
pub fn generation_script(file_path: &str, tests_count: u32) -> Vec<Step> {
    vec![
        Step::reply(&TestsResponse::progress("Building project", 25.0)),
        Step::reply(&TestsResponse::progress("Generating tests", 50.0)),
        Step::reply(&TestsResponse::progress("Writing tests", 75.0)),
        Step::reply(&TestsResponse::generated(vec![TestSource {
            file_path: file_path.into(),
            tests_count,
        }])),
        Step::End,
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub client_id: String,
    pub method: RpcMethod,
    pub stream_id: StreamId,
}

#[derive(Default)]
struct ServiceState {
    scripts: Mutex<HashMap<RpcMethod, Vec<Step>>>,
    log_lines: Mutex<HashMap<RpcMethod, Vec<String>>>,
    handshakes: Mutex<Vec<String>>,
    calls: Mutex<Vec<RecordedCall>>,
    cancels: Mutex<Vec<StreamId>>,
    connections: AtomicUsize,
    disconnects: AtomicUsize,
}

pub struct FakeService {
    addr: SocketAddr,
    state: Arc<ServiceState>,
    shutdown: CancellationToken,
}

impl FakeService {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServiceState::default());
        let shutdown = CancellationToken::new();

        let accept_state = Arc::clone(&state);
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        accept_state.connections.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(serve(
                            stream,
                            Arc::clone(&accept_state),
                            accept_shutdown.child_token(),
                        ));
                    }
                }
            }
        });

        Self {
            addr,
            state,
            shutdown,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.addr.port())
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn script(&self, method: RpcMethod, steps: Vec<Step>) {
        self.state.scripts.lock().insert(method, steps);
    }

    /// Lines streamed to every log channel opened with `method`
    pub fn log_lines(&self, method: RpcMethod, lines: &[&str]) {
        self.state
            .log_lines
            .lock()
            .insert(method, lines.iter().map(|l| l.to_string()).collect());
    }

    pub fn handshakes(&self) -> Vec<String> {
        self.state.handshakes.lock().clone()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().clone()
    }

    pub fn calls_for(&self, method: RpcMethod) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }

    pub fn cancels(&self) -> Vec<StreamId> {
        self.state.cancels.lock().clone()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Connections that have been closed, by either side
    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Stop accepting and drop every connection
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for FakeService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn serve(stream: TcpStream, state: Arc<ServiceState>, closed: CancellationToken) {
    let (mut sink, mut frames) = Framed::new(stream, FrameCodec::new()).split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    let writer_closed = closed.clone();
    tokio::spawn(async move {
        // Drain queued frames before honouring a close
        loop {
            tokio::select! {
                biased;
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                }
                _ = writer_closed.cancelled() => break,
            }
        }
        let _ = sink.close().await;
    });

    let mut streams: HashMap<StreamId, CancellationToken> = HashMap::new();

    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = frames.next() => match frame {
                Some(Ok(frame)) => frame,
                _ => break,
            },
        };

        match frame.message {
            Message::Handshake { client_id, .. } => {
                state.handshakes.lock().push(client_id);
                let ack = Message::HandshakeAck {
                    server_version: PROTOCOL_VERSION.to_string(),
                };
                let _ = tx.send(Frame::new(StreamId::CONTROL, ack));
            }
            Message::Call {
                client_id, method, ..
            } => {
                state.calls.lock().push(RecordedCall {
                    client_id,
                    method,
                    stream_id: frame.stream_id,
                });
                let token = closed.child_token();
                streams.insert(frame.stream_id, token.clone());
                let steps = steps_for(&state, method);
                tokio::spawn(play(frame.stream_id, steps, tx.clone(), token, closed.clone()));
            }
            Message::Cancel => {
                state.cancels.lock().push(frame.stream_id);
                if let Some(token) = streams.remove(&frame.stream_id) {
                    token.cancel();
                }
            }
            _ => {}
        }
    }

    closed.cancel();
    state.disconnects.fetch_add(1, Ordering::SeqCst);
}

fn steps_for(state: &ServiceState, method: RpcMethod) -> Vec<Step> {
    match method {
        RpcMethod::Heartbeat => vec![Step::reply(&HeartbeatReply { linked: true }), Step::End],
        RpcMethod::OpenLogChannel | RpcMethod::OpenTestFrameworkChannel => {
            let lines = state.log_lines.lock().get(&method).cloned().unwrap_or_default();
            let mut steps: Vec<Step> = lines.iter().map(Step::reply).collect();
            steps.push(Step::Hang);
            steps
        }
        _ => state.scripts.lock().get(&method).cloned().unwrap_or_else(|| {
            vec![Step::Error(
                ErrorCode::UnsupportedMethod,
                format!("no script for {}", method),
            )]
        }),
    }
}

async fn play(
    stream_id: StreamId,
    steps: Vec<Step>,
    tx: mpsc::UnboundedSender<Frame>,
    cancelled: CancellationToken,
    connection: CancellationToken,
) {
    for step in steps {
        if cancelled.is_cancelled() {
            return;
        }
        match step {
            Step::Reply(payload) => {
                let _ = tx.send(Frame::new(stream_id, Message::Reply(payload)));
            }
            Step::Delay(duration) => {
                tokio::select! {
                    _ = cancelled.cancelled() => return,
                    _ = tokio::time::sleep(duration) => {}
                }
            }
            Step::End => {
                let _ = tx.send(Frame::new(stream_id, Message::End));
                return;
            }
            Step::Error(code, message) => {
                let _ = tx.send(Frame::new(stream_id, Message::Error { code, message }));
                return;
            }
            Step::Hang => {
                cancelled.cancelled().await;
                return;
            }
            Step::Disconnect => {
                connection.cancel();
                return;
            }
        }
    }
}
