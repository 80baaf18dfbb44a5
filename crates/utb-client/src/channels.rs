//! Log channels
//!
//! The service streams two kinds of log output out of band: its own server
//! log and the output of the test framework it drives. A [`LogChannel`]
//! subscribes to one of them for as long as the session lives and hands each
//! line, unchanged, to a [`LogSink`].

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use utb_core::types::{LogChannelParams, LogLevel};
use utb_protocol::RpcMethod;

use crate::client::Client;

/// Which log stream a channel subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogChannelKind {
    ServerLog,
    TestFrameworkLog,
}

impl fmt::Display for LogChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogChannelKind::ServerLog => write!(f, "server log"),
            LogChannelKind::TestFrameworkLog => write!(f, "test framework log"),
        }
    }
}

/// Destination for log lines
pub trait LogSink: Send + Sync {
    fn on_line(&self, line: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_line(&self, line: &str) {
        self(line)
    }
}

/// Re-emits lines through `tracing`
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    kind: LogChannelKind,
}

impl TracingSink {
    pub fn new(kind: LogChannelKind) -> Self {
        Self { kind }
    }
}

impl LogSink for TracingSink {
    fn on_line(&self, line: &str) {
        // Sole source of the per-kind targets; tracing needs them as literals
        match self.kind {
            LogChannelKind::ServerLog => tracing::info!(target: "utbot::server", "{}", line),
            LogChannelKind::TestFrameworkLog => {
                tracing::info!(target: "utbot::test_framework", "{}", line)
            }
        }
    }
}

/// Forwards lines into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink(pub mpsc::UnboundedSender<String>);

impl LogSink for ChannelSink {
    fn on_line(&self, line: &str) {
        // Receiver gone means nobody is listening any more
        let _ = self.0.send(line.to_string());
    }
}

/// A subscription to one of the service's log streams
pub trait LogChannel: Send + Sync {
    fn kind(&self) -> LogChannelKind;

    /// Method that opens the log stream on the service
    fn open_method(&self) -> RpcMethod {
        match self.kind() {
            LogChannelKind::ServerLog => RpcMethod::OpenLogChannel,
            LogChannelKind::TestFrameworkLog => RpcMethod::OpenTestFrameworkChannel,
        }
    }

    fn open_request(&self) -> LogChannelParams;

    fn on_line(&self, line: &str);
}

/// The service's own log, filtered at `level` on the service side
pub struct ServerLogChannel {
    level: LogLevel,
    sink: Box<dyn LogSink>,
}

impl ServerLogChannel {
    pub fn new(level: LogLevel, sink: impl LogSink + 'static) -> Self {
        Self {
            level,
            sink: Box::new(sink),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }
}

impl LogChannel for ServerLogChannel {
    fn kind(&self) -> LogChannelKind {
        LogChannelKind::ServerLog
    }

    fn open_request(&self) -> LogChannelParams {
        LogChannelParams { level: self.level }
    }

    fn on_line(&self, line: &str) {
        self.sink.on_line(line);
    }
}

/// Output of the test framework the service runs
pub struct TestFrameworkLogChannel {
    sink: Box<dyn LogSink>,
}

impl TestFrameworkLogChannel {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }
}

impl LogChannel for TestFrameworkLogChannel {
    fn kind(&self) -> LogChannelKind {
        LogChannelKind::TestFrameworkLog
    }

    fn open_request(&self) -> LogChannelParams {
        // Framework output is not level-filtered
        LogChannelParams {
            level: LogLevel::Trace,
        }
    }

    fn on_line(&self, line: &str) {
        self.sink.on_line(line);
    }
}

/// A channel attached to one transport of a session
#[derive(Debug)]
pub struct AttachedChannel {
    kind: LogChannelKind,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl AttachedChannel {
    pub fn kind(&self) -> LogChannelKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop forwarding; the open call is cancelled on the service
    pub fn detach(self) {
        self.token.cancel();
    }
}

/// Open `channel`'s log stream on `client` and forward it until detached or
/// the session goes away
pub(crate) async fn attach(channel: Arc<dyn LogChannel>, client: &Client) -> AttachedChannel {
    let kind = channel.kind();
    let token = client.shutdown_token().child_token();
    let mut lines = client
        .send::<_, String>(channel.open_method(), &channel.open_request(), Some(token.clone()))
        .await;

    let client_id = client.client_id().clone();
    let task = tokio::spawn(async move {
        let mut forwarded = 0usize;
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    channel.on_line(&line);
                    forwarded += 1;
                }
                Err(e) if e.is_cancellation() => break,
                Err(e) => {
                    tracing::debug!(%client_id, %kind, error = %e, "Log channel ended");
                    break;
                }
            }
        }
        tracing::trace!(%client_id, %kind, forwarded, "Log channel detached");
    });

    AttachedChannel { kind, token, task }
}
