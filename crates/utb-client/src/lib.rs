//! utb-client: client for the utbot test-generation service
//!
//! - [`client`]: one session, its lazily bound transport and the streaming
//!   `send` primitive
//! - [`manager`]: ownership of the current session and settings-driven
//!   restarts
//! - [`requests`]: typed generation requests and their runs
//! - [`channels`]: out-of-band log streams
//!
//! The `utbot` binary in this crate is a thin CLI over these modules.

pub mod channels;
pub mod client;
pub mod commands;
pub mod manager;
pub mod output;
pub mod requests;

pub use channels::{
    ChannelSink, LogChannel, LogChannelKind, LogSink, ServerLogChannel, TestFrameworkLogChannel,
    TracingSink,
};
pub use client::{Client, ConnectionStatus, ResponseStream, SessionOptions};
pub use manager::ClientManager;
pub use requests::{execute, RequestOutcome, RequestRun, TestsRequest};
