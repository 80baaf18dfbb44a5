//! Message types for the utbot wire protocol
//!
//! A connection carries many independent streams. The client opens a
//! stream by sending `Call` on a fresh stream id; the service answers on the
//! same id with zero or more `Reply` frames followed by exactly one `End` or
//! `Error`. The client may send `Cancel` on an open stream at any time.
//!
//! # Message Flow
//!
//! 1. Client connects and sends `Handshake` on the control stream
//! 2. Service responds with `HandshakeAck`
//! 3. For each call: `Call` → `Reply`* → `End` | `Error`
//! 4. Log channels are long-lived calls whose replies are log lines
//!
//! Payloads of `Call` and `Reply` are opaque here; the typed request and
//! response schemas live in `utb-core`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current protocol version string.
///
/// Sent in the `Handshake`. Format: "MAJOR.MINOR".
pub const PROTOCOL_VERSION: &str = "1.0";

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Client greeting with its identity
    Handshake = 0x01,
    /// Service answer to the greeting
    HandshakeAck = 0x02,
    /// Open a call stream
    Call = 0x03,
    /// One streamed response element
    Reply = 0x04,
    /// Normal end of a call stream
    End = 0x05,
    /// Client asks the service to stop a call stream
    Cancel = 0x06,
    /// Terminal error on a call stream
    Error = 0xFF,
}

impl MessageType {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Handshake),
            0x02 => Some(Self::HandshakeAck),
            0x03 => Some(Self::Call),
            0x04 => Some(Self::Reply),
            0x05 => Some(Self::End),
            0x06 => Some(Self::Cancel),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

/// Methods exposed by the test-generation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcMethod {
    GenerateFileTests,
    GenerateFolderTests,
    GenerateProjectTests,
    GenerateFunctionTests,
    GenerateLineTests,
    GenerateClassTests,
    /// Stream of server log lines
    OpenLogChannel,
    /// Stream of test-framework output lines
    OpenTestFrameworkChannel,
    Heartbeat,
}

impl RpcMethod {
    /// Wire-stable method name, used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::GenerateFileTests => "generateFileTests",
            RpcMethod::GenerateFolderTests => "generateFolderTests",
            RpcMethod::GenerateProjectTests => "generateProjectTests",
            RpcMethod::GenerateFunctionTests => "generateFunctionTests",
            RpcMethod::GenerateLineTests => "generateLineTests",
            RpcMethod::GenerateClassTests => "generateClassTests",
            RpcMethod::OpenLogChannel => "openLogChannel",
            RpcMethod::OpenTestFrameworkChannel => "openGTestChannel",
            RpcMethod::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes carried by `Message::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    Unknown = 0,
    /// Malformed call payload
    InvalidRequest = 1,
    /// Method not served by this backend
    UnsupportedMethod = 2,
    /// Referenced file, folder or function does not exist
    NotFound = 3,
    /// Backend failed while generating
    Internal = 4,
    /// Backend is shutting down or overloaded
    Unavailable = 5,
    /// Stream was cancelled on request
    Cancelled = 6,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Unknown => "unknown",
            ErrorCode::InvalidRequest => "invalid request",
            ErrorCode::UnsupportedMethod => "unsupported method",
            ErrorCode::NotFound => "not found",
            ErrorCode::Internal => "internal",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// First message on a new connection
    Handshake {
        /// Identity of the logical client
        client_id: String,
        /// Client protocol version (`PROTOCOL_VERSION`)
        version: String,
    },

    HandshakeAck {
        /// Protocol version spoken by the service
        server_version: String,
    },

    /// Open a call stream
    Call {
        /// Identity of the logical client, repeated on every call so the
        /// service can correlate concurrent streams
        client_id: String,
        method: RpcMethod,
        /// Encoded request body
        payload: Bytes,
    },

    /// One encoded response element
    Reply(Bytes),

    End,

    Cancel,

    Error {
        code: ErrorCode,
        message: String,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Handshake { .. } => MessageType::Handshake,
            Message::HandshakeAck { .. } => MessageType::HandshakeAck,
            Message::Call { .. } => MessageType::Call,
            Message::Reply(_) => MessageType::Reply,
            Message::End => MessageType::End,
            Message::Cancel => MessageType::Cancel,
            Message::Error { .. } => MessageType::Error,
        }
    }

    /// Whether this message closes the stream it arrives on
    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::End | Message::Error { .. })
    }
}
