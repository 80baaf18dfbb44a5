//! Request and response schemas of the test-generation service
//!
//! These are the typed bodies carried inside `Call` and `Reply` frames.
//! Bodies are encoded with `bincode`; see [`encode_payload`] and
//! [`decode_payload`].

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ClientError;

/// Host and port of the test-generation service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("localhost", 2121)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Where the project lives and where generated tests go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectContext {
    pub project_name: String,
    pub project_path: PathBuf,
    /// Relative to `project_path`
    pub test_dir_relative: PathBuf,
    /// Relative to `project_path`
    pub build_dir_relative: PathBuf,
}

impl Default for ProjectContext {
    fn default() -> Self {
        Self {
            project_name: "project".to_string(),
            project_path: PathBuf::from("."),
            test_dir_relative: PathBuf::from("tests"),
            build_dir_relative: PathBuf::from("build"),
        }
    }
}

/// Generation knobs forwarded to the service untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsContext {
    pub generate_for_static_functions: bool,
    pub verbose: bool,
    /// Seconds; 0 disables the limit
    pub timeout_per_function: u32,
    /// Seconds; 0 disables the limit
    pub timeout_per_test: u32,
    pub use_deterministic_searcher: bool,
    pub use_stubs: bool,
}

impl Default for SettingsContext {
    fn default() -> Self {
        Self {
            generate_for_static_functions: true,
            verbose: false,
            timeout_per_function: 30,
            timeout_per_test: 30,
            use_deterministic_searcher: true,
            use_stubs: true,
        }
    }
}

/// Body shared by every generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectParams {
    pub project: ProjectContext,
    pub settings: SettingsContext,
    /// Build target; `None` lets the service pick
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileParams {
    pub project_params: ProjectParams,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderParams {
    pub project_params: ProjectParams,
    pub folder_path: PathBuf,
}

/// A position in a source file; used by line, function and class calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineParams {
    pub project_params: ProjectParams,
    pub file_path: PathBuf,
    /// 1-based
    pub line: u32,
}

/// Progress report interleaved with results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub message: String,
    /// 0.0 ..= 100.0
    pub percent: f32,
    pub completed: bool,
}

/// One generated test file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSource {
    pub file_path: PathBuf,
    pub tests_count: u32,
}

/// Streamed element of every generation call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestsResponse {
    pub progress: Option<Progress>,
    pub test_sources: Vec<TestSource>,
}

impl TestsResponse {
    /// A progress-only event
    pub fn progress(message: impl Into<String>, percent: f32) -> Self {
        Self {
            progress: Some(Progress {
                message: message.into(),
                percent,
                completed: false,
            }),
            test_sources: Vec::new(),
        }
    }

    /// The final event carrying generated sources
    pub fn generated(test_sources: Vec<TestSource>) -> Self {
        Self {
            progress: Some(Progress {
                message: "Tests generated".to_string(),
                percent: 100.0,
                completed: true,
            }),
            test_sources,
        }
    }

    /// Total number of tests carried by this event, saturating at `u32::MAX`
    pub fn tests_count(&self) -> u32 {
        self.test_sources
            .iter()
            .map(|s| s.tests_count)
            .fold(0u32, u32::saturating_add)
    }
}

/// Verbosity of the server log channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Body of the log channel calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogChannelParams {
    pub level: LogLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatParams {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatReply {
    /// Whether the service still knows this client id
    pub linked: bool,
}

/// Encode a call or reply body
pub fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, ClientError> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(ClientError::Encode)
}

/// Decode a call or reply body
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ClientError> {
    bincode::deserialize(payload).map_err(ClientError::Decode)
}

/// Final path component, if it is valid UTF-8
pub fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
