//! utb-core: Core types, errors and configuration for the utbot client
//!
//! This crate provides the request/response schemas spoken with the
//! test-generation service, the client identity, the error taxonomy and the
//! configuration file layer shared by the client library and the CLI.

pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use error::{ClientError, ConfigError, ConnectionError};
pub use identity::ClientId;
pub use types::{Endpoint, LogLevel, ProjectContext, SettingsContext, TestsResponse};
