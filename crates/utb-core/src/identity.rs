//! Client identity
//!
//! A client id has the shape `<user>-<ddddd>`: the current user name and five
//! independently drawn decimal digits. It is generated once per manager and
//! survives session restarts, so the service can attribute every stream of
//! one logical client to the same id.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of random digits appended to the user name
pub const RANDOM_SEQUENCE_LENGTH: usize = 5;

/// Exclusive upper bound of each random digit
pub const RANDOM_SEQUENCE_MAX_VALUE: u32 = 10;

/// User name used when `USER` is not set
pub const FALLBACK_USER: &str = "user";

/// Opaque identifier tagging every call from one logical client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    /// Wrap an existing id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id from the `USER` environment variable
    pub fn generate() -> Self {
        Self::generate_with(std::env::var("USER").ok(), &mut rand::thread_rng())
    }

    /// Generate an id for `user` (falling back to `"user"`) using `rng`
    pub fn generate_with<R: Rng + ?Sized>(user: Option<String>, rng: &mut R) -> Self {
        let user = user
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_USER.to_string());

        let sequence: String = (0..RANDOM_SEQUENCE_LENGTH)
            .map(|_| {
                char::from_digit(rng.gen_range(0..RANDOM_SEQUENCE_MAX_VALUE), 10).unwrap_or('0')
            })
            .collect();

        Self(format!("{}-{}", user, sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
