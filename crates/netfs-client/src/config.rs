// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use netfs_proto::DEFAULT_PORT;
use serde::{Deserialize, Deserializer, Serialize, de};
use std::time::Duration;

/// Where the server lives and how long to wait for it.
///
/// Both timeouts are always in force; a configuration file with a zero
/// timeout is rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host name or address of the server.
    pub server: String,
    pub port: u16,
    #[serde(deserialize_with = "positive_millis")]
    pub connect_timeout_ms: u64,
    /// Applied to every read and write on the session socket.
    #[serde(deserialize_with = "positive_millis")]
    pub io_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 5_000,
            io_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            ..Self::default()
        }
    }

    /// Sub-millisecond values round up to one millisecond.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = millis_ceil(timeout);
        self
    }

    /// Sub-millisecond values round up to one millisecond.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout_ms = millis_ceil(timeout);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        bounded(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        bounded(self.io_timeout_ms)
    }
}

/// A zero stored directly in the fields still yields a bounded wait.
fn bounded(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

fn millis_ceil(timeout: Duration) -> u64 {
    let millis = timeout.as_nanos().div_ceil(1_000_000).max(1);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

fn positive_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match u64::deserialize(deserializer)? {
        0 => Err(de::Error::custom("timeout must be at least 1 millisecond")),
        ms => Ok(ms),
    }
}
