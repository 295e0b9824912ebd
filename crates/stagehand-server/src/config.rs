//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagehand_settings::WorkerSettings;

use crate::connection::ConnectionConfig;

/// Configuration for the worker server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Inbound queue capacity per connection.
    pub inbound_capacity: usize,
    /// Outbound queue capacity per connection.
    pub outbound_capacity: usize,
    /// Receiver drain timeout in milliseconds.
    pub receiver_drain_timeout_ms: u64,
    /// Graceful shutdown timeout in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 16 << 20,
            inbound_capacity: 4,
            outbound_capacity: 256,
            receiver_drain_timeout_ms: 1_000,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    /// Build from loaded worker settings.
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            inbound_capacity: settings.connection.inbound_capacity,
            outbound_capacity: settings.connection.outbound_capacity,
            receiver_drain_timeout_ms: settings.connection.receiver_drain_timeout_ms,
            shutdown_timeout_ms: settings.server.shutdown_timeout_ms,
        }
    }

    /// Per-connection settings.
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            inbound_capacity: self.inbound_capacity,
            outbound_capacity: self.outbound_capacity,
            receiver_drain_timeout: Duration::from_millis(self.receiver_drain_timeout_ms),
        }
    }

    /// Graceful shutdown timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
