//! Network listener and per-connection queue settings.

use serde::{Deserialize, Serialize};

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Address to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Largest accepted backend message, in bytes.
    pub max_message_size: usize,
    /// How long graceful shutdown waits for open connections.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9850,
            max_message_size: 16 * 1024 * 1024,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Per-connection queue sizing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Inbound queue capacity; a full queue stalls transport reads.
    pub inbound_capacity: usize,
    /// Outbound queue capacity.
    pub outbound_capacity: usize,
    /// How long teardown waits for the reader task after cancelling it.
    pub receiver_drain_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            inbound_capacity: 4,
            outbound_capacity: 256,
            receiver_drain_timeout_ms: 1_000,
        }
    }
}
