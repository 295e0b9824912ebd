//! `/health` payload.

use std::time::Instant;

use serde::Serialize;

/// Whether the worker still takes new connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving and accepting upgrades.
    Ok,
    /// Shutdown started; open connections are finishing.
    Draining,
}

/// Body returned by `GET /health`.
#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` or `draining`.
    pub status: HealthStatus,
    /// Worker name from settings.
    pub name: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Backend connections not yet torn down.
    pub connections: usize,
}

/// Snapshot the worker's health.
pub fn health_check(
    name: &str,
    started: Instant,
    connections: usize,
    draining: bool,
) -> HealthResponse {
    HealthResponse {
        status: if draining {
            HealthStatus::Draining
        } else {
            HealthStatus::Ok
        },
        name: name.to_owned(),
        uptime_secs: started.elapsed().as_secs(),
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn serving_worker_is_ok() {
        let resp = health_check("builder-1", Instant::now(), 0, false);
        assert_eq!(resp.status, HealthStatus::Ok);
        assert_eq!(resp.name, "builder-1");
    }

    #[test]
    fn draining_keeps_connection_count() {
        let resp = health_check("builder-1", Instant::now(), 3, true);
        assert_eq!(resp.status, HealthStatus::Draining);
        assert_eq!(resp.connections, 3);
    }

    #[test]
    fn uptime_counts_from_start() {
        let started = Instant::now().checked_sub(Duration::from_secs(90)).unwrap();
        assert!(health_check("w", started, 0, false).uptime_secs >= 89);
    }

    #[test]
    fn wire_shape() {
        let value = serde_json::to_value(health_check("w", Instant::now(), 2, true)).unwrap();
        assert_eq!(value["status"], "draining");
        assert_eq!(value["connections"], 2);
        assert!(value["uptime_secs"].is_u64());
    }
}
