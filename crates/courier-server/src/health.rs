//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Distinct users currently registered.
    pub online: usize,
    /// Open sockets, including superseded ones not yet closed.
    pub connections: usize,
    /// Registered user IDs, sorted.
    pub users: Vec<String>,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    online: usize,
    connections: usize,
    users: Vec<String>,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        online,
        connections,
        users,
    }
}
