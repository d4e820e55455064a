//! Tick timing and wall-clock helpers

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Authoritative simulation rate
pub const SIMULATION_TPS: u32 = 30;
/// Full snapshot rate, events go out every tick regardless
pub const SNAPSHOT_TPS: u32 = 20;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Fixed simulation step in seconds
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}
