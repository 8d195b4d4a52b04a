use std::{env, time::Duration};

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("RELAY_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001)
}

pub fn sweep_interval() -> Duration {
    let secs = env::var("RELAY_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(30);
    Duration::from_secs(secs)
}

/// How long a finished room with lingering connections survives before the
/// sweeper deletes it.
pub fn finished_grace() -> Duration {
    let secs = env::var("RELAY_FINISHED_GRACE_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(300);
    Duration::from_secs(secs)
}

pub const OUTBOUND_CHANNEL_CAPACITY: usize = 256;
