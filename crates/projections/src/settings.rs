//! Coordinator-wide management settings loaded from environment variables.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Timeouts, retry budget and pacing shared by every managed projection.
///
/// Reads from environment variables:
/// - `PROJECTION_WRITE_ATTEMPTS`: attempts per log write/read (default: `5`)
/// - `PROJECTION_RETRY_MIN_DELAY_MS`: first backoff delay (default: `20`)
/// - `PROJECTION_RETRY_MAX_DELAY_MS`: backoff ceiling (default: `1000`)
/// - `PROJECTION_WRITE_TIMEOUT_MS`: per-attempt deadline (default: `5000`)
/// - `PROJECTION_STOP_TIMEOUT_MS`: drain deadline while stopping (default: `5000`)
/// - `PROJECTION_CHECKPOINT_AFTER`: events between checkpoints (default: `100`)
/// - `PROJECTION_BATCH_SIZE`: events read from `$all` per batch (default: `250`)
/// - `PROJECTION_IDLE_POLL_MS`: wait at the end of the log (default: `100`)
#[derive(Debug, Clone)]
pub struct ManagementSettings {
    pub write_attempts: usize,
    pub retry_min_delay: Duration,
    pub retry_max_delay: Duration,
    pub write_timeout: Duration,
    pub stop_timeout: Duration,
    pub checkpoint_after: u64,
    pub batch_size: usize,
    pub idle_poll: Duration,
    /// Capacity of each actor's command queue.
    pub command_queue: usize,
}

impl ManagementSettings {
    /// Loads settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            write_attempts: env_or("PROJECTION_WRITE_ATTEMPTS", defaults.write_attempts),
            retry_min_delay: env_ms("PROJECTION_RETRY_MIN_DELAY_MS", defaults.retry_min_delay),
            retry_max_delay: env_ms("PROJECTION_RETRY_MAX_DELAY_MS", defaults.retry_max_delay),
            write_timeout: env_ms("PROJECTION_WRITE_TIMEOUT_MS", defaults.write_timeout),
            stop_timeout: env_ms("PROJECTION_STOP_TIMEOUT_MS", defaults.stop_timeout),
            checkpoint_after: env_or("PROJECTION_CHECKPOINT_AFTER", defaults.checkpoint_after),
            batch_size: env_or("PROJECTION_BATCH_SIZE", defaults.batch_size),
            idle_poll: env_ms("PROJECTION_IDLE_POLL_MS", defaults.idle_poll),
            command_queue: defaults.command_queue,
        }
    }

    /// Exponential backoff with jitter, bounded by `write_attempts`.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.retry_min_delay)
            .with_max_delay(self.retry_max_delay)
            .with_max_times(self.write_attempts.saturating_sub(1))
            .with_jitter()
    }
}

impl Default for ManagementSettings {
    fn default() -> Self {
        Self {
            write_attempts: 5,
            retry_min_delay: Duration::from_millis(20),
            retry_max_delay: Duration::from_millis(1000),
            write_timeout: Duration::from_millis(5000),
            stop_timeout: Duration::from_millis(5000),
            checkpoint_after: 100,
            batch_size: 250,
            idle_poll: Duration::from_millis(100),
            command_queue: 64,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
