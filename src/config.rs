// src/config.rs
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration, read once at boot from the environment (with
/// `.env` support via dotenvy in the binary). Every field has a default so
/// the relay runs with zero configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub api1_url: String,
    pub api2_url: String,
    pub poll_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub queue_capacity: usize,
    pub keepalive_secs: u64,
}

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";
const DEFAULT_API1_URL: &str = "http://88.99.61.159:4000/getdata";
const DEFAULT_API2_URL: &str = "http://94.130.136.44:4000/getdata";

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            api1_url: env_or("API1_URL", DEFAULT_API1_URL),
            api2_url: env_or("API2_URL", DEFAULT_API2_URL),
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS", 1),
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS", 5),
            queue_capacity: env_parse("SUBSCRIBER_QUEUE_CAPACITY", 100),
            keepalive_secs: env_parse("KEEPALIVE_SECS", 30),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }

    pub fn log_summary(&self) {
        tracing::info!(
            bind = %self.bind_address,
            api1 = %self.api1_url,
            api2 = %self.api2_url,
            interval_secs = self.poll_interval_secs,
            timeout_secs = self.fetch_timeout_secs,
            queue_capacity = self.queue_capacity,
            keepalive_secs = self.keepalive_secs,
            "relay configuration"
        );
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
