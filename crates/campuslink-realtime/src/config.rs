use std::time::Duration;

use crate::error::{ChannelError, Result};

/// Fixed delay between a transport close and the next connect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

pub const DEFAULT_API_ORIGIN: &str = "http://localhost:8000/api";

/// Settings for opening chat channels.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Base REST origin, e.g. `https://campuslink.example/api`.
    /// The WebSocket endpoint is derived from it.
    pub api_origin: String,

    pub reconnect_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            api_origin: DEFAULT_API_ORIGIN.to_string(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

impl ChannelConfig {
    pub fn new(api_origin: impl Into<String>) -> Self {
        Self {
            api_origin: api_origin.into(),
            ..Self::default()
        }
    }

    /// Read `CAMPUSLINK_API_URL` and `CAMPUSLINK_RECONNECT_DELAY_MS`,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_origin = lookup("CAMPUSLINK_API_URL").unwrap_or_else(|| DEFAULT_API_ORIGIN.into());

        let reconnect_delay = match lookup("CAMPUSLINK_RECONNECT_DELAY_MS") {
            Some(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|_| {
                    ChannelError::Config(format!(
                        "CAMPUSLINK_RECONNECT_DELAY_MS must be a whole number of milliseconds, got {:?}",
                        raw
                    ))
                })?;
                Duration::from_millis(ms)
            }
            None => RECONNECT_DELAY,
        };

        Ok(Self {
            api_origin,
            reconnect_delay,
        })
    }
}
