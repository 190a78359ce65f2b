//! Runtime tunables for the pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_SERVICE_ID;

pub const DEFAULT_SERVER_URL: &str = "wss://kr-ss1.chat.naver.com/chat";
pub const DEFAULT_MAX_VISIBLE: usize = 50;

/// What the credential provider resolves before the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCredentials {
    /// Chat-session channel id (not the streamer's public channel id).
    pub chat_channel_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub server_url: String,
    pub service_id: String,
    /// Cap on the visible list, the pending queue and the backlog request size.
    pub max_visible: usize,
    pub tick_interval: Duration,
    /// Ticks further apart than this flush the whole pending queue.
    pub catch_up_after: Duration,
    /// Outbound silence before a client PING.
    pub keepalive_interval: Duration,
    pub reconnect_delay: Duration,
    /// How long to wait for any inbound frame after a keepalive PING.
    /// `None` disables the check.
    pub liveness_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            service_id: DEFAULT_SERVICE_ID.to_string(),
            max_visible: DEFAULT_MAX_VISIBLE,
            tick_interval: Duration::from_millis(75),
            catch_up_after: Duration::from_millis(1000),
            keepalive_interval: Duration::from_secs(20),
            reconnect_delay: Duration::from_millis(1000),
            liveness_timeout: Some(Duration::from_secs(10)),
        }
    }
}
