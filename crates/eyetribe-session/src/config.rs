use std::fmt;
use std::time::Duration;

use eyetribe_protocol::{
    VALUE_FRAMERATE, VALUE_HEARTBEAT_INTERVAL, VALUE_IS_CALIBRATED, VALUE_TRACKER_STATE,
    VALUE_VERSION,
};
use eyetribe_transport::DEFAULT_MAX_MESSAGE;

/// Where the tracker server listens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Port the tracker server listens on unless configured otherwise.
    pub const DEFAULT_PORT: u16 = 6555;

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("localhost", Self::DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Session behavior configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on each TCP connection attempt.
    pub connect_timeout: Duration,
    /// Bound on each handshake reply.
    pub handshake_timeout: Duration,
    /// Bound on mode-change and pull-mode frame replies.
    pub request_timeout: Duration,
    /// Bound on waiting for a queued frame in push mode.
    pub frame_timeout: Duration,
    /// Protocol version declared during the handshake.
    pub protocol_version: u32,
    /// Tracker values requested during the handshake.
    pub handshake_fields: Vec<String>,
    /// Push-mode queue bound; when full the oldest frame is dropped. `None` = unbounded.
    pub frame_queue_capacity: Option<usize>,
    /// Measure push-mode `dT` from the first frame after entering push mode.
    pub rebase_push_time: bool,
    /// Send keep-alives at the interval the tracker announces.
    pub heartbeats: bool,
    /// Largest accepted wire message.
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            frame_timeout: Duration::from_secs(5),
            protocol_version: 1,
            handshake_fields: [
                VALUE_VERSION,
                VALUE_HEARTBEAT_INTERVAL,
                VALUE_IS_CALIBRATED,
                VALUE_FRAMERATE,
                VALUE_TRACKER_STATE,
            ]
            .iter()
            .map(|field| field.to_string())
            .collect(),
            frame_queue_capacity: None,
            rebase_push_time: false,
            heartbeats: true,
            max_message_size: DEFAULT_MAX_MESSAGE,
        }
    }
}

impl SessionConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Bound the push-mode queue; the oldest frame is dropped when full.
    pub fn with_frame_queue_capacity(mut self, capacity: usize) -> Self {
        self.frame_queue_capacity = Some(capacity);
        self
    }

    pub fn with_rebase_push_time(mut self, rebase: bool) -> Self {
        self.rebase_push_time = rebase;
        self
    }

    pub fn with_heartbeats(mut self, enabled: bool) -> Self {
        self.heartbeats = enabled;
        self
    }
}
