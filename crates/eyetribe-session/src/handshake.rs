use std::time::Duration;

use eyetribe_protocol::{
    ProtocolMessage, Request, VALUE_FRAMERATE, VALUE_HEARTBEAT_INTERVAL, VALUE_IS_CALIBRATED,
    VALUE_TRACKER_STATE, VALUE_VERSION,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::error::{Result, SessionError};

/// Tracker values captured while connecting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerInfo {
    /// Protocol version the tracker reports (or the one declared, if it did not say).
    pub version: u32,
    /// Keep-alive period the tracker expects, in milliseconds.
    pub heartbeat_interval_ms: Option<u64>,
    pub is_calibrated: bool,
    pub framerate: Option<u32>,
    pub tracker_state: Option<u32>,
}

impl TrackerInfo {
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Name of the reported device state.
    pub fn tracker_state_name(&self) -> Option<&'static str> {
        self.tracker_state.map(|state| match state {
            0 => "CONNECTED",
            1 => "NOT_CONNECTED",
            2 => "CONNECTED_BADFW",
            3 => "CONNECTED_NOUSB3",
            4 => "CONNECTED_NOSTREAM",
            _ => "UNKNOWN",
        })
    }

    /// Read the handshake `get` reply, rejecting an incompatible version.
    pub(crate) fn from_reply(reply: &ProtocolMessage, declared_version: u32) -> Result<Self> {
        let version = match reply.value(VALUE_VERSION) {
            None | Some(Value::Null) => declared_version,
            Some(value) => as_u32(value).ok_or_else(|| {
                SessionError::Handshake(format!("tracker reported invalid version {value}"))
            })?,
        };
        if version != declared_version {
            return Err(SessionError::Handshake(format!(
                "tracker speaks protocol version {version}, client speaks {declared_version}"
            )));
        }

        Ok(Self {
            version,
            heartbeat_interval_ms: reply.value(VALUE_HEARTBEAT_INTERVAL).and_then(Value::as_u64),
            is_calibrated: reply
                .value(VALUE_IS_CALIBRATED)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            framerate: reply.value(VALUE_FRAMERATE).and_then(as_u32),
            tracker_state: reply.value(VALUE_TRACKER_STATE).and_then(as_u32),
        })
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
        .and_then(|v| u32::try_from(v).ok())
}

/// Declare the protocol version, then read the tracker's settings.
///
/// Every failure is reported as [`SessionError::Handshake`]; the caller owns
/// tearing the connection down.
pub(crate) fn perform(
    conn: &Connection,
    config: &SessionConfig,
    next_id: impl Fn() -> u64,
) -> Result<TrackerInfo> {
    let declare = Request::set_version(next_id(), config.protocol_version).into_handshake();
    conn.call(declare, config.handshake_timeout)
        .map_err(handshake_error)?;
    debug!(version = config.protocol_version, "protocol version accepted");

    let fields: Vec<&str> = config.handshake_fields.iter().map(String::as_str).collect();
    let query = Request::get(next_id(), &fields).into_handshake();
    let reply = conn
        .call(query, config.handshake_timeout)
        .map_err(handshake_error)?;

    TrackerInfo::from_reply(&reply, config.protocol_version)
}

fn handshake_error(err: SessionError) -> SessionError {
    match err {
        SessionError::Device { code, message } => {
            SessionError::Handshake(format!("tracker rejected handshake ({code}): {message}"))
        }
        SessionError::Timeout(after) => {
            SessionError::Handshake(format!("no handshake reply within {after:?}"))
        }
        SessionError::ConnectionClosed => {
            SessionError::Handshake("connection closed during handshake".to_string())
        }
        other => other,
    }
}
