//! Tracker status codes.
//!
//! 2xx-5xx answer a request; 8xx are unsolicited device state notices.

/// Request succeeded.
pub const STATUS_OK: u16 = 200;

/// Malformed or unsupported request.
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Request not allowed in the tracker's current state.
pub const STATUS_FORBIDDEN: u16 = 403;

/// Tracker server internal failure.
pub const STATUS_SERVER_ERROR: u16 = 500;

/// Calibration state changed.
pub const STATUS_CALIBRATION_CHANGE: u16 = 800;

/// Display configuration changed.
pub const STATUS_DISPLAY_CHANGE: u16 = 801;

/// Tracker device state changed.
pub const STATUS_TRACKER_STATE_CHANGE: u16 = 802;

/// Returns a human-readable name for a status code.
pub fn status_name(code: u16) -> &'static str {
    match code {
        STATUS_OK => "OK",
        STATUS_BAD_REQUEST => "BAD_REQUEST",
        STATUS_FORBIDDEN => "FORBIDDEN",
        STATUS_SERVER_ERROR => "SERVER_ERROR",
        STATUS_CALIBRATION_CHANGE => "CALIBRATION_CHANGE",
        STATUS_DISPLAY_CHANGE => "DISPLAY_CHANGE",
        STATUS_TRACKER_STATE_CHANGE => "TRACKER_STATE_CHANGE",
        800..=899 => "NOTICE",
        _ => "ERROR",
    }
}

pub fn is_ok(code: u16) -> bool {
    code == STATUS_OK
}

/// Returns true for unsolicited state-change notices.
pub fn is_notice(code: u16) -> bool {
    (800..=899).contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_ranges() {
        assert_eq!(status_name(STATUS_OK), "OK");
        assert_eq!(status_name(STATUS_TRACKER_STATE_CHANGE), "TRACKER_STATE_CHANGE");
        assert_eq!(status_name(850), "NOTICE");
        assert_eq!(status_name(418), "ERROR");

        assert!(is_ok(200));
        assert!(!is_ok(403));
        assert!(is_notice(801));
        assert!(!is_notice(500));
    }
}
