//! Eye Tribe tracker message codec and gaze frame model.
//!
//! Messages are JSON objects with a `category`, an optional `request` verb,
//! an optional correlation `id`, a `statuscode` and a `values` payload.
//! Outbound traffic is built only through the typed helpers on [`Request`]
//! and [`Notice`]; inbound payloads go through [`decode`], which also decodes
//! any `values.frame` block so that [`GazeFrame`] construction cannot fail.

pub mod error;
pub mod frame;
pub mod message;
pub mod status;

pub use error::{ProtocolError, Result};
pub use frame::{Eye, EyeBlock, FrameBlock, GazeFrame, Point, Side, TrackingState};
pub use message::{
    decode, MessageKind, Notice, ProtocolMessage, Request, CATEGORY_CALIBRATION,
    CATEGORY_HEARTBEAT, CATEGORY_TRACKER, REQUEST_GET, REQUEST_SET, VALUE_FRAME,
    VALUE_FRAMERATE, VALUE_HEARTBEAT_INTERVAL, VALUE_IS_CALIBRATED, VALUE_PUSH,
    VALUE_STATUS_MESSAGE, VALUE_TRACKER_STATE, VALUE_VERSION,
};
pub use status::{
    is_notice, is_ok, status_name, STATUS_BAD_REQUEST, STATUS_CALIBRATION_CHANGE,
    STATUS_DISPLAY_CHANGE, STATUS_FORBIDDEN, STATUS_OK, STATUS_SERVER_ERROR,
    STATUS_TRACKER_STATE_CHANGE,
};
